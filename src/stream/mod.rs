//! Joinable streams: one writer, any number of readers tailing it.
//!
//! While a path is being written, its registry entry carries a
//! [`JoinableStream`] that records how many bytes the writer has flushed.
//! Readers that open the path in that window get a cursor bounded by that
//! count: they read what is already there, then block until the writer
//! produces more or closes. Readers that open a path with no writer read the
//! stored file directly.
//!
//! # Lifecycle
//!
//! Opening a handle registers it on the path's entry; closing or dropping it
//! deregisters it exactly once and re-checks the entry's liveness, so whichever
//! handle closes last (reader or writer) removes the entry.

mod read;
mod write;


pub use read::ReadHandle;
pub use write::WriteHandle;

use crate::config::JoinMode;
use crate::error::Result;
use crate::fs::Storage;
use crate::lock::{LockLevel, Timeout};
use crate::owner::{OwnerContext, OwnerToken};
use crate::registry::{EntryMap, HandleInfo, HandleKind, Registry};
use parking_lot::{Condvar, Mutex};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Label recorded on locks taken for an output stream.
pub const OUTPUT_STREAM_LABEL: &str = "output stream";

#[derive(Debug, Default)]
struct Progress {
    written: u64,
    /// The writer's sink exists in storage.
    opened: bool,
    closed: bool,
}

/// Write progress for one path, shared by the writer and joined readers.
#[derive(Debug)]
pub struct JoinableStream {
    path: PathBuf,
    progress: Mutex<Progress>,
    changed: Condvar,
}

impl JoinableStream {
    pub(crate) fn new(path: &Path) -> Arc<Self> {
        Arc::new(Self {
            path: path.to_path_buf(),
            progress: Mutex::new(Progress::default()),
            changed: Condvar::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes the writer has flushed so far.
    pub fn written(&self) -> u64 {
        self.progress.lock().written
    }

    pub fn is_closed(&self) -> bool {
        self.progress.lock().closed
    }

    pub(crate) fn advance(&self, n: u64) {
        if n == 0 {
            return;
        }
        let mut progress = self.progress.lock();
        progress.written += n;
        self.changed.notify_all();
    }

    pub(crate) fn mark_opened(&self) {
        let mut progress = self.progress.lock();
        progress.opened = true;
        self.changed.notify_all();
    }

    /// Block until the writer's sink has been created or the writer gave up.
    ///
    /// Returns false if the stream closed before the sink was opened.
    pub(crate) fn wait_opened(&self) -> bool {
        let mut progress = self.progress.lock();
        while !progress.opened && !progress.closed {
            trace!(path = %self.path.display(), "reader waiting for writer to open");
            self.changed.wait(&mut progress);
        }
        progress.opened
    }

    pub(crate) fn close(&self) {
        let mut progress = self.progress.lock();
        progress.closed = true;
        self.changed.notify_all();
    }

    /// Block until bytes past `pos` exist or the writer closes.
    ///
    /// Returns how many bytes are readable from `pos`; 0 means end of data.
    pub(crate) fn wait_for_bytes(&self, pos: u64) -> u64 {
        let mut progress = self.progress.lock();
        loop {
            if progress.written > pos {
                return progress.written - pos;
            }
            if progress.closed {
                return 0;
            }
            trace!(path = %self.path.display(), pos, "reader waiting for writer");
            self.changed.wait(&mut progress);
        }
    }
}

/// What stream handles need from the manager.
#[derive(Debug, Clone)]
pub(crate) struct StreamDeps {
    pub(crate) registry: Arc<Registry>,
    pub(crate) storage: Arc<dyn Storage>,
}

impl EntryMap {
    /// Deregister handle `id` from `path` and wake waiters.
    ///
    /// Returns false when the handle was already detached.
    pub(crate) fn remove_handle(&mut self, path: &Path, id: u64) -> bool {
        let Some(entry) = self.get_mut(path) else {
            return false;
        };
        if entry.handles.remove(&id).is_none() {
            return false;
        }
        entry.wake_all();
        true
    }

    /// Undo a writer's registration: its handle, its stream, and one hold of
    /// its write lock.
    ///
    /// Does nothing if the handle was already detached.
    pub(crate) fn retire_writer(
        &mut self,
        path: &Path,
        id: u64,
        owner: &OwnerToken,
        stream: &Arc<JoinableStream>,
    ) -> Result<()> {
        if !self.remove_handle(path, id) {
            return Ok(());
        }
        if let Some(entry) = self.get_mut(path)
            && entry.stream.as_ref().is_some_and(|s| Arc::ptr_eq(s, stream))
        {
            entry.stream = None;
        }
        self.release_lock(path, owner);
        self.release_if_idle(path)?;
        Ok(())
    }

    /// Detach every handle `owner` has open, closing any stream it was writing.
    ///
    /// Returns the affected paths.
    pub(crate) fn detach_handles(&mut self, owner: &OwnerToken) -> Vec<PathBuf> {
        let mut detached = Vec::new();
        for entry in self.iter_mut() {
            let before = entry.handles.len();
            let mut closed_writer = false;
            entry.handles.retain(|_, h| {
                let mine = &h.owner == owner;
                closed_writer |= mine && h.kind == HandleKind::Write;
                !mine
            });
            if closed_writer && let Some(stream) = entry.stream.take() {
                stream.close();
            }
            if entry.handles.len() != before {
                entry.wake_all();
                detached.push(entry.path.clone());
            }
        }
        detached
    }
}

/// Open `path` for writing on behalf of `ctx`.
///
/// Takes (or re-enters) a write lock on `path` and waits up to `timeout` for
/// conflicting locks, for any other writer, and for readers of other owners
/// to go away. Returns `Ok(None)` on timeout.
///
/// The path is reserved under the registry mutex and the sink is opened
/// after it is released, so storage latency never stalls other paths.
pub(crate) fn open_for_write(
    deps: &StreamDeps,
    ctx: &OwnerContext,
    path: &Path,
    timeout: Timeout,
    create_parents: bool,
) -> Result<Option<WriteHandle>> {
    let owner = ctx.resolve();
    let deadline = timeout.deadline();
    let mut state = deps.registry.state();

    loop {
        let busy = state.find_conflict(path, LockLevel::Write, &owner).or_else(|| {
            state
                .get(path)
                .filter(|e| e.stream.is_some() || e.has_reader_besides(&owner))
                .map(|e| e.signal.clone())
        });
        let Some(signal) = busy else {
            break;
        };
        trace!(path = %path.display(), %owner, "output stream waiting");
        if !deadline.wait(&mut state, &signal) {
            debug!(path = %path.display(), %owner, "output stream open timed out");
            return Ok(None);
        }
    }

    state.grant_lock(path, LockLevel::Write, &owner, Some(OUTPUT_STREAM_LABEL));
    let id = deps.registry.next_handle_id();
    let stream = JoinableStream::new(path);
    let entry = state.get_or_create(path);
    entry.handles.insert(
        id,
        HandleInfo {
            owner: owner.clone(),
            kind: HandleKind::Write,
        },
    );
    entry.stream = Some(stream.clone());
    drop(state);

    let sink = match deps.storage.open_write(path, create_parents) {
        Ok(sink) => sink,
        Err(e) => {
            stream.close();
            deps.registry
                .state()
                .retire_writer(path, id, &owner, &stream)?;
            return Err(e);
        }
    };
    stream.mark_opened();

    debug!(path = %path.display(), %owner, id, "output stream opened");
    Ok(Some(WriteHandle::new(
        deps.registry.clone(),
        ctx.clone(),
        owner,
        path.to_path_buf(),
        id,
        stream,
        sink,
    )))
}

/// Open `path` for reading on behalf of `ctx`.
///
/// Never takes a lock. If a writer is active the reader joins its stream;
/// otherwise it reads the stored file. `timeout` only bounds the wait for a
/// reader slot when `max_readers` is set. Returns `Ok(None)` on timeout.
pub(crate) fn open_for_read(
    deps: &StreamDeps,
    ctx: &OwnerContext,
    path: &Path,
    timeout: Timeout,
    max_readers: Option<usize>,
    join_mode: JoinMode,
) -> Result<Option<ReadHandle>> {
    let owner = ctx.resolve();
    let deadline = timeout.deadline();
    let mut state = deps.registry.state();

    if let Some(max) = max_readers {
        loop {
            let Some(entry) = state.get(path) else {
                break;
            };
            let readers: Vec<_> = entry
                .handles
                .values()
                .filter(|h| h.kind == HandleKind::Read)
                .collect();
            if readers.len() < max || readers.iter().all(|h| h.owner == owner) {
                break;
            }
            let signal = entry.signal.clone();
            if !deadline.wait(&mut state, &signal) {
                debug!(path = %path.display(), %owner, max, "no reader slot before timeout");
                return Ok(None);
            }
        }
    }

    let id = deps.registry.next_handle_id();
    let entry = state.get_or_create(path);
    entry.handles.insert(
        id,
        HandleInfo {
            owner: owner.clone(),
            kind: HandleKind::Read,
        },
    );
    let stream = entry.stream.clone();
    drop(state);

    // A writer that failed to create its sink leaves the stored file as is.
    let stream = stream.filter(|stream| stream.wait_opened());

    let start = match (&stream, join_mode) {
        (Some(stream), JoinMode::FromCurrent) => stream.written(),
        _ => 0,
    };
    let source = deps.storage.open_read(path).and_then(|mut source| {
        if start > 0 {
            source
                .seek(SeekFrom::Start(start))
                .map_err(|e| crate::error::JointError::io(path, e))?;
        }
        Ok(source)
    });
    let source = match source {
        Ok(source) => source,
        Err(e) => {
            let mut state = deps.registry.state();
            state.remove_handle(path, id);
            state.release_if_idle(path)?;
            return Err(e);
        }
    };

    debug!(
        path = %path.display(),
        %owner,
        id,
        joined = stream.is_some(),
        "input stream opened"
    );
    Ok(Some(ReadHandle::new(
        deps.registry.clone(),
        ctx.clone(),
        owner,
        path.to_path_buf(),
        id,
        stream,
        start,
        source,
    )))
}
