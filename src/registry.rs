//! Per-path entry registry.
//!
//! The registry maps a canonical path to a [`PathEntry`] holding its lock
//! record, its open handles, and its active joinable stream. Entries are
//! created lazily by the first lock or open and removed by
//! [`EntryMap::release_if_idle`] as soon as all three are gone.
//!
//! All entry state lives behind one short-held mutex. Blocking waits never
//! hold it: they park on the per-entry `signal` condvar, which releases the
//! mutex while asleep, so callers working on unrelated paths only contend for
//! the brief map lookups.

use crate::error::{JointError, Result};
use crate::lock::{LockInfo, LockRecord};
use crate::owner::OwnerToken;
use crate::stream::JoinableStream;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Identifier of one open read or write handle.
pub type HandleId = u64;

/// Which side of a stream a handle is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    Read,
    Write,
}

#[derive(Debug, Clone)]
pub(crate) struct HandleInfo {
    pub(crate) owner: OwnerToken,
    pub(crate) kind: HandleKind,
}

/// Live bookkeeping for one canonical path.
#[derive(Debug)]
pub(crate) struct PathEntry {
    pub(crate) path: PathBuf,
    pub(crate) lock: Option<LockRecord>,
    pub(crate) handles: HashMap<HandleId, HandleInfo>,
    pub(crate) stream: Option<Arc<JoinableStream>>,
    /// Broadcast on every lock release, handle close, and writer close.
    pub(crate) signal: Arc<Condvar>,
}

impl PathEntry {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: None,
            handles: HashMap::new(),
            stream: None,
            signal: Arc::new(Condvar::new()),
        }
    }

    /// An entry stays registered while it has a lock, a handle, or a writer.
    pub(crate) fn is_live(&self) -> bool {
        self.lock.is_some() || !self.handles.is_empty() || self.stream.is_some()
    }

    pub(crate) fn count_handles(&self, kind: HandleKind) -> usize {
        self.handles.values().filter(|h| h.kind == kind).count()
    }

    /// Whether a reader owned by someone other than `owner` is open here.
    pub(crate) fn has_reader_besides(&self, owner: &OwnerToken) -> bool {
        self.handles
            .values()
            .any(|h| h.kind == HandleKind::Read && &h.owner != owner)
    }

    pub(crate) fn wake_all(&self) {
        self.signal.notify_all();
    }

    fn check_invariants(&self) -> Result<()> {
        if self.lock.as_ref().is_some_and(LockRecord::is_empty) {
            return Err(JointError::Invariant(format!(
                "entry '{}' kept a lock record with no holders",
                self.path.display()
            )));
        }
        if self.count_handles(HandleKind::Write) > 1 {
            return Err(JointError::Invariant(format!(
                "entry '{}' has more than one writer",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn snapshot(&self) -> EntrySnapshot {
        EntrySnapshot {
            path: self.path.clone(),
            lock: self.lock.as_ref().map(LockRecord::info),
            readers: self.count_handles(HandleKind::Read),
            writers: self.count_handles(HandleKind::Write),
            streaming: self.stream.is_some(),
        }
    }
}

/// The path→entry map, only reachable through the registry mutex.
///
/// Ordered by path components, so every path's descendants sit in one
/// contiguous run right after it.
#[derive(Debug, Default)]
pub(crate) struct EntryMap {
    entries: BTreeMap<PathBuf, PathEntry>,
}

impl EntryMap {
    pub(crate) fn get(&self, path: &Path) -> Option<&PathEntry> {
        self.entries.get(path)
    }

    pub(crate) fn get_mut(&mut self, path: &Path) -> Option<&mut PathEntry> {
        self.entries.get_mut(path)
    }

    /// Return the entry for `path`, inserting an empty one if absent.
    pub(crate) fn get_or_create(&mut self, path: &Path) -> &mut PathEntry {
        self.entries.entry(path.to_path_buf()).or_insert_with(|| {
            debug!(path = %path.display(), "registry entry created");
            PathEntry::new(path)
        })
    }

    /// Remove the entry for `path` if nothing keeps it alive.
    ///
    /// Returns whether an entry was removed. Calling this for an absent path
    /// is a no-op.
    pub(crate) fn release_if_idle(&mut self, path: &Path) -> Result<bool> {
        let Some(entry) = self.entries.get(path) else {
            return Ok(false);
        };
        entry.check_invariants()?;
        if entry.is_live() {
            return Ok(false);
        }
        if let Some(entry) = self.entries.remove(path) {
            entry.wake_all();
            debug!(path = %path.display(), "registry entry removed");
        }
        Ok(true)
    }

    /// Entries strictly below `path`.
    pub(crate) fn descendants<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a PathEntry> {
        self.entries
            .range::<Path, _>((Bound::Excluded(path), Bound::Unbounded))
            .take_while(move |(p, _)| p.starts_with(path))
            .map(|(_, entry)| entry)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &PathEntry> {
        self.entries.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PathEntry> {
        self.entries.values_mut()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Serializable view of one live entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<LockInfo>,
    pub readers: usize,
    pub writers: usize,
    pub streaming: bool,
}

impl EntrySnapshot {
    pub fn open_handles(&self) -> usize {
        self.readers + self.writers
    }
}

/// Thread-safe registry of live path entries.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<EntryMap>,
    next_handle: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, EntryMap> {
        self.state.lock()
    }

    pub(crate) fn next_handle_id(&self) -> HandleId {
        self.next_handle.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Re-check liveness for `path` and drop its entry if idle.
    pub fn release_if_idle(&self, path: &Path) -> Result<bool> {
        self.state().release_if_idle(path)
    }

    /// Snapshot of all live entries, sorted by path.
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        self.state().iter().map(PathEntry::snapshot).collect()
    }

    /// Run `action` on every live entry matching `predicate`.
    ///
    /// Works on a snapshot, so `action` may call back into the registry.
    pub fn for_all<P, A>(&self, predicate: P, mut action: A)
    where
        P: Fn(&EntrySnapshot) -> bool,
        A: FnMut(&EntrySnapshot),
    {
        let snapshot = self.snapshot();
        trace!(entries = snapshot.len(), "iterating registry snapshot");
        for entry in snapshot.iter().filter(|e| predicate(e)) {
            action(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.state().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.state().get(path).is_some()
    }
}
