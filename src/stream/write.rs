//! Writer side of a joinable stream.

use super::JoinableStream;
use crate::error::{JointError, Result};
use crate::owner::{OwnerContext, OwnerToken};
use crate::registry::{HandleId, Registry};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Append-only sink for one path.
///
/// Every successful write is flushed to storage before joined readers are
/// told about it. Dropping the handle closes it; [`WriteHandle::close`] does
/// the same but reports errors and checks that the caller's context still
/// resolves to the owner that opened it.
pub struct WriteHandle {
    registry: Arc<Registry>,
    ctx: OwnerContext,
    owner: OwnerToken,
    path: PathBuf,
    id: HandleId,
    stream: Arc<JoinableStream>,
    sink: Option<Box<dyn Write + Send>>,
}

impl WriteHandle {
    pub(super) fn new(
        registry: Arc<Registry>,
        ctx: OwnerContext,
        owner: OwnerToken,
        path: PathBuf,
        id: HandleId,
        stream: Arc<JoinableStream>,
        sink: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            registry,
            ctx,
            owner,
            path,
            id,
            stream,
            sink: Some(sink),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner(&self) -> &OwnerToken {
        &self.owner
    }

    /// Bytes written through this handle so far.
    pub fn position(&self) -> u64 {
        self.stream.written()
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// Close the handle, releasing the write lock it took.
    ///
    /// Fails with `OwnershipViolation` if the context it was opened with now
    /// resolves to a different owner; the handle then stays open. Closing an
    /// already closed handle is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.sink.is_none() {
            return Ok(());
        }
        let current = self.ctx.resolve();
        if current != self.owner {
            return Err(JointError::OwnershipViolation(format!(
                "output stream for '{}' was opened by {} but closed by {}",
                self.path.display(),
                self.owner,
                current
            )));
        }
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let Some(mut sink) = self.sink.take() else {
            return Ok(());
        };
        let flushed = sink.flush();
        drop(sink);
        self.stream.close();

        self.registry
            .state()
            .retire_writer(&self.path, self.id, &self.owner, &self.stream)?;

        debug!(path = %self.path.display(), owner = %self.owner, id = self.id, "output stream closed");
        flushed.map_err(|e| JointError::io(&self.path, e))
    }

    fn detached_error(&self) -> io::Error {
        JointError::OwnershipViolation(format!(
            "output stream for '{}' is no longer open",
            self.path.display()
        ))
        .into()
    }
}

impl Write for WriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stream.is_closed() {
            // Detached by a context cleanup.
            if let Err(e) = self.release() {
                warn!(path = %self.path.display(), error = %e, "release of detached output stream failed");
            }
            return Err(self.detached_error());
        }
        let Some(sink) = self.sink.as_mut() else {
            return Err(self.detached_error());
        };

        match sink.write(buf).and_then(|n| sink.flush().map(|()| n)) {
            Ok(n) => {
                self.stream.advance(n as u64);
                Ok(n)
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "write failed; closing output stream");
                if let Err(release_err) = self.release() {
                    warn!(path = %self.path.display(), error = %release_err, "release after failed write also failed");
                }
                Err(JointError::io(&self.path, e).into())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(path = %self.path.display(), error = %e, "failed to release output stream");
        }
    }
}

impl std::fmt::Debug for WriteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteHandle")
            .field("path", &self.path)
            .field("owner", &self.owner)
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
