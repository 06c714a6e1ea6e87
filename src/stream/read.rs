//! Reader side of a joinable stream.

use super::JoinableStream;
use crate::error::{JointError, Result};
use crate::fs::ReadSource;
use crate::owner::{OwnerContext, OwnerToken};
use crate::registry::{HandleId, Registry};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Byte source for one path.
///
/// A handle opened while the path was being written is joined: it never
/// reads past what the writer has flushed and blocks for more until the
/// writer closes. Otherwise it reads the stored file as is.
pub struct ReadHandle {
    registry: Arc<Registry>,
    ctx: OwnerContext,
    owner: OwnerToken,
    path: PathBuf,
    id: HandleId,
    stream: Option<Arc<JoinableStream>>,
    pos: u64,
    source: Option<Box<dyn ReadSource>>,
}

impl ReadHandle {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        registry: Arc<Registry>,
        ctx: OwnerContext,
        owner: OwnerToken,
        path: PathBuf,
        id: HandleId,
        stream: Option<Arc<JoinableStream>>,
        pos: u64,
        source: Box<dyn ReadSource>,
    ) -> Self {
        Self {
            registry,
            ctx,
            owner,
            path,
            id,
            stream,
            pos,
            source: Some(source),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner(&self) -> &OwnerToken {
        &self.owner
    }

    /// Whether this reader is tailing an in-progress write.
    pub fn is_joined(&self) -> bool {
        self.stream.is_some()
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Close the handle.
    ///
    /// Fails with `OwnershipViolation` if the context it was opened with now
    /// resolves to a different owner; the handle then stays open.
    pub fn close(&mut self) -> Result<()> {
        if self.source.is_none() {
            return Ok(());
        }
        let current = self.ctx.resolve();
        if current != self.owner {
            return Err(JointError::OwnershipViolation(format!(
                "input stream for '{}' was opened by {} but closed by {}",
                self.path.display(),
                self.owner,
                current
            )));
        }
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.source.take().is_none() {
            return Ok(());
        }
        let mut state = self.registry.state();
        if state.remove_handle(&self.path, self.id) {
            state.release_if_idle(&self.path)?;
        }
        drop(state);
        debug!(path = %self.path.display(), owner = %self.owner, id = self.id, "input stream closed");
        Ok(())
    }

    fn fail(&mut self, e: io::Error) -> io::Error {
        error!(path = %self.path.display(), error = %e, "read failed; closing input stream");
        if let Err(release_err) = self.release() {
            warn!(path = %self.path.display(), error = %release_err, "release after failed read also failed");
        }
        JointError::io(&self.path, e).into()
    }
}

impl Read for ReadHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let Some(source) = self.source.as_mut() else {
            return Err(JointError::OwnershipViolation(format!(
                "input stream for '{}' is closed",
                self.path.display()
            ))
            .into());
        };
        let limit = match &self.stream {
            Some(stream) => match stream.wait_for_bytes(self.pos) {
                0 => return Ok(0),
                available => buf.len().min(usize::try_from(available).unwrap_or(usize::MAX)),
            },
            None => buf.len(),
        };

        match source.read(&mut buf[..limit]) {
            Ok(n) => {
                self.pos += n as u64;
                Ok(n)
            }
            Err(e) => Err(self.fail(e)),
        }
    }
}

impl Drop for ReadHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(path = %self.path.display(), error = %e, "failed to release input stream");
        }
    }
}

impl std::fmt::Debug for ReadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadHandle")
            .field("path", &self.path)
            .field("owner", &self.owner)
            .field("id", &self.id)
            .field("joined", &self.is_joined())
            .field("pos", &self.pos)
            .finish()
    }
}
