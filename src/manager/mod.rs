//! Joinable file manager: the public facade.
//!
//! Resolves the caller's owner token from its [`OwnerContext`], canonicalizes
//! paths through the storage backend, and delegates to the lock manager and
//! the joinable stream machinery. Timeouts come back as `false`/`None`, never
//! as errors.
//!
//! ```no_run
//! use jointfile::{JoinableFileManager, LockLevel, OwnerContext, Timeout};
//! use std::io::Write;
//!
//! let mgr = JoinableFileManager::new();
//! let ctx = OwnerContext::new();
//!
//! assert!(mgr.lock(&ctx, "/data/dir", Timeout::Forever, LockLevel::Write, None)?);
//! if let Some(mut out) = mgr.open_output_stream(&ctx, "/data/dir/child.txt")? {
//!     out.write_all(b"This is a test")?;
//!     out.close()?;
//! }
//! mgr.unlock(&ctx, "/data/dir")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[cfg(test)]
mod tests;

use crate::config::ManagerConfig;
use crate::error::Result;
use crate::fs::{LocalStorage, Storage};
use crate::lock::{LockLevel, LockManager, Timeout};
use crate::owner::OwnerContext;
use crate::registry::Registry;
use crate::stream::{self, ReadHandle, StreamDeps, WriteHandle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Coordinates locks and joinable streams for every path in one process.
#[derive(Debug, Clone)]
pub struct JoinableFileManager {
    locks: LockManager,
    deps: StreamDeps,
    config: ManagerConfig,
}

impl Default for JoinableFileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl JoinableFileManager {
    /// Manager over the local filesystem with default settings.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        Self::with_storage(config, Arc::new(LocalStorage::new()))
    }

    pub fn with_storage(config: ManagerConfig, storage: Arc<dyn Storage>) -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            locks: LockManager::new(registry.clone()),
            deps: StreamDeps { registry, storage },
            config,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Live path entries, for diagnostics.
    pub fn registry(&self) -> &Registry {
        &self.deps.registry
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Whether `path` exists in the storage backend.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.deps.storage.exists(path.as_ref())
    }

    fn canonical(&self, path: &Path) -> Result<PathBuf> {
        self.deps.storage.canonicalize(path)
    }

    /// Canonical path for queries, falling back to the path as given.
    fn canonical_or_raw(&self, path: &Path) -> PathBuf {
        self.canonical(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "could not canonicalize path");
            path.to_path_buf()
        })
    }

    /// Lock `path` (and everything below it) at `level`.
    ///
    /// Returns false if the lock could not be taken within `timeout`.
    pub fn lock(
        &self,
        ctx: &OwnerContext,
        path: impl AsRef<Path>,
        timeout: Timeout,
        level: LockLevel,
        label: Option<&str>,
    ) -> Result<bool> {
        let path = self.canonical(path.as_ref())?;
        Ok(self
            .locks
            .acquire(&path, timeout, level, &ctx.resolve(), label))
    }

    /// Release one hold the calling context has on `path`.
    ///
    /// Returns false if the context does not hold the lock.
    pub fn unlock(&self, ctx: &OwnerContext, path: impl AsRef<Path>) -> Result<bool> {
        let path = self.canonical(path.as_ref())?;
        self.locks.release(&path, &ctx.resolve())
    }

    pub fn is_write_locked(&self, path: impl AsRef<Path>) -> bool {
        let path = self.canonical_or_raw(path.as_ref());
        self.locks.is_locked(&path, LockLevel::Write)
    }

    pub fn is_read_locked(&self, path: impl AsRef<Path>) -> bool {
        let path = self.canonical_or_raw(path.as_ref());
        self.locks.is_locked(&path, LockLevel::Read)
    }

    pub fn is_locked_by_current_context(&self, ctx: &OwnerContext, path: impl AsRef<Path>) -> bool {
        let path = self.canonical_or_raw(path.as_ref());
        self.locks.is_locked_by(&path, &ctx.resolve())
    }

    /// Open `path` for writing with the configured default timeout.
    pub fn open_output_stream(
        &self,
        ctx: &OwnerContext,
        path: impl AsRef<Path>,
    ) -> Result<Option<WriteHandle>> {
        self.open_output_stream_with_timeout(ctx, path, self.config.default_timeout())
    }

    /// Open `path` for writing, taking a write lock for the life of the handle.
    ///
    /// Returns `Ok(None)` if the path stayed locked by another owner or busy
    /// with another writer for the whole `timeout`.
    pub fn open_output_stream_with_timeout(
        &self,
        ctx: &OwnerContext,
        path: impl AsRef<Path>,
        timeout: Timeout,
    ) -> Result<Option<WriteHandle>> {
        let path = self.canonical(path.as_ref())?;
        stream::open_for_write(
            &self.deps,
            ctx,
            &path,
            timeout,
            self.config.create_parent_dirs,
        )
    }

    /// Open `path` for reading with the configured default timeout.
    pub fn open_input_stream(
        &self,
        ctx: &OwnerContext,
        path: impl AsRef<Path>,
    ) -> Result<Option<ReadHandle>> {
        self.open_input_stream_with_timeout(ctx, path, self.config.default_timeout())
    }

    /// Open `path` for reading.
    ///
    /// Joins the in-progress write if there is one. `timeout` only matters
    /// when `max_readers` is configured.
    pub fn open_input_stream_with_timeout(
        &self,
        ctx: &OwnerContext,
        path: impl AsRef<Path>,
        timeout: Timeout,
    ) -> Result<Option<ReadHandle>> {
        let path = self.canonical(path.as_ref())?;
        stream::open_for_read(
            &self.deps,
            ctx,
            &path,
            timeout,
            self.config.max_readers,
            self.config.join_mode,
        )
    }

    /// Wait until no other owner write-locks `path`, without locking it.
    pub fn wait_for_write_unlock(
        &self,
        ctx: &OwnerContext,
        path: impl AsRef<Path>,
        timeout: Timeout,
    ) -> Result<bool> {
        let path = self.canonical(path.as_ref())?;
        Ok(self
            .locks
            .wait_for_unlock(&path, LockLevel::Write, &ctx.resolve(), timeout))
    }

    /// Wait until no other owner read-locks `path`, without locking it.
    pub fn wait_for_read_unlock(
        &self,
        ctx: &OwnerContext,
        path: impl AsRef<Path>,
        timeout: Timeout,
    ) -> Result<bool> {
        let path = self.canonical(path.as_ref())?;
        Ok(self
            .locks
            .wait_for_unlock(&path, LockLevel::Read, &ctx.resolve(), timeout))
    }

    /// Release everything the calling context owns and clear its owner label.
    ///
    /// Every lock hold is dropped regardless of count, and every open handle
    /// is detached (writers are closed for their readers). The handles
    /// themselves become inert. Returns the number of paths touched.
    pub fn cleanup_current_context(&self, ctx: &OwnerContext) -> Result<usize> {
        let owner = ctx.resolve();
        let mut state = self.deps.registry.state();
        let mut touched = state.detach_handles(&owner);
        touched.extend(state.release_all_locks(&owner));
        touched.sort();
        touched.dedup();
        for path in &touched {
            state.release_if_idle(path)?;
        }
        drop(state);

        ctx.clear_label();
        debug!(%owner, paths = touched.len(), "context cleaned up");
        Ok(touched.len())
    }
}
