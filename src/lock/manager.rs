//! Lock acquisition, release, and queries over the registry.

use super::{LockLevel, LockRecord, ReleaseOutcome, Timeout};
use crate::error::Result;
use crate::owner::OwnerToken;
use crate::registry::{EntryMap, Registry};
use parking_lot::Condvar;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

impl EntryMap {
    /// Find a lock that stops `owner` from taking `level` on `path`.
    ///
    /// Walks `path` and its ancestors, then the locks held below `path`.
    /// Returns the signal of the blocking entry so the caller can wait on it.
    pub(crate) fn find_conflict(
        &self,
        path: &Path,
        level: LockLevel,
        owner: &OwnerToken,
    ) -> Option<Arc<Condvar>> {
        for ancestor in path.ancestors() {
            if let Some(entry) = self.get(ancestor)
                && let Some(lock) = &entry.lock
                && lock.conflicts_with(level, owner)
            {
                return Some(entry.signal.clone());
            }
        }
        self.descendants(path)
            .find(|e| e.lock.as_ref().is_some_and(|l| l.conflicts_with(level, owner)))
            .map(|e| e.signal.clone())
    }

    /// Find a lock at exactly `level` covering `path` that another owner holds.
    fn find_held_by_other(
        &self,
        path: &Path,
        level: LockLevel,
        owner: &OwnerToken,
    ) -> Option<Arc<Condvar>> {
        path.ancestors().find_map(|ancestor| {
            let entry = self.get(ancestor)?;
            let lock = entry.lock.as_ref()?;
            (lock.level() == level && lock.held_by_other(owner)).then(|| entry.signal.clone())
        })
    }

    /// Install or extend the lock at `path`. Conflicts must already be ruled out.
    pub(crate) fn grant_lock(
        &mut self,
        path: &Path,
        level: LockLevel,
        owner: &OwnerToken,
        label: Option<&str>,
    ) {
        let entry = self.get_or_create(path);
        match &mut entry.lock {
            Some(lock) => lock.grant(level, owner, label),
            None => entry.lock = Some(LockRecord::new(level, owner.clone(), label)),
        }
        debug!(path = %path.display(), %level, %owner, "lock granted");
    }

    /// Drop one hold of `owner` at `path`, waking waiters if anything changed.
    ///
    /// Does not remove the entry; callers follow up with `release_if_idle`.
    pub(crate) fn release_lock(&mut self, path: &Path, owner: &OwnerToken) -> ReleaseOutcome {
        let Some(entry) = self.get_mut(path) else {
            return ReleaseOutcome::NotHolder;
        };
        let Some(lock) = &mut entry.lock else {
            return ReleaseOutcome::NotHolder;
        };
        let outcome = lock.release(owner);
        if outcome == ReleaseOutcome::Released {
            if lock.is_empty() {
                entry.lock = None;
            }
            entry.wake_all();
            debug!(path = %path.display(), %owner, "lock released");
        }
        outcome
    }

    /// Drop every hold `owner` has anywhere. Returns the affected paths.
    pub(crate) fn release_all_locks(&mut self, owner: &OwnerToken) -> Vec<PathBuf> {
        let mut released = Vec::new();
        for entry in self.iter_mut() {
            let Some(lock) = &mut entry.lock else {
                continue;
            };
            if lock.release_all(owner) == 0 {
                continue;
            }
            if lock.is_empty() {
                entry.lock = None;
            }
            entry.wake_all();
            released.push(entry.path.clone());
        }
        released
    }
}

/// Grants and releases hierarchical read/write locks.
#[derive(Debug, Clone)]
pub struct LockManager {
    registry: Arc<Registry>,
}

impl LockManager {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Acquire `level` on `path` for `owner`, waiting up to `timeout`.
    ///
    /// A lock already held by `owner` on `path` is extended without blocking;
    /// a read→write upgrade goes through the normal conflict walk. Returns
    /// false on timeout with no state changed.
    pub fn acquire(
        &self,
        path: &Path,
        timeout: Timeout,
        level: LockLevel,
        owner: &OwnerToken,
        label: Option<&str>,
    ) -> bool {
        let deadline = timeout.deadline();
        let mut state = self.registry.state();

        let reentrant = state
            .get(path)
            .and_then(|e| e.lock.as_ref())
            .is_some_and(|l| {
                l.is_held_by(owner) && (level == LockLevel::Read || l.level() == LockLevel::Write)
            });

        if !reentrant {
            while let Some(signal) = state.find_conflict(path, level, owner) {
                trace!(path = %path.display(), %level, %owner, "waiting for conflicting lock");
                if !deadline.wait(&mut state, &signal) {
                    if timeout != Timeout::NoWait {
                        warn!(path = %path.display(), %level, %owner, "lock acquisition timed out");
                    }
                    return false;
                }
            }
        }

        state.grant_lock(path, level, owner, label);
        true
    }

    /// Release one hold of `owner` on `path`.
    ///
    /// Returns false when `owner` does not hold the lock; nothing changes then.
    pub fn release(&self, path: &Path, owner: &OwnerToken) -> Result<bool> {
        let mut state = self.registry.state();
        match state.release_lock(path, owner) {
            ReleaseOutcome::NotHolder => {
                debug!(path = %path.display(), %owner, "release rejected: not the holder");
                Ok(false)
            }
            ReleaseOutcome::Decremented => Ok(true),
            ReleaseOutcome::Released => {
                state.release_if_idle(path)?;
                Ok(true)
            }
        }
    }

    /// Whether `path` or one of its ancestors carries a lock at `level`.
    pub fn is_locked(&self, path: &Path, level: LockLevel) -> bool {
        let state = self.registry.state();
        path.ancestors().any(|ancestor| {
            state
                .get(ancestor)
                .and_then(|e| e.lock.as_ref())
                .is_some_and(|l| l.level() == level)
        })
    }

    /// Whether `owner` holds a lock covering `path`.
    pub fn is_locked_by(&self, path: &Path, owner: &OwnerToken) -> bool {
        let state = self.registry.state();
        path.ancestors().any(|ancestor| {
            state
                .get(ancestor)
                .and_then(|e| e.lock.as_ref())
                .is_some_and(|l| l.is_held_by(owner))
        })
    }

    /// Hold count of `owner` on exactly `path`.
    pub fn hold_count(&self, path: &Path, owner: &OwnerToken) -> u32 {
        self.registry
            .state()
            .get(path)
            .and_then(|e| e.lock.as_ref())
            .map_or(0, |l| l.hold_count(owner))
    }

    /// Wait until no other owner holds a `level` lock covering `path`.
    ///
    /// Acquires nothing. Returns false if the lock is still held at the deadline.
    pub fn wait_for_unlock(
        &self,
        path: &Path,
        level: LockLevel,
        owner: &OwnerToken,
        timeout: Timeout,
    ) -> bool {
        let deadline = timeout.deadline();
        let mut state = self.registry.state();
        while let Some(signal) = state.find_held_by_other(path, level, owner) {
            trace!(path = %path.display(), %level, "waiting for unlock");
            if !deadline.wait(&mut state, &signal) {
                return false;
            }
        }
        true
    }

    /// Release every lock `owner` holds, whatever its hold count.
    pub fn release_all(&self, owner: &OwnerToken) -> Result<Vec<PathBuf>> {
        let mut state = self.registry.state();
        let released = state.release_all_locks(owner);
        for path in &released {
            state.release_if_idle(path)?;
        }
        Ok(released)
    }
}
