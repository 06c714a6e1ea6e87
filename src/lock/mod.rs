//! Hierarchical path locking.
//!
//! A lock on path `P` covers every path below `P`. Conflicts are found by
//! walking from the requested path up through its ancestors (and, for the
//! requested path itself, checking locks already held further down), so
//! directory semantics fall out of path structure without pre-populating
//! directory entries in the registry.
//!
//! # Lock Records
//!
//! Each registry entry carries at most one [`LockRecord`]. A write record has
//! exactly one holder; a read record may be shared by several owners. Every
//! holder keeps a reentrant hold count, and only the matching number of
//! releases removes it.

mod manager;


pub use manager::LockManager;

use crate::owner::OwnerToken;
use chrono::{DateTime, Duration as AgeDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Level of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockLevel {
    /// Shared with other readers, excludes writers.
    Read,
    /// Exclusive.
    Write,
}

impl LockLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockLevel::Read => "read",
            LockLevel::Write => "write",
        }
    }

    /// Whether a held lock at `self` blocks a request at `requested` from another owner.
    pub fn conflicts_with(self, requested: LockLevel) -> bool {
        self == LockLevel::Write || requested == LockLevel::Write
    }
}

impl fmt::Display for LockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a blocking operation may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Fail immediately if the path is busy.
    NoWait,
    /// Wait at most this long.
    After(Duration),
    /// Wait until the path becomes available.
    Forever,
}

impl Timeout {
    /// Interpret a millisecond timeout: negative fails fast, `i64::MAX` waits forever.
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            i64::MAX => Timeout::Forever,
            m if m < 0 => Timeout::NoWait,
            m => Timeout::After(Duration::from_millis(m as u64)),
        }
    }

    pub(crate) fn deadline(self) -> Deadline {
        match self {
            Timeout::NoWait => Deadline::Now,
            Timeout::Forever => Deadline::Never,
            Timeout::After(d) => match Instant::now().checked_add(d) {
                Some(at) => Deadline::At(at),
                None => Deadline::Never,
            },
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::After(d)
    }
}

/// A timeout pinned to the moment the operation started.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Deadline {
    Now,
    At(Instant),
    Never,
}

impl Deadline {
    /// Block on `signal` until notified or the deadline passes.
    ///
    /// Returns false once there is no time left; the caller re-checks its
    /// condition after every `true`.
    pub(crate) fn wait<T>(
        self,
        guard: &mut parking_lot::MutexGuard<'_, T>,
        signal: &parking_lot::Condvar,
    ) -> bool {
        match self {
            Deadline::Now => false,
            Deadline::Never => {
                signal.wait(guard);
                true
            }
            Deadline::At(at) => {
                if Instant::now() >= at {
                    return false;
                }
                signal.wait_until(guard, at);
                true
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Holder {
    owner: OwnerToken,
    count: u32,
    label: Option<String>,
    acquired_at: DateTime<Utc>,
}

/// Result of releasing one hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReleaseOutcome {
    /// The token holds nothing here.
    NotHolder,
    /// The hold count dropped but the owner still holds the lock.
    Decremented,
    /// The owner's last hold went away; the record may now be empty.
    Released,
}

/// Lock state stored on a registry entry.
#[derive(Debug, Clone)]
pub(crate) struct LockRecord {
    level: LockLevel,
    holders: Vec<Holder>,
}

impl LockRecord {
    pub(crate) fn new(level: LockLevel, owner: OwnerToken, label: Option<&str>) -> Self {
        Self {
            level,
            holders: vec![Holder {
                owner,
                count: 1,
                label: label.map(str::to_string),
                acquired_at: Utc::now(),
            }],
        }
    }

    pub(crate) fn level(&self) -> LockLevel {
        self.level
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub(crate) fn is_held_by(&self, owner: &OwnerToken) -> bool {
        self.holders.iter().any(|h| &h.owner == owner)
    }

    pub(crate) fn hold_count(&self, owner: &OwnerToken) -> u32 {
        self.holders
            .iter()
            .find(|h| &h.owner == owner)
            .map_or(0, |h| h.count)
    }

    pub(crate) fn held_by_other(&self, owner: &OwnerToken) -> bool {
        self.holders.iter().any(|h| &h.owner != owner)
    }

    /// Whether a request at `requested` by `owner` must wait for this record.
    pub(crate) fn conflicts_with(&self, requested: LockLevel, owner: &OwnerToken) -> bool {
        self.held_by_other(owner) && self.level.conflicts_with(requested)
    }

    /// Add a hold for `owner`. The caller has already ruled out conflicts.
    pub(crate) fn grant(&mut self, requested: LockLevel, owner: &OwnerToken, label: Option<&str>) {
        if requested == LockLevel::Write {
            self.level = LockLevel::Write;
        }
        match self.holders.iter_mut().find(|h| &h.owner == owner) {
            Some(holder) => holder.count += 1,
            None => self.holders.push(Holder {
                owner: owner.clone(),
                count: 1,
                label: label.map(str::to_string),
                acquired_at: Utc::now(),
            }),
        }
    }

    pub(crate) fn release(&mut self, owner: &OwnerToken) -> ReleaseOutcome {
        let Some(idx) = self.holders.iter().position(|h| &h.owner == owner) else {
            return ReleaseOutcome::NotHolder;
        };
        self.holders[idx].count -= 1;
        if self.holders[idx].count > 0 {
            return ReleaseOutcome::Decremented;
        }
        self.holders.remove(idx);
        ReleaseOutcome::Released
    }

    /// Drop every hold of `owner` regardless of count. Returns the holds removed.
    pub(crate) fn release_all(&mut self, owner: &OwnerToken) -> u32 {
        let Some(idx) = self.holders.iter().position(|h| &h.owner == owner) else {
            return 0;
        };
        self.holders.remove(idx).count
    }

    pub(crate) fn info(&self) -> LockInfo {
        LockInfo {
            level: self.level,
            holders: self
                .holders
                .iter()
                .map(|h| HolderInfo {
                    owner: h.owner.to_string(),
                    count: h.count,
                    label: h.label.clone(),
                    acquired_at: h.acquired_at,
                })
                .collect(),
        }
    }
}

/// Snapshot of one owner's hold on a lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderInfo {
    pub owner: String,
    pub count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub acquired_at: DateTime<Utc>,
}

impl HolderInfo {
    /// Calculate the age of the hold.
    pub fn age(&self) -> AgeDuration {
        Utc::now().signed_duration_since(self.acquired_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let seconds = age.num_seconds();
        let minutes = age.num_minutes();
        let hours = age.num_hours();

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds)
        }
    }
}

/// Snapshot of a lock record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub level: LockLevel,
    pub holders: Vec<HolderInfo>,
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level)?;
        for holder in &self.holders {
            write!(
                f,
                " [owner: {}, holds: {}, age: {}{}]",
                holder.owner,
                holder.count,
                holder.age_string(),
                holder
                    .label
                    .as_deref()
                    .map(|l| format!(", label: {}", l))
                    .unwrap_or_default()
            )?;
        }
        Ok(())
    }
}
