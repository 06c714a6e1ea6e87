//! Owner identity for lock and stream bookkeeping.
//!
//! Every lock and every open handle belongs to an [`OwnerToken`]. A token is
//! derived from the calling thread plus an optional label carried in an
//! [`OwnerContext`]. The context is an explicit value the caller passes into
//! the manager; clones share the same underlying map, so a label set through
//! one clone is seen by every handle opened with another.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Well-known context key holding the owner label.
pub const OWNER_LABEL_KEY: &str = "jointfile.lock-owner";

/// Identity used to decide lock compatibility.
///
/// Two operations are the same owner iff their tokens compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken {
    thread: ThreadId,
    label: Option<Arc<str>>,
}

impl OwnerToken {
    /// Token for the calling thread, optionally narrowed by a label.
    pub fn for_current_thread(label: Option<&str>) -> Self {
        Self {
            thread: thread::current().id(),
            label: label.map(Arc::from),
        }
    }

    /// The thread this token was resolved on.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// The label override, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}@{:?}", label, self.thread),
            None => write!(f, "{:?}", self.thread),
        }
    }
}

/// Call-scoped key/value context that carries the owner label.
#[derive(Debug, Clone, Default)]
pub struct OwnerContext {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl OwnerContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with the owner label already set.
    pub fn with_label(label: &str) -> Self {
        let ctx = Self::new();
        ctx.set_label(label);
        ctx
    }

    /// Resolve the owner token for the calling thread.
    pub fn resolve(&self) -> OwnerToken {
        let values = self.values.read();
        OwnerToken::for_current_thread(values.get(OWNER_LABEL_KEY).map(String::as_str))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: &str) -> Option<String> {
        self.values.write().insert(key.to_string(), value.to_string())
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values.write().remove(key)
    }

    /// Current owner label.
    pub fn label(&self) -> Option<String> {
        self.get(OWNER_LABEL_KEY)
    }

    /// Override the owner label for subsequent calls.
    pub fn set_label(&self, label: &str) {
        self.put(OWNER_LABEL_KEY, label);
    }

    pub fn clear_label(&self) {
        self.remove(OWNER_LABEL_KEY);
    }

    /// Drop every association so a pooled thread starts clean.
    pub fn forget_all(&self) {
        self.values.write().clear();
    }
}
