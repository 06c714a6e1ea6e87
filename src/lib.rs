//! jointfile: in-process path locking and joinable file streams.
//!
//! Many threads share a set of filesystem paths through one
//! [`JoinableFileManager`]. A write lock on a directory covers every path
//! below it, locks are reentrant per owner, and a reader that opens a path
//! while it is being written tails the writer's output instead of seeing a
//! half-written file. Per-path bookkeeping exists only while something holds
//! the path.
//!
//! Ownership is decided by an [`OwnerToken`] resolved from an explicit
//! [`OwnerContext`]: the calling thread plus an optional label, so a logical
//! job can keep or hand over its locks independently of the thread running it.

pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod lock;
pub mod manager;
pub mod owner;
pub mod registry;
pub mod stream;

pub use config::{JoinMode, ManagerConfig};
pub use error::{JointError, Result};
pub use lock::{LockInfo, LockLevel, LockManager, Timeout};
pub use manager::JoinableFileManager;
pub use owner::{OWNER_LABEL_KEY, OwnerContext, OwnerToken};
pub use registry::{EntrySnapshot, Registry};
pub use stream::{ReadHandle, WriteHandle};
