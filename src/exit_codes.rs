//! Exit code constants for the jointfile CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 2: I/O failure (storage backend, ownership violation on close)
//! - 4: Lock acquisition failure (path busy for the whole timeout)
//! - 5: Internal invariant violation

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// I/O failure reported by the storage backend or a mismatched close.
pub const IO_FAILURE: i32 = 2;

/// Lock acquisition failure: the path stayed locked past the timeout.
pub const LOCK_FAILURE: i32 = 4;

/// Registry bookkeeping defect.
pub const INVARIANT_FAILURE: i32 = 5;
