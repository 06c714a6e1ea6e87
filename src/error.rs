//! Error types for jointfile.
//!
//! Uses thiserror for derive macros. Timeouts are not errors: acquisition and
//! stream-open calls report "not available yet" through `bool`/`Option` results.

use crate::exit_codes;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for jointfile operations.
#[derive(Error, Debug)]
pub enum JointError {
    /// The storage backend failed while reading, writing, or resolving a path.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A release or close was attempted by a token that does not hold the resource.
    #[error("Ownership violation: {0}")]
    OwnershipViolation(String),

    /// Registry bookkeeping reached a state that should be impossible.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Invalid configuration or user input.
    #[error("{0}")]
    Config(String),

    /// A path stayed busy for the whole timeout.
    #[error("Path is busy: {0}")]
    Busy(String),
}

impl JointError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        JointError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            JointError::Io { .. } => exit_codes::IO_FAILURE,
            JointError::OwnershipViolation(_) => exit_codes::IO_FAILURE,
            JointError::Invariant(_) => exit_codes::INVARIANT_FAILURE,
            JointError::Config(_) => exit_codes::USER_ERROR,
            JointError::Busy(_) => exit_codes::LOCK_FAILURE,
        }
    }
}

impl From<JointError> for std::io::Error {
    fn from(err: JointError) -> Self {
        match err {
            JointError::Io { source, .. } => source,
            JointError::Busy(msg) => std::io::Error::new(std::io::ErrorKind::WouldBlock, msg),
            other => std::io::Error::other(other),
        }
    }
}

/// Result type alias for jointfile operations.
pub type Result<T> = std::result::Result<T, JointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_has_correct_exit_code() {
        let err = JointError::io("/tmp/x", std::io::Error::other("disk gone"));
        assert_eq!(err.exit_code(), exit_codes::IO_FAILURE);
    }

    #[test]
    fn ownership_violation_is_io_category() {
        let err = JointError::OwnershipViolation("not yours".to_string());
        assert_eq!(err.exit_code(), exit_codes::IO_FAILURE);

        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::Other);
        assert!(io.to_string().contains("not yours"));
    }

    #[test]
    fn busy_and_config_errors_have_correct_exit_codes() {
        assert_eq!(
            JointError::Busy("/a".to_string()).exit_code(),
            exit_codes::LOCK_FAILURE
        );
        assert_eq!(
            JointError::Config("bad".to_string()).exit_code(),
            exit_codes::USER_ERROR
        );
        assert_eq!(
            JointError::Invariant("x".to_string()).exit_code(),
            exit_codes::INVARIANT_FAILURE
        );
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = JointError::io("/data/file.txt", std::io::Error::other("boom"));
        assert_eq!(err.to_string(), "I/O error on '/data/file.txt': boom");

        let err = JointError::Busy("/data".to_string());
        assert_eq!(err.to_string(), "Path is busy: /data");
    }

    #[test]
    fn io_error_round_trips_its_kind() {
        let err = JointError::io(
            "/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
    }
}
