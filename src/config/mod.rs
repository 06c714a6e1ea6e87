//! Configuration model for jointfile.
//!
//! This module defines the `ManagerConfig` struct that tunes a
//! `JoinableFileManager`. It supports forward-compatible YAML parsing (unknown
//! fields are ignored), sensible defaults for optional fields, and validation
//! of config values.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::ManagerConfig;
pub use types::JoinMode;
