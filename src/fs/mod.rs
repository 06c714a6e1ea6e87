//! Storage backend for jointfile.
//!
//! The lock and stream machinery never touches the filesystem directly; it
//! goes through a [`Storage`] implementation that resolves canonical paths
//! and hands out byte sources and sinks. [`LocalStorage`] is the default,
//! backed by `std::fs`.

mod local;

pub use local::LocalStorage;

use crate::error::Result;
use std::fmt;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

/// A readable, seekable byte source.
pub trait ReadSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSource for T {}

/// Byte-level access to the files the manager mediates.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Resolve `path` to the canonical form used as the registry key.
    ///
    /// Must work for paths that do not exist yet.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /// Open `path` for reading from the start.
    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSource>>;

    /// Create or truncate `path` for writing.
    fn open_write(&self, path: &Path, create_parents: bool) -> Result<Box<dyn Write + Send>>;

    fn exists(&self, path: &Path) -> bool;
}
