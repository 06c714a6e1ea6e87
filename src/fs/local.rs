//! `std::fs` backed storage.

use super::{ReadSource, Storage};
use crate::error::{JointError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Storage on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for LocalStorage {
    /// Make `path` absolute, fold `.`/`..` lexically, then resolve symlinks
    /// on the longest prefix that exists.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| JointError::io(path, e))?
                .join(path)
        };
        let normalized = normalize_lexically(&absolute);

        let mut existing = normalized.as_path();
        let mut missing = Vec::new();
        while !existing.exists() {
            let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                return Ok(normalized);
            };
            missing.push(name.to_os_string());
            existing = parent;
        }

        let mut resolved = fs::canonicalize(existing).map_err(|e| JointError::io(existing, e))?;
        resolved.extend(missing.iter().rev());
        Ok(resolved)
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn ReadSource>> {
        let file = File::open(path).map_err(|e| JointError::io(path, e))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, path: &Path, create_parents: bool) -> Result<Box<dyn Write + Send>> {
        if create_parents
            && let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| JointError::io(parent, e))?;
        }

        let file = File::create(path).map_err(|e| JointError::io(path, e))?;
        Ok(Box::new(file))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Remove `.` components and fold `..` into its parent without touching disk.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
