//! Command implementations for jointfile.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Each command builds its own manager from the loaded
//! configuration.

mod cat;
mod copy;

use crate::cli::Command;
use jointfile::{JoinableFileManager, JointError, ManagerConfig, Result};
use std::path::Path;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command, config: ManagerConfig) -> Result<()> {
    match command {
        Command::Cat(args) => cat::cmd_cat(&JoinableFileManager::with_config(config), args),
        Command::Copy(args) => copy::cmd_copy(config, args),
        Command::Config => cmd_config(&config),
    }
}

fn cmd_config(config: &ManagerConfig) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}

/// Fail with a user error unless `path` exists.
fn require_existing(mgr: &JoinableFileManager, path: &Path) -> Result<()> {
    if mgr.exists(path) {
        Ok(())
    } else {
        Err(JointError::Config(format!(
            "no such file: '{}'",
            path.display()
        )))
    }
}
