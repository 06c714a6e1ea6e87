//! ManagerConfig struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for a `JoinableFileManager`.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Timeout used by stream opens that do not pass one explicitly.
    ///
    /// Negative values fail fast, `i64::MAX` waits forever.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: i64,

    /// Maximum number of concurrently open readers per path (unbounded when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_readers: Option<usize>,

    /// Where readers joining an in-progress write start.
    #[serde(default)]
    pub join_mode: JoinMode,

    /// Whether opening a writer creates missing parent directories.
    #[serde(default = "default_true")]
    pub create_parent_dirs: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_readers: None,
            join_mode: JoinMode::default(),
            create_parent_dirs: default_true(),
        }
    }
}
