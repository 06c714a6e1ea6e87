//! Configuration types and defaults for jointfile.

use serde::{Deserialize, Serialize};

/// Where a reader joining an in-progress write starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Read everything the writer has produced, then tail new bytes (default).
    #[default]
    FromStart,
    /// Skip what is already written and tail only new bytes.
    FromCurrent,
}

impl JoinMode {
    /// Parse a join mode from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "from_start" => Some(Self::FromStart),
            "from_current" => Some(Self::FromCurrent),
            _ => None,
        }
    }
}

// Default value functions for serde
pub(crate) fn default_timeout_ms() -> i64 {
    5000
}
pub(crate) fn default_true() -> bool {
    true
}
