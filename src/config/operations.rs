//! Config loading, validation, and utility operations.

use super::model::ManagerConfig;
use crate::error::{JointError, Result};
use crate::lock::Timeout;
use std::path::Path;

impl ManagerConfig {
    /// Load config from a YAML file.
    ///
    /// # Returns
    ///
    /// * `Ok(ManagerConfig)` - Successfully loaded and validated config
    /// * `Err(JointError::Config)` - Read error, parse error, or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            JointError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ManagerConfig = serde_yaml::from_str(yaml)
            .map_err(|e| JointError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| JointError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values.
    ///
    /// Validation rules:
    /// - `max_readers`, when set, must be positive
    pub fn validate(&self) -> Result<()> {
        if self.max_readers == Some(0) {
            return Err(JointError::Config(
                "config validation failed: max_readers must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// The configured default timeout as a `Timeout`.
    pub fn default_timeout(&self) -> Timeout {
        Timeout::from_millis(self.default_timeout_ms)
    }
}
