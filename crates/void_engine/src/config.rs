//! Engine configuration - TOML to EngineConfig conversion
//!
//! # Format
//!
//! ```toml
//! max_delta_time = 0.25
//! reinit_dependents = true
//! retire_warn_threshold = 256
//! reject_live_ids_on_load = true
//! ```
//!
//! Every key is optional; missing keys take their default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

const DEFAULT_MAX_DELTA: Duration = Duration::from_millis(250);

/// Engine configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum frame delta in seconds (caps lag spikes)
    pub max_delta_time: f32,
    /// Restage objects that reference reloaded objects
    pub reinit_dependents: bool,
    /// Warn when this many retired objects and composites await collection
    pub retire_warn_threshold: usize,
    /// Refuse identifiers that are already live during `load`
    pub reject_live_ids_on_load: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_delta_time: DEFAULT_MAX_DELTA.as_secs_f32(),
            reinit_dependents: true,
            retire_warn_threshold: 256,
            reject_live_ids_on_load: true,
        }
    }
}

impl EngineConfig {
    /// Parse from a TOML string
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        let representable = Duration::try_from_secs_f32(self.max_delta_time)
            .map_or(false, |d| !d.is_zero());
        if !self.max_delta_time.is_finite() || self.max_delta_time <= 0.0 || !representable {
            return Err(ConfigError::Invalid(format!(
                "max_delta_time must be a positive number of seconds, got {}",
                self.max_delta_time
            )));
        }
        Ok(())
    }

    /// `max_delta_time` as a duration. Values [`validate`](Self::validate)
    /// rejects fall back to the default cap.
    pub fn max_delta(&self) -> Duration {
        Duration::try_from_secs_f32(self.max_delta_time)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_MAX_DELTA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
max_delta_time = 0.1
reinit_dependents = false
"#,
        )
        .unwrap();
        assert_eq!(config.max_delta_time, 0.1);
        assert!(!config.reinit_dependents);
        assert_eq!(config.retire_warn_threshold, 256);
        assert!(config.reject_live_ids_on_load);
    }

    #[test]
    fn test_invalid_delta() {
        let err = EngineConfig::from_toml_str("max_delta_time = -1.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unrepresentable_delta() {
        let err = EngineConfig::from_toml_str("max_delta_time = 1e30").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        for max_delta_time in [1e30, -1.0, f32::NAN, 1e-12] {
            let config = EngineConfig {
                max_delta_time,
                ..EngineConfig::default()
            };
            assert!(config.validate().is_err());
            assert_eq!(config.max_delta(), DEFAULT_MAX_DELTA);
        }
    }

    #[test]
    fn test_parse_error() {
        let err = EngineConfig::from_toml_str("max_delta_time = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
