//! Bridge configuration: TOML or JSON, every field defaulted.
//!
//! ```toml
//! [wait]
//! poll_interval_ms = 1000
//!
//! [driver]
//! operation_timeout_ms = 0   # 0 = no deadline
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub wait: WaitSection,

    #[serde(default)]
    pub driver: DriverSection,
}

/// `[wait]` section: the readiness bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitSection {
    /// Upper bound on a single readiness wait, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WaitSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WaitSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// `[driver]` section: the retry loop around engine operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverSection {
    /// Deadline for one engine operation, in milliseconds, measured from its
    /// first call. A whole `Driver::write_all` is one operation. 0 disables it.
    #[serde(default)]
    pub operation_timeout_ms: u64,
}

impl DriverSection {
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Config {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Load a TOML file, returning defaults if it does not exist. The result
    /// is validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        config.validate()?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // A zero interval turns every wait into a busy poll.
        if self.wait.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "wait.poll_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    ParseError(String),
    #[error("failed to serialize config: {0}")]
    SerializeError(String),
    #[error("config validation failed: {0}")]
    ValidationError(String),
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}
