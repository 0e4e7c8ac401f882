//! Stream configuration with TOML overrides.
//!
//! Every field has a default matching a stock GRBL setup, so a config
//! file is optional and may set any subset:
//!
//! ```toml
//! baud = 115200
//! capacity = 127
//! drain_residual = 2
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Serial line speed.
    #[serde(default = "default_baud")]
    pub baud: u32,

    /// Line parity: "none", "even" or "odd". Present for unusual boards; not
    /// exposed on the CLI.
    #[serde(default = "default_parity")]
    pub parity: String,

    /// Throttle threshold in bytes: the firmware receive buffer (128 on
    /// stock GRBL) minus a safety margin. Transmission stalls while the
    /// unacknowledged total is at or above this.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Bounded wait for one inbound poll.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Grace period after the wake sequence before the first command.
    #[serde(default = "default_wake_delay_ms")]
    pub wake_delay_ms: u64,

    /// Longest acceptable silence while throttled before the stream is
    /// aborted. Generous by default: a full planner buffer acknowledges only
    /// as fast as moves complete.
    #[serde(default = "default_ack_deadline_ms")]
    pub ack_deadline_ms: u64,

    /// Longest acceptable silence during the end-of-input drain before the
    /// leftover entries are written off.
    #[serde(default = "default_drain_deadline_ms")]
    pub drain_deadline_ms: u64,

    /// Stop draining once this many commands remain unacknowledged. The
    /// final responses are often missed, so 0 is not the default.
    #[serde(default = "default_drain_residual")]
    pub drain_residual: usize,
}

fn default_baud() -> u32 {
    115_200
}
fn default_parity() -> String {
    "none".to_string()
}
fn default_capacity() -> usize {
    127
}
fn default_read_timeout_ms() -> u64 {
    100
}
fn default_wake_delay_ms() -> u64 {
    2_000
}
fn default_ack_deadline_ms() -> u64 {
    60_000
}
fn default_drain_deadline_ms() -> u64 {
    30_000
}
fn default_drain_residual() -> usize {
    2
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            baud: default_baud(),
            parity: default_parity(),
            capacity: default_capacity(),
            read_timeout_ms: default_read_timeout_ms(),
            wake_delay_ms: default_wake_delay_ms(),
            ack_deadline_ms: default_ack_deadline_ms(),
            drain_deadline_ms: default_drain_deadline_ms(),
            drain_residual: default_drain_residual(),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < 2 {
            return Err(ConfigError::Invalid(format!(
                "capacity must be at least 2 bytes, got {}",
                self.capacity
            )));
        }
        if !matches!(self.parity.as_str(), "none" | "even" | "odd") {
            return Err(ConfigError::Invalid(format!(
                "parity must be one of none/even/odd, got '{}'",
                self.parity
            )));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "read_timeout_ms must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn wake_delay(&self) -> Duration {
        Duration::from_millis(self.wake_delay_ms)
    }

    pub fn ack_deadline(&self) -> Duration {
        Duration::from_millis(self.ack_deadline_ms)
    }

    pub fn drain_deadline(&self) -> Duration {
        Duration::from_millis(self.drain_deadline_ms)
    }
}

/// Load a config file, falling back to defaults for every absent field.
pub fn load_config(path: &Path) -> Result<StreamConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: StreamConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
