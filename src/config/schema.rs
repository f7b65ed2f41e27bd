//! Configuration schema for buildgate
//!
//! Configuration is stored at `~/.config/buildgate/config.toml`

use crate::session::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Status streaming settings
    pub status: StatusConfig,

    /// Session tunnel settings
    pub session: SessionConfig,
}

impl Config {
    /// Check values serde cannot rule out. Returns the reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.status.channel_capacity == 0 {
            return Err("status.channel_capacity must be at least 1".to_string());
        }
        if self.session.max_frame_size == 0 {
            return Err("session.max_frame_size must be at least 1".to_string());
        }
        match self.general.log_format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(format!(
                "general.log_format must be \"text\" or \"json\", got {:?}",
                other
            )),
        }
    }
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Status streaming configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Progress batches buffered between engine and outbound stream
    pub channel_capacity: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 8,
        }
    }
}

/// Session tunnel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Largest payload written into one outbound message
    pub max_frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
