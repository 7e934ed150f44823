// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel configuration.
//!
//! Supports both programmatic and file-based configuration:
//!
//! ```toml
//! connection_timeout_ms = 3000
//! auto_connect = true
//! event_queue_depth = 1024
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Per-channel behaviour shared by every channel opened from a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// How long a connection attempt may stay pending before it is abandoned.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Request a connection as soon as the channel is opened.
    #[serde(default)]
    pub auto_connect: bool,

    /// Capacity of each `events()` queue. Events are dropped when full.
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

fn default_connection_timeout_ms() -> u64 {
    3000
}

fn default_event_queue_depth() -> usize {
    1024
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connection_timeout_ms: default_connection_timeout_ms(),
            auto_connect: false,
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

impl ChannelConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connection_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.event_queue_depth == 0 {
            return Err(ConfigError::Invalid(
                "event_queue_depth must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    pub fn with_event_queue_depth(mut self, depth: usize) -> Self {
        self.event_queue_depth = depth;
        self
    }
}
