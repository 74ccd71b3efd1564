//! Session configuration loaded from TOML

use crate::error::{Error, Result};
use crate::rate_limit::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_entity_patch_rate_limit_ms() -> u64 {
    90
}

fn default_true() -> bool {
    true
}

fn default_leader_heartbeat_interval_ms() -> u64 {
    1_000
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_max_message_size() -> usize {
    1024 * 1024
}

/// Settings shared by every system of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a request waits for its reply
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Minimum time between two patches of the same entity
    #[serde(default = "default_entity_patch_rate_limit_ms")]
    pub entity_patch_rate_limit_ms: u64,
    #[serde(default = "default_true")]
    pub entity_patch_rate_limit_enabled: bool,
    /// How often the scope leader reports that it is alive
    #[serde(default = "default_leader_heartbeat_interval_ms")]
    pub leader_heartbeat_interval_ms: u64,
    /// Deliver our own network events back to us
    #[serde(default)]
    pub allow_self_messaging: bool,
    /// Capacity of broadcast channels for entity, leader and conversation events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Largest accepted wire frame in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            entity_patch_rate_limit_ms: default_entity_patch_rate_limit_ms(),
            entity_patch_rate_limit_enabled: true,
            leader_heartbeat_interval_ms: default_leader_heartbeat_interval_ms(),
            allow_self_messaging: false,
            event_channel_capacity: default_event_channel_capacity(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SessionConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Config("event_channel_capacity must be positive".into()));
        }
        if self.max_message_size == 0 {
            return Err(Error::Config("max_message_size must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn leader_heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.leader_heartbeat_interval_ms)
    }

    pub fn patch_rate_limit(&self) -> RateLimitConfig {
        if self.entity_patch_rate_limit_enabled {
            RateLimitConfig::new(Duration::from_millis(self.entity_patch_rate_limit_ms), 1)
        } else {
            RateLimitConfig::disabled()
        }
    }
}
