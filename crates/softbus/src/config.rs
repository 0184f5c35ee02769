// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Softbus configuration.
//!
//! Supports both programmatic and file-based configuration.
//!
//! ```toml
//! [work_queue]
//! capacity = 64
//! name = "softbus-work"
//!
//! [messenger]
//! package_name = "ohos.dslm"
//! primary_session_name = "device.security.level"
//! open_session_attempts = 2
//!
//! [discovery]
//! call_internal_modules = true
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest message the messenger accepts in either direction.
pub const MAX_MESSAGE_LEN: usize = 81_920 * 4;

/// Largest opaque capability payload attached to a publish/subscribe request.
pub const MAX_CAPABILITY_DATA_LEN: usize = 512;

/// Environment override for [`WorkQueueConfig::capacity`].
pub const ENV_QUEUE_CAPACITY: &str = "SOFTBUS_QUEUE_CAPACITY";
/// Environment override for [`DiscoveryConfig::call_internal_modules`].
pub const ENV_CALL_INTERNAL_MODULES: &str = "SOFTBUS_CALL_INTERNAL_MODULES";
/// Environment override for [`MessengerConfig::open_session_attempts`].
pub const ENV_OPEN_SESSION_ATTEMPTS: &str = "SOFTBUS_OPEN_SESSION_ATTEMPTS";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftbusConfig {
    #[serde(default)]
    pub work_queue: WorkQueueConfig,

    #[serde(default)]
    pub messenger: MessengerConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl SoftbusConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `SOFTBUS_*` environment overrides on top of the loaded values.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(s) = std::env::var(ENV_QUEUE_CAPACITY) {
            match s.parse::<usize>() {
                Ok(v) => self.work_queue.capacity = v,
                Err(e) => log::warn!("[config] ignoring {}={:?}: {}", ENV_QUEUE_CAPACITY, s, e),
            }
        }
        if let Ok(s) = std::env::var(ENV_CALL_INTERNAL_MODULES) {
            match s.parse::<bool>() {
                Ok(v) => self.discovery.call_internal_modules = v,
                Err(e) => log::warn!(
                    "[config] ignoring {}={:?}: {}",
                    ENV_CALL_INTERNAL_MODULES,
                    s,
                    e
                ),
            }
        }
        if let Ok(s) = std::env::var(ENV_OPEN_SESSION_ATTEMPTS) {
            match s.parse::<u32>() {
                Ok(v) => self.messenger.open_session_attempts = v,
                Err(e) => log::warn!(
                    "[config] ignoring {}={:?}: {}",
                    ENV_OPEN_SESSION_ATTEMPTS,
                    s,
                    e
                ),
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.work_queue.validate()?;
        self.messenger.validate()?;
        self.discovery.validate()
    }
}

/// Work queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkQueueConfig {
    /// Maximum number of queued, not yet executed, items.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// Consumer thread name.
    #[serde(default = "default_queue_name")]
    pub name: String,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_queue_name() -> String {
    "softbus-work".to_string()
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            name: default_queue_name(),
        }
    }
}

impl WorkQueueConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid(
                "work_queue.capacity must be at least 1".into(),
            ));
        }
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("work_queue.name is empty".into()));
        }
        Ok(())
    }
}

/// Messenger settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessengerConfig {
    /// Package name used towards the topology and the transport.
    #[serde(default = "default_package_name")]
    pub package_name: String,

    /// Session name used for outbound sessions and the primary session server.
    #[serde(default = "default_primary_session_name")]
    pub primary_session_name: String,

    /// Optional fallback session name.
    #[serde(default)]
    pub secondary_session_name: Option<String>,

    /// Synchronous attempts per session name when opening a session.
    ///
    /// The default of 2 means "try, then retry once".
    #[serde(default = "default_open_session_attempts")]
    pub open_session_attempts: u32,

    /// Attempts to create a session server (or register with the topology)
    /// at startup.
    #[serde(default = "default_init_attempts")]
    pub init_attempts: u32,

    /// Sleep between two startup attempts, in milliseconds.
    #[serde(default = "default_init_retry_interval_ms")]
    pub init_retry_interval_ms: u64,

    /// Largest accepted message, in bytes.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

fn default_package_name() -> String {
    "ohos.dslm".to_string()
}

fn default_primary_session_name() -> String {
    "device.security.level".to_string()
}

fn default_open_session_attempts() -> u32 {
    2
}

fn default_init_attempts() -> u32 {
    30
}

fn default_init_retry_interval_ms() -> u64 {
    1000
}

fn default_max_message_len() -> usize {
    MAX_MESSAGE_LEN
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            package_name: default_package_name(),
            primary_session_name: default_primary_session_name(),
            secondary_session_name: None,
            open_session_attempts: default_open_session_attempts(),
            init_attempts: default_init_attempts(),
            init_retry_interval_ms: default_init_retry_interval_ms(),
            max_message_len: default_max_message_len(),
        }
    }
}

impl MessengerConfig {
    /// Sleep between two startup attempts.
    pub fn init_retry_interval(&self) -> Duration {
        Duration::from_millis(self.init_retry_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.package_name.is_empty() {
            return Err(ConfigError::Invalid("messenger.package_name is empty".into()));
        }
        if self.primary_session_name.is_empty() {
            return Err(ConfigError::Invalid(
                "messenger.primary_session_name is empty".into(),
            ));
        }
        if matches!(&self.secondary_session_name, Some(name) if name.is_empty()) {
            return Err(ConfigError::Invalid(
                "messenger.secondary_session_name is empty".into(),
            ));
        }
        if self.open_session_attempts == 0 {
            return Err(ConfigError::Invalid(
                "messenger.open_session_attempts must be at least 1".into(),
            ));
        }
        if self.init_attempts == 0 {
            return Err(ConfigError::Invalid(
                "messenger.init_attempts must be at least 1".into(),
            ));
        }
        if self.max_message_len == 0 || self.max_message_len > MAX_MESSAGE_LEN {
            return Err(ConfigError::Invalid(format!(
                "messenger.max_message_len must be in 1..={}",
                MAX_MESSAGE_LEN
            )));
        }
        Ok(())
    }
}

/// Discovery manager settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Deliver found-device events to internal modules (LNN, CONN).
    #[serde(default = "default_true")]
    pub call_internal_modules: bool,

    /// Largest capability payload accepted with a request.
    #[serde(default = "default_max_capability_data_len")]
    pub max_capability_data_len: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_capability_data_len() -> usize {
    MAX_CAPABILITY_DATA_LEN
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            call_internal_modules: true,
            max_capability_data_len: default_max_capability_data_len(),
        }
    }
}

impl DiscoveryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_capability_data_len > MAX_CAPABILITY_DATA_LEN {
            return Err(ConfigError::Invalid(format!(
                "discovery.max_capability_data_len must be <= {}",
                MAX_CAPABILITY_DATA_LEN
            )));
        }
        Ok(())
    }
}
