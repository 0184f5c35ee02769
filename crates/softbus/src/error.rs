// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for every softbus component.
//!
//! Each component owns a narrow error enum so callers can match on the exact
//! failure; [`Error`] unifies them at the crate boundary.

use crate::discovery::ExchangeMedium;
use thiserror::Error;

/// Work queue errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkQueueError {
    /// Queue already holds `capacity` items (back-pressure, not fatal).
    #[error("work queue is full")]
    Full,

    /// Queue has been stopped; no more work is accepted.
    #[error("work queue is stopped")]
    Stopped,

    /// Consumer thread could not be spawned.
    #[error("failed to spawn work queue thread: {0}")]
    Spawn(String),

    /// Consumer thread panicked while running a work item.
    #[error("work queue consumer thread panicked")]
    ConsumerPanicked,
}

/// Pending packet registry errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PendingError {
    /// An entry for the same (channel, seq) is already in flight.
    #[error("pending packet already exists: channel={channel_id} seq={seq}")]
    AlreadyExists { channel_id: i32, seq: i32 },

    /// No entry for (channel, seq).
    #[error("pending packet not found: channel={channel_id} seq={seq}")]
    NotFound { channel_id: i32, seq: i32 },

    /// Deadline passed before the reply arrived.
    #[error("pending packet timed out: channel={channel_id} seq={seq}")]
    Timeout { channel_id: i32, seq: i32 },
}

/// Discovery manager errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("discovery manager is not initialized")]
    NotInitialized,

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("invalid medium: {0}")]
    InvalidMedium(i32),

    #[error("unknown capability: {0}")]
    CapabilityInvalid(String),

    #[error("package name too long: {0} bytes")]
    PackageNameTooLong(usize),

    #[error("duplicate registration: package={package} id={id}")]
    Duplicate { package: String, id: i32 },

    #[error("registration not found: package={package} id={id}")]
    InfoNotFound { package: String, id: i32 },

    #[error("all discovery backends failed for medium {medium:?}")]
    BackendFailure { medium: ExchangeMedium },

    #[error("no discovery backend available")]
    NoBackend,
}

/// Collaborator error reported by a transport, topology or discovery backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed with code {code}")]
pub struct CollaboratorError {
    pub operation: &'static str,
    pub code: i32,
}

impl CollaboratorError {
    pub fn new(operation: &'static str, code: i32) -> Self {
        Self { operation, code }
    }
}

/// Messenger (session + device status) errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessengerError {
    #[error("invalid message length: {0}")]
    InvalidMessage(usize),

    #[error("device {0:08x}*** is not known to the topology")]
    DeviceNotFound(u32),

    #[error("could not open a session to device {0:08x}***")]
    SessionOpenFailed(u32),

    #[error("messenger is not initialized")]
    NotInitialized,

    #[error("invalid messenger configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Queue(#[from] WorkQueueError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("work queue: {0}")]
    WorkQueue(#[from] WorkQueueError),

    #[error("pending packet: {0}")]
    Pending(#[from] PendingError),

    #[error("discovery: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("messenger: {0}")]
    Messenger(#[from] MessengerError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

/// Convenient alias for results using the crate-level [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
