// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # softbus - distributed discovery and device messaging core
//!
//! A portable coordination layer for peer discovery and device-to-device
//! messaging. Medium backends (BLE, CoAP), the session transport and the
//! network topology are collaborators behind traits; this crate owns the
//! registration bookkeeping, the capability fan-out, per-device session
//! lifecycles and the threads that move callbacks off latency-sensitive paths.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use softbus::WorkQueue;
//!
//! fn main() -> softbus::Result<()> {
//!     let queue = WorkQueue::new(64, "app-work")?;
//!     queue
//!         .enqueue(b"hello".to_vec(), |data| println!("{} bytes", data.len()))
//!         .map_err(|e| e.kind)?;
//!     queue.destroy()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        Application / clients                        |
//! +----------------------------------+----------------------------------+
//! |          DiscoveryManager        |            Messenger             |
//! |  ServiceLists | CapabilityIndex  |  SessionManager | DeviceStatus   |
//! +----------------------------------+----------------------------------+
//! |   DiscoveryBackend (BLE, CoAP)   | SessionTransport | DeviceTopology|
//! +----------------------------------+----------------------------------+
//! |          WorkQueue | PendingRegistry | DiscoveryStats               |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`WorkQueue`] | Bounded FIFO run by one named consumer thread |
//! | [`PendingRegistry`] | Blocking request/reply correlation by (channel, seq) |
//! | [`Messenger`] | Identity-addressed messaging and device status |
//! | [`DiscoveryManager`] | Publish/subscribe multiplexing over medium backends |
//! | [`SoftbusConfig`] | TOML configuration with env overrides |

/// Configuration (TOML file, env overrides, validation).
pub mod config;
/// Capability publish/subscribe discovery over medium backends.
pub mod discovery;
/// Error types.
pub mod error;
/// Device messenger (sessions, device status, identities).
pub mod messenger;
/// Pending request/reply registry.
pub mod pending;
/// Discovery statistics sink and atomic counters.
pub mod telemetry;
/// Bounded single-consumer work queue.
pub mod work_queue;

pub use config::{DiscoveryConfig, MessengerConfig, SoftbusConfig, WorkQueueConfig};
pub use discovery::{
    Backends, DeviceInfo, DiscModule, DiscoverMode, DiscoveryBackend, DiscoveryListener,
    DiscoveryManager, ExchangeMedium, PublishInfo, SubscribeInfo,
};
pub use error::{
    CollaboratorError, ConfigError, DiscoveryError, Error, MessengerError, PendingError, Result,
    WorkQueueError,
};
pub use messenger::{DeviceIdentity, DeviceStatus, Messenger, MessengerCallbacks};
pub use pending::{PendingRegistry, PendingReply};
pub use telemetry::{DiscoveryMetrics, DiscoveryStats, NoopStats};
pub use work_queue::{EnqueueError, WorkQueue};
