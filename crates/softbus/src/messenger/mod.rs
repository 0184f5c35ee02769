// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device messenger: identity-addressed messaging plus device status.
//!
//! ```text
//!            send_message                       on_message / on_status
//! caller ---------------> SessionManager        ^
//!                              | open/send      | (work queue thread)
//!                              v                |
//!                        SessionTransport --> WorkQueue <-- DeviceStatusManager
//!                                                              ^
//!                                             DeviceTopology --+
//! ```
//!
//! [`Messenger`] owns one [`WorkQueue`] shared by inbound messages and status
//! notifications, so both reach the application in a single FIFO order.

pub mod directory;
pub mod identity;
pub mod session;
pub mod status;

pub use directory::{DeviceDirectory, DeviceTopology, TopologyDevice, TopologyEvent, TopologyListener};
pub use identity::{DeviceIdentity, DEVICE_ID_MAX_LEN};
pub use session::{
    DeviceMessageReceiver, SendResultNotifier, SessionListener, SessionManager, SessionManagerParams,
    SessionSide, SessionTransport,
};
pub use status::{DeviceStatus, DeviceStatusManager, DeviceStatusReceiver};

use crate::config::SoftbusConfig;
use crate::error::MessengerError;
use crate::work_queue::WorkQueue;
use parking_lot::RwLock;
use std::sync::Arc;

/// Application callbacks of a [`Messenger`].
pub struct MessengerCallbacks {
    pub message_receiver: Arc<dyn DeviceMessageReceiver>,
    pub status_receiver: Arc<dyn DeviceStatusReceiver>,
    pub send_result_notifier: Option<Arc<dyn SendResultNotifier>>,
}

struct Components {
    session: SessionManager,
    status: DeviceStatusManager,
}

/// Owned messenger instance; construct at startup, [`Messenger::shutdown`]
/// (or drop) at exit.
pub struct Messenger {
    queue: Arc<WorkQueue>,
    directory: Arc<DeviceDirectory>,
    components: RwLock<Option<Components>>,
}

impl Messenger {
    /// Validate `config`, then start the work queue, the status manager and
    /// the session manager in that order. A failure tears down whatever was
    /// already started.
    pub fn new(
        config: &SoftbusConfig,
        transport: Arc<dyn SessionTransport>,
        topology: Arc<dyn DeviceTopology>,
        callbacks: MessengerCallbacks,
    ) -> Result<Self, MessengerError> {
        config.validate().map_err(|e| {
            log::error!("[session] messenger config rejected: {}", e);
            MessengerError::InvalidConfig(e.to_string())
        })?;
        let queue = Arc::new(WorkQueue::from_config(&config.work_queue)?);
        let directory = Arc::new(DeviceDirectory::new(topology, &config.messenger.package_name));

        let status = DeviceStatusManager::init(
            &config.messenger,
            Arc::clone(&directory),
            Arc::clone(&queue),
            callbacks.status_receiver,
        )
        .map_err(|e| {
            log::error!("[session] messenger init failed at device status: {}", e);
            let _ = queue.destroy();
            e
        })?;

        let session = SessionManager::init(SessionManagerParams {
            config: config.messenger.clone(),
            transport,
            directory: Arc::clone(&directory),
            queue: Arc::clone(&queue),
            receiver: callbacks.message_receiver,
            notifier: callbacks.send_result_notifier,
        })
        .map_err(|e| {
            log::error!("[session] messenger init failed at session servers: {}", e);
            status.deinit();
            let _ = queue.destroy();
            e
        })?;

        log::info!(
            "[session] messenger ready for {} (queue capacity {})",
            config.messenger.package_name,
            queue.capacity()
        );
        Ok(Self {
            queue,
            directory,
            components: RwLock::new(Some(Components { session, status })),
        })
    }

    /// See [`SessionManager::send_message`].
    pub fn send_message(
        &self,
        transaction_no: u64,
        destination: &DeviceIdentity,
        data: &[u8],
    ) -> Result<(), MessengerError> {
        let components = self.components.read();
        let components = components.as_ref().ok_or(MessengerError::NotInitialized)?;
        components.session.send_message(transaction_no, destination, data)
    }

    pub fn self_identity(&self) -> Option<(DeviceIdentity, u32)> {
        self.directory.self_identity()
    }

    /// Device type of `device` when it is online.
    pub fn device_online_status(&self, device: &DeviceIdentity) -> Option<u32> {
        self.directory.device_online_status(device)
    }

    pub fn for_each_device<F>(&self, f: F)
    where
        F: FnMut(&DeviceIdentity, u32),
    {
        self.directory.for_each_device(f)
    }

    pub fn directory(&self) -> &Arc<DeviceDirectory> {
        &self.directory
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Transport callbacks, for transports wired up after construction.
    pub fn session_listener(&self) -> Option<Arc<dyn SessionListener>> {
        self.components.read().as_ref().map(|c| c.session.listener())
    }

    /// Topology callbacks, for topologies wired up after construction.
    pub fn topology_listener(&self) -> Option<Arc<dyn TopologyListener>> {
        self.components.read().as_ref().map(|c| c.status.listener())
    }

    pub fn pending_count(&self) -> usize {
        self.components
            .read()
            .as_ref()
            .map_or(0, |c| c.session.pending_count())
    }

    pub fn open_session_count(&self) -> usize {
        self.components
            .read()
            .as_ref()
            .map_or(0, |c| c.session.open_session_count())
    }

    pub fn is_running(&self) -> bool {
        self.components.read().is_some()
    }

    /// Deinitialise sessions, then device status, then destroy the queue.
    /// Items still queued are discarded. Idempotent.
    pub fn shutdown(&self) {
        let Some(components) = self.components.write().take() else {
            return;
        };
        components.session.deinit();
        components.status.deinit();
        drop(components);
        if let Err(e) = self.queue.destroy() {
            log::error!("[session] work queue shutdown: {}", e);
        }
        log::info!("[session] messenger shut down");
    }
}

impl Drop for Messenger {
    fn drop(&mut self) {
        self.shutdown();
    }
}
