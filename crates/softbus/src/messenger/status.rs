// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device online/offline notifications.
//!
//! Topology events are reduced to two states: `Ready` means online and
//! `Offline` means offline. `Online` (link up, not usable yet) and `Changed`
//! are ignored. Every notification is delivered through the [`WorkQueue`].

use super::directory::{DeviceDirectory, TopologyDevice, TopologyEvent, TopologyListener};
use super::identity::DeviceIdentity;
use crate::config::MessengerConfig;
use crate::error::MessengerError;
use crate::work_queue::WorkQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Reduced device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// Application consumer of device status changes.
pub trait DeviceStatusReceiver: Send + Sync {
    fn on_status(&self, device: &DeviceIdentity, status: DeviceStatus, device_type: u32);
}

impl<F> DeviceStatusReceiver for F
where
    F: Fn(&DeviceIdentity, DeviceStatus, u32) + Send + Sync,
{
    fn on_status(&self, device: &DeviceIdentity, status: DeviceStatus, device_type: u32) {
        self(device, status, device_type)
    }
}

struct StatusInner {
    directory: Arc<DeviceDirectory>,
    queue: Arc<WorkQueue>,
    receiver: Arc<dyn DeviceStatusReceiver>,
    registered: AtomicBool,
}

/// Bridges topology events to a [`DeviceStatusReceiver`].
pub struct DeviceStatusManager {
    inner: Arc<StatusInner>,
}

impl DeviceStatusManager {
    /// Register with the topology (retrying while it is unavailable), then
    /// report every currently trusted device as online.
    pub fn init(
        config: &MessengerConfig,
        directory: Arc<DeviceDirectory>,
        queue: Arc<WorkQueue>,
        receiver: Arc<dyn DeviceStatusReceiver>,
    ) -> Result<Self, MessengerError> {
        let inner = Arc::new(StatusInner {
            directory,
            queue,
            receiver,
            registered: AtomicBool::new(false),
        });

        let listener: Arc<dyn TopologyListener> = Arc::new(TopologyAdapter {
            inner: Arc::downgrade(&inner),
        });

        let attempts = config.init_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let package_name = inner.directory.package_name();
            match inner
                .directory
                .topology()
                .register_listener(package_name, Arc::clone(&listener))
            {
                Ok(()) => break,
                Err(e) if attempt < attempts => {
                    log::warn!(
                        "[device-status] topology not ready (attempt {}/{}): {}",
                        attempt,
                        attempts,
                        e
                    );
                    std::thread::sleep(config.init_retry_interval());
                }
                Err(e) => {
                    log::error!("[device-status] topology registration failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        inner.registered.store(true, Ordering::Release);

        let manager = Self { inner };
        let mut reported = 0usize;
        manager.inner.directory.for_each_device(|identity, device_type| {
            manager.inner.notify(identity, DeviceStatus::Online, device_type);
            reported += 1;
        });
        log::info!("[device-status] init done, {} devices online", reported);
        Ok(manager)
    }

    /// Unregister from the topology. Idempotent.
    pub fn deinit(&self) {
        if !self.inner.registered.swap(false, Ordering::AcqRel) {
            return;
        }
        let directory = &self.inner.directory;
        if let Err(e) = directory.topology().unregister_listener(directory.package_name()) {
            log::error!("[device-status] topology unregistration failed: {}", e);
        }
    }

    /// Listener to hand to a topology that delivers events out of band.
    pub fn listener(&self) -> Arc<dyn TopologyListener> {
        Arc::new(TopologyAdapter {
            inner: Arc::downgrade(&self.inner),
        })
    }
}

impl Drop for DeviceStatusManager {
    fn drop(&mut self) {
        self.deinit();
    }
}

impl StatusInner {
    fn on_device_event(&self, event: TopologyEvent, device: &TopologyDevice) {
        let status = match event {
            TopologyEvent::Ready => DeviceStatus::Online,
            TopologyEvent::Offline => DeviceStatus::Offline,
            TopologyEvent::Online | TopologyEvent::Changed => {
                log::trace!("[device-status] ignoring {:?}", event);
                return;
            }
        };
        if !self.registered.load(Ordering::Acquire) {
            return;
        }
        let Some(identity) = self.directory.identity_by_network_id(&device.network_id) else {
            log::error!("[device-status] cannot resolve device for {:?} event", event);
            return;
        };
        log::info!(
            "[device-status] device {} {:?}, type {}",
            identity,
            status,
            device.device_type
        );
        self.notify(&identity, status, device.device_type);
    }

    fn notify(&self, identity: &DeviceIdentity, status: DeviceStatus, device_type: u32) {
        let receiver = Arc::clone(&self.receiver);
        let identity = *identity;
        let result = self.queue.enqueue(Vec::new(), move |_| {
            receiver.on_status(&identity, status, device_type)
        });
        if let Err(e) = result {
            log::warn!("[device-status] notification for {} dropped: {}", identity, e);
        }
    }
}

struct TopologyAdapter {
    inner: Weak<StatusInner>,
}

impl TopologyListener for TopologyAdapter {
    fn on_device_event(&self, event: TopologyEvent, device: &TopologyDevice) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_device_event(event, device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::messenger::directory::DeviceTopology;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Default)]
    struct FlakyTopology {
        failures_left: AtomicU32,
        listener: Mutex<Option<Arc<dyn TopologyListener>>>,
    }

    impl DeviceTopology for FlakyTopology {
        fn local_device(&self, _: &str) -> Result<TopologyDevice, CollaboratorError> {
            Ok(TopologyDevice::new("net-self", 1))
        }
        fn trusted_devices(&self, _: &str) -> Result<Vec<TopologyDevice>, CollaboratorError> {
            Ok(vec![TopologyDevice::new("net-a", 7)])
        }
        fn udid_by_network_id(&self, _: &str, network_id: &str) -> Result<String, CollaboratorError> {
            Ok(format!("udid-{}", network_id))
        }
        fn register_listener(&self, _: &str, listener: Arc<dyn TopologyListener>) -> Result<(), CollaboratorError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(CollaboratorError::new("register_listener", -1));
            }
            *self.listener.lock() = Some(listener);
            Ok(())
        }
        fn unregister_listener(&self, _: &str) -> Result<(), CollaboratorError> {
            self.listener.lock().take();
            Ok(())
        }
    }

    type Seen = mpsc::Receiver<(DeviceIdentity, DeviceStatus, u32)>;

    fn setup(topology: Arc<FlakyTopology>, attempts: u32) -> (Result<DeviceStatusManager, MessengerError>, Seen, Arc<WorkQueue>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let config = MessengerConfig {
            init_attempts: attempts,
            init_retry_interval_ms: 1,
            ..MessengerConfig::default()
        };
        let queue = Arc::new(WorkQueue::new(8, "status-test").expect("queue"));
        let directory = Arc::new(DeviceDirectory::new(topology, "ohos.test"));
        let receiver = move |id: &DeviceIdentity, status: DeviceStatus, device_type: u32| {
            let _ = tx.lock().send((*id, status, device_type));
        };
        let manager = DeviceStatusManager::init(&config, directory, Arc::clone(&queue), Arc::new(receiver));
        (manager, rx, queue)
    }

    #[test]
    fn test_init_retries_then_reports_trusted_devices() {
        let topology = Arc::new(FlakyTopology::default());
        topology.failures_left.store(2, Ordering::SeqCst);
        let (manager, rx, _queue) = setup(Arc::clone(&topology), 5);
        let _manager = manager.expect("init");

        let (id, status, device_type) = rx.recv_timeout(Duration::from_secs(5)).expect("online");
        assert_eq!(id, DeviceIdentity::from_udid("udid-net-a").expect("id"));
        assert_eq!(status, DeviceStatus::Online);
        assert_eq!(device_type, 7);
        assert!(topology.listener.lock().is_some());
    }

    #[test]
    fn test_init_gives_up() {
        let topology = Arc::new(FlakyTopology::default());
        topology.failures_left.store(10, Ordering::SeqCst);
        let (manager, _rx, _queue) = setup(topology, 3);
        assert!(matches!(manager, Err(MessengerError::Collaborator(_))));
    }

    #[test]
    fn test_event_mapping() {
        let topology = Arc::new(FlakyTopology::default());
        let (manager, rx, _queue) = setup(Arc::clone(&topology), 1);
        let manager = manager.expect("init");
        rx.recv_timeout(Duration::from_secs(5)).expect("initial");

        let listener = topology.listener.lock().clone().expect("listener");
        let device = TopologyDevice::new("net-b", 9);
        listener.on_device_event(TopologyEvent::Online, &device);
        listener.on_device_event(TopologyEvent::Changed, &device);
        listener.on_device_event(TopologyEvent::Ready, &device);
        listener.on_device_event(TopologyEvent::Offline, &device);

        let first = rx.recv_timeout(Duration::from_secs(5)).expect("ready");
        let second = rx.recv_timeout(Duration::from_secs(5)).expect("offline");
        assert_eq!(first.1, DeviceStatus::Online);
        assert_eq!(second.1, DeviceStatus::Offline);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        manager.deinit();
        assert!(topology.listener.lock().is_none());
        listener.on_device_event(TopologyEvent::Ready, &device);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
