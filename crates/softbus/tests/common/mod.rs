// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use softbus::discovery::{
    BackendResult, DeviceInfo, DiscoveryBackend, DiscoveryListener, FoundAdditions, PublishOption,
    SubscribeOption,
};
use softbus::messenger::{
    DeviceIdentity, DeviceTopology, SessionListener, SessionSide, SessionTransport, TopologyDevice,
    TopologyListener,
};
use softbus::CollaboratorError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

// ---- topology ---------------------------------------------------------------

pub const LOCAL_NET: &str = "net-local";

pub fn udid_of(network_id: &str) -> String {
    format!("udid-{}", network_id)
}

pub fn identity_of(network_id: &str) -> DeviceIdentity {
    DeviceIdentity::from_udid(&udid_of(network_id)).expect("identity")
}

/// Topology with a fixed local node and a mutable trusted device list.
pub struct MemoryTopology {
    pub devices: Mutex<Vec<TopologyDevice>>,
    pub listener: Mutex<Option<Arc<dyn TopologyListener>>>,
}

impl MemoryTopology {
    pub fn new(devices: &[(&str, u32)]) -> Arc<Self> {
        Arc::new(Self {
            devices: Mutex::new(
                devices
                    .iter()
                    .map(|(id, ty)| TopologyDevice::new(id, *ty))
                    .collect(),
            ),
            listener: Mutex::new(None),
        })
    }

    pub fn listener(&self) -> Arc<dyn TopologyListener> {
        self.listener.lock().clone().expect("registered listener")
    }
}

impl DeviceTopology for MemoryTopology {
    fn local_device(&self, _: &str) -> Result<TopologyDevice, CollaboratorError> {
        Ok(TopologyDevice::new(LOCAL_NET, 0x0E))
    }

    fn trusted_devices(&self, _: &str) -> Result<Vec<TopologyDevice>, CollaboratorError> {
        Ok(self.devices.lock().clone())
    }

    fn udid_by_network_id(&self, _: &str, network_id: &str) -> Result<String, CollaboratorError> {
        Ok(udid_of(network_id))
    }

    fn register_listener(&self, _: &str, listener: Arc<dyn TopologyListener>) -> Result<(), CollaboratorError> {
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    fn unregister_listener(&self, _: &str) -> Result<(), CollaboratorError> {
        self.listener.lock().take();
        Ok(())
    }
}

// ---- session transport ----------------------------------------------------

/// Transport that records every call. Sessions open asynchronously: the test
/// completes them through [`MemoryTransport::complete_open`], unless
/// `complete_inline` is set, in which case `open_session` reports success
/// before it returns.
pub struct MemoryTransport {
    next_session: AtomicI32,
    pub fail_opens: AtomicBool,
    pub complete_inline: AtomicBool,
    pub opens: Mutex<Vec<(String, String, String)>>,
    pub sent: Mutex<Vec<(i32, Vec<u8>)>>,
    pub servers: Mutex<Vec<String>>,
    peers: Mutex<HashMap<i32, String>>,
    listener: Mutex<Option<Arc<dyn SessionListener>>>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_session: AtomicI32::new(1),
            fail_opens: AtomicBool::new(false),
            complete_inline: AtomicBool::new(false),
            opens: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            servers: Mutex::new(Vec::new()),
            peers: Mutex::new(HashMap::new()),
            listener: Mutex::new(None),
        })
    }

    pub fn listener(&self) -> Arc<dyn SessionListener> {
        self.listener.lock().clone().expect("session server")
    }

    /// Session id most recently requested for `network_id`.
    pub fn session_for(&self, network_id: &str) -> Option<i32> {
        self.peers
            .lock()
            .iter()
            .filter(|(_, peer)| peer.as_str() == network_id)
            .map(|(id, _)| *id)
            .max()
    }

    pub fn complete_open(&self, session_id: i32, result: i32) {
        self.listener().on_session_opened(session_id, result);
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().len()
    }

    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.sent.lock().iter().map(|(_, data)| data.clone()).collect()
    }
}

impl SessionTransport for MemoryTransport {
    fn create_session_server(
        &self,
        _: &str,
        session_name: &str,
        listener: Arc<dyn SessionListener>,
    ) -> Result<(), CollaboratorError> {
        self.servers.lock().push(session_name.to_string());
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    fn remove_session_server(&self, _: &str, session_name: &str) -> Result<(), CollaboratorError> {
        self.servers.lock().retain(|s| s != session_name);
        Ok(())
    }

    fn open_session(&self, my: &str, peer: &str, network_id: &str) -> Result<i32, CollaboratorError> {
        self.opens
            .lock()
            .push((my.to_string(), peer.to_string(), network_id.to_string()));
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("open_session", -1));
        }
        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        self.peers.lock().insert(id, network_id.to_string());
        if self.complete_inline.load(Ordering::SeqCst) {
            self.complete_open(id, 0);
        }
        Ok(id)
    }

    fn send_bytes(&self, session_id: i32, data: &[u8]) -> Result<(), CollaboratorError> {
        self.sent.lock().push((session_id, data.to_vec()));
        Ok(())
    }

    fn session_side(&self, session_id: i32) -> SessionSide {
        if self.peers.lock().contains_key(&session_id) {
            SessionSide::Client
        } else {
            SessionSide::Server
        }
    }

    fn peer_network_id(&self, session_id: i32) -> Result<String, CollaboratorError> {
        self.peers
            .lock()
            .get(&session_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::new("peer_network_id", -2))
    }
}

// ---- discovery backend ------------------------------------------------------

/// Backend that records calls by name and fails them on demand.
#[derive(Default)]
pub struct RecordingBackend {
    pub fail: AtomicBool,
    pub calls: Mutex<Vec<&'static str>>,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let backend = Self::default();
        backend.fail.store(true, Ordering::SeqCst);
        Arc::new(backend)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn record(&self, call: &'static str) -> BackendResult {
        self.calls.lock().push(call);
        if self.fail.load(Ordering::SeqCst) {
            Err(CollaboratorError::new(call, -1))
        } else {
            Ok(())
        }
    }
}

impl DiscoveryBackend for RecordingBackend {
    fn publish(&self, _: &PublishOption) -> BackendResult {
        self.record("publish")
    }
    fn start_scan(&self, _: &PublishOption) -> BackendResult {
        self.record("start_scan")
    }
    fn unpublish(&self, _: &PublishOption) -> BackendResult {
        self.record("unpublish")
    }
    fn stop_scan(&self, _: &PublishOption) -> BackendResult {
        self.record("stop_scan")
    }
    fn start_advertise(&self, _: &SubscribeOption) -> BackendResult {
        self.record("start_advertise")
    }
    fn subscribe(&self, _: &SubscribeOption) -> BackendResult {
        self.record("subscribe")
    }
    fn unsubscribe(&self, _: &SubscribeOption) -> BackendResult {
        self.record("unsubscribe")
    }
    fn stop_advertise(&self, _: &SubscribeOption) -> BackendResult {
        self.record("stop_advertise")
    }
}

/// Listener that records `(package, device id)` per found-device callback.
#[derive(Default)]
pub struct FoundLog {
    pub events: Mutex<Vec<(String, String)>>,
}

impl FoundLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

impl DiscoveryListener for FoundLog {
    fn on_device_found(&self, package_name: &str, device: &DeviceInfo, _: &FoundAdditions) {
        self.events
            .lock()
            .push((package_name.to_string(), device.device_id.clone()));
    }
}
