// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network topology seam and identity lookups built on it.

use super::identity::DeviceIdentity;
use crate::error::CollaboratorError;
use std::sync::Arc;

/// A node as reported by the topology service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyDevice {
    pub network_id: String,
    pub device_type: u32,
}

impl TopologyDevice {
    pub fn new(network_id: &str, device_type: u32) -> Self {
        Self {
            network_id: network_id.to_string(),
            device_type,
        }
    }
}

/// Raw topology state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyEvent {
    /// Link is up but the device is not usable yet.
    Online,
    /// Device is fully ready.
    Ready,
    Offline,
    Changed,
}

/// Receives topology events on the topology's own thread.
pub trait TopologyListener: Send + Sync {
    fn on_device_event(&self, event: TopologyEvent, device: &TopologyDevice);
}

/// Device topology collaborator (device manager / bus center).
pub trait DeviceTopology: Send + Sync {
    fn local_device(&self, package_name: &str) -> Result<TopologyDevice, CollaboratorError>;

    fn trusted_devices(&self, package_name: &str) -> Result<Vec<TopologyDevice>, CollaboratorError>;

    fn udid_by_network_id(&self, package_name: &str, network_id: &str) -> Result<String, CollaboratorError>;

    fn register_listener(
        &self,
        package_name: &str,
        listener: Arc<dyn TopologyListener>,
    ) -> Result<(), CollaboratorError>;

    fn unregister_listener(&self, package_name: &str) -> Result<(), CollaboratorError>;
}

/// Identity-level view over a [`DeviceTopology`].
pub struct DeviceDirectory {
    topology: Arc<dyn DeviceTopology>,
    package_name: String,
}

impl DeviceDirectory {
    pub fn new(topology: Arc<dyn DeviceTopology>, package_name: &str) -> Self {
        Self {
            topology,
            package_name: package_name.to_string(),
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn topology(&self) -> &Arc<dyn DeviceTopology> {
        &self.topology
    }

    pub fn identity_by_network_id(&self, network_id: &str) -> Option<DeviceIdentity> {
        match self.topology.udid_by_network_id(&self.package_name, network_id) {
            Ok(udid) => {
                let identity = DeviceIdentity::from_udid(&udid);
                if identity.is_none() {
                    log::error!("[directory] empty udid for network id");
                }
                identity
            }
            Err(e) => {
                log::error!("[directory] udid lookup failed: {}", e);
                None
            }
        }
    }

    /// Local identity and device type.
    pub fn self_identity(&self) -> Option<(DeviceIdentity, u32)> {
        let local = self
            .topology
            .local_device(&self.package_name)
            .map_err(|e| log::error!("[directory] local device lookup failed: {}", e))
            .ok()?;
        let identity = self.identity_by_network_id(&local.network_id)?;
        log::trace!(
            "[directory] self device {}, type {}",
            identity,
            local.device_type
        );
        Some((identity, local.device_type))
    }

    /// Device type of `identity` if it is currently trusted and online.
    pub fn device_online_status(&self, identity: &DeviceIdentity) -> Option<u32> {
        self.find_trusted(identity).map(|device| device.device_type)
    }

    pub fn network_id_by_identity(&self, identity: &DeviceIdentity) -> Option<String> {
        self.find_trusted(identity).map(|device| device.network_id)
    }

    /// Visit every trusted device whose identity resolves.
    pub fn for_each_device<F>(&self, mut f: F)
    where
        F: FnMut(&DeviceIdentity, u32),
    {
        for device in self.trusted_devices() {
            if let Some(identity) = self.identity_by_network_id(&device.network_id) {
                f(&identity, device.device_type);
            }
        }
    }

    fn trusted_devices(&self) -> Vec<TopologyDevice> {
        self.topology
            .trusted_devices(&self.package_name)
            .unwrap_or_else(|e| {
                log::error!("[directory] trusted device list failed: {}", e);
                Vec::new()
            })
    }

    fn find_trusted(&self, identity: &DeviceIdentity) -> Option<TopologyDevice> {
        self.trusted_devices().into_iter().find(|device| {
            self.identity_by_network_id(&device.network_id)
                .is_some_and(|id| id == *identity)
        })
    }
}
