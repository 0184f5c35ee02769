// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Medium backend seam.
//!
//! A backend (BLE, CoAP, or a test double) implements [`DiscoveryBackend`] and
//! reports found devices through the [`DeviceFoundSink`] obtained from
//! [`DiscoveryManager::device_found_sink`].
//!
//! [`DiscoveryManager::device_found_sink`]: super::DiscoveryManager::device_found_sink

use super::manager::ManagerInner;
use super::option::{
    DeviceInfo, DiscoverMode, FoundAdditions, InfoTypeChanged, InnerOption, LinkStatus,
    PublishOption, SubscribeOption,
};
use crate::error::CollaboratorError;
use std::sync::{Arc, Weak};

/// Result of one backend call.
pub type BackendResult = Result<(), CollaboratorError>;

/// A medium-specific discovery implementation.
///
/// The hooks at the bottom are optional; the defaults do nothing.
pub trait DiscoveryBackend: Send + Sync {
    fn publish(&self, option: &PublishOption) -> BackendResult;
    fn start_scan(&self, option: &PublishOption) -> BackendResult;
    fn unpublish(&self, option: &PublishOption) -> BackendResult;
    fn stop_scan(&self, option: &PublishOption) -> BackendResult;
    fn start_advertise(&self, option: &SubscribeOption) -> BackendResult;
    fn subscribe(&self, option: &SubscribeOption) -> BackendResult;
    fn unsubscribe(&self, option: &SubscribeOption) -> BackendResult;
    fn stop_advertise(&self, option: &SubscribeOption) -> BackendResult;

    fn link_status_changed(&self, _status: LinkStatus) {}

    fn update_local_device_info(&self, _kind: InfoTypeChanged) {}
}

/// The backends handed to [`DiscoveryManager::init`]; at least one is required.
///
/// [`DiscoveryManager::init`]: super::DiscoveryManager::init
#[derive(Clone, Default)]
pub struct Backends {
    pub ble: Option<Arc<dyn DiscoveryBackend>>,
    pub coap: Option<Arc<dyn DiscoveryBackend>>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ble(mut self, backend: Arc<dyn DiscoveryBackend>) -> Self {
        self.ble = Some(backend);
        self
    }

    pub fn with_coap(mut self, backend: Arc<dyn DiscoveryBackend>) -> Self {
        self.coap = Some(backend);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ble.is_none() && self.coap.is_none()
    }
}

/// Which lifecycle call to make on a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InterfaceFunc {
    Publish,
    Unpublish,
    StartDiscovery,
    StopDiscovery,
}

/// Dispatch one lifecycle call, picking the backend method by mode.
///
/// A mismatched option variant is a programming error and reported as a
/// failed call.
pub(crate) fn call_backend(
    backend: &dyn DiscoveryBackend,
    func: InterfaceFunc,
    mode: DiscoverMode,
    option: &InnerOption,
) -> BackendResult {
    use DiscoverMode::{Active, Passive};
    use InterfaceFunc::{Publish, StartDiscovery, StopDiscovery, Unpublish};

    match (func, option) {
        (Publish, InnerOption::Publish(o)) => match mode {
            Active => backend.publish(o),
            Passive => backend.start_scan(o),
        },
        (Unpublish, InnerOption::Publish(o)) => match mode {
            Active => backend.unpublish(o),
            Passive => backend.stop_scan(o),
        },
        (StartDiscovery, InnerOption::Subscribe(o)) => match mode {
            Active => backend.start_advertise(o),
            Passive => backend.subscribe(o),
        },
        (StopDiscovery, InnerOption::Subscribe(o)) => match mode {
            Active => backend.stop_advertise(o),
            Passive => backend.unsubscribe(o),
        },
        _ => Err(CollaboratorError::new("backend dispatch", -1)),
    }
}

/// Entry point for backends to report found devices.
///
/// Holds a weak reference; reports after the manager is dropped are ignored.
#[derive(Clone)]
pub struct DeviceFoundSink {
    pub(crate) inner: Weak<ManagerInner>,
}

impl DeviceFoundSink {
    pub fn on_device_found(&self, device: &DeviceInfo, additions: &FoundAdditions) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_device_found(device, additions);
        }
    }
}

impl std::fmt::Debug for DeviceFoundSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceFoundSink")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::capability::CapabilityBitmap;
    use crate::discovery::option::FreqType;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn push(&self, name: &'static str) -> BackendResult {
            self.calls.lock().push(name);
            Ok(())
        }
    }

    impl DiscoveryBackend for Recorder {
        fn publish(&self, _: &PublishOption) -> BackendResult {
            self.push("publish")
        }
        fn start_scan(&self, _: &PublishOption) -> BackendResult {
            self.push("start_scan")
        }
        fn unpublish(&self, _: &PublishOption) -> BackendResult {
            self.push("unpublish")
        }
        fn stop_scan(&self, _: &PublishOption) -> BackendResult {
            self.push("stop_scan")
        }
        fn start_advertise(&self, _: &SubscribeOption) -> BackendResult {
            self.push("start_advertise")
        }
        fn subscribe(&self, _: &SubscribeOption) -> BackendResult {
            self.push("subscribe")
        }
        fn unsubscribe(&self, _: &SubscribeOption) -> BackendResult {
            self.push("unsubscribe")
        }
        fn stop_advertise(&self, _: &SubscribeOption) -> BackendResult {
            self.push("stop_advertise")
        }
    }

    fn publish_option() -> InnerOption {
        InnerOption::Publish(PublishOption {
            freq: FreqType::Low,
            capability_bitmap: CapabilityBitmap::from_bits(&[0]),
            capability_data: Vec::new(),
            ranging: false,
        })
    }

    fn subscribe_option() -> InnerOption {
        InnerOption::Subscribe(SubscribeOption {
            freq: FreqType::Low,
            is_same_account: false,
            is_wake_remote: false,
            capability_bitmap: CapabilityBitmap::from_bits(&[0]),
            capability_data: Vec::new(),
        })
    }

    #[test]
    fn test_mode_dispatch_table() {
        let backend = Recorder::default();
        let publish = publish_option();
        let subscribe = subscribe_option();

        for (func, option) in [
            (InterfaceFunc::Publish, &publish),
            (InterfaceFunc::Unpublish, &publish),
            (InterfaceFunc::StartDiscovery, &subscribe),
            (InterfaceFunc::StopDiscovery, &subscribe),
        ] {
            call_backend(&backend, func, DiscoverMode::Active, option).expect("active");
            call_backend(&backend, func, DiscoverMode::Passive, option).expect("passive");
        }

        assert_eq!(
            *backend.calls.lock(),
            vec![
                "publish",
                "start_scan",
                "unpublish",
                "stop_scan",
                "start_advertise",
                "subscribe",
                "stop_advertise",
                "unsubscribe",
            ]
        );
    }

    #[test]
    fn test_mismatched_option_fails() {
        let backend = Recorder::default();
        let result = call_backend(
            &backend,
            InterfaceFunc::Publish,
            DiscoverMode::Active,
            &subscribe_option(),
        );
        assert!(result.is_err());
        assert!(backend.calls.lock().is_empty());
    }

    #[test]
    fn test_backends_builder() {
        assert!(Backends::new().is_empty());
        let backends = Backends::new().with_coap(Arc::new(Recorder::default()));
        assert!(!backends.is_empty());
        assert!(backends.ble.is_none());
    }
}
