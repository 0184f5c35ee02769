// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery manager: publish/subscribe dispatch across medium backends and
//! found-device fan-out by capability.
//!
//! # Locking
//!
//! `publish_list`, `discovery_list` and `capability_index` each have their
//! own mutex. When two are needed, `discovery_list` is always taken before
//! `capability_index`. Backend calls are made with no manager lock held.
//! Listeners run with `capability_index` held (see [`DiscoveryListener`]).

use super::backend::{call_backend, Backends, DeviceFoundSink, InterfaceFunc};
use super::option::{
    DeviceInfo, DiscoverMode, ExchangeMedium, FoundAdditions, InfoTypeChanged, InnerOption,
    LinkStatus, PublishInfo, SubscribeInfo,
};
use super::service::{
    empty_slot, CapabilityIndex, DiscModule, DiscoveryListener, ListenerSlot, ServiceInfo,
    ServiceList, ServiceType, Subscriber,
};
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::telemetry::{DiscoveryStats, NoopStats};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Package names must be strictly shorter than this many bytes.
pub const PKG_NAME_SIZE_MAX: usize = 65;

/// Capability-based discovery dispatcher.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct DiscoveryManager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    config: DiscoveryConfig,
    stats: Arc<dyn DiscoveryStats>,
    backends: ArcSwapOption<Backends>,
    lifecycle: Mutex<()>,
    publish_list: Mutex<ServiceList>,
    discovery_list: Mutex<ServiceList>,
    capability_index: Mutex<CapabilityIndex>,
    module_listeners: [ListenerSlot; 2],
    call_internal_modules: AtomicBool,
    first_discovery: Mutex<Option<Instant>>,
    next_handle: AtomicU64,
}

impl DiscoveryManager {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self::with_stats(config, Arc::new(NoopStats))
    }

    pub fn with_stats(config: DiscoveryConfig, stats: Arc<dyn DiscoveryStats>) -> Self {
        let call_internal_modules = AtomicBool::new(config.call_internal_modules);
        Self {
            inner: Arc::new(ManagerInner {
                config,
                stats,
                backends: ArcSwapOption::empty(),
                lifecycle: Mutex::new(()),
                publish_list: Mutex::new(ServiceList::default()),
                discovery_list: Mutex::new(ServiceList::default()),
                capability_index: Mutex::new(CapabilityIndex::default()),
                module_listeners: [empty_slot(), empty_slot()],
                call_internal_modules,
                first_discovery: Mutex::new(None),
                next_handle: AtomicU64::new(1),
            }),
        }
    }

    /// Sink the backends report found devices to.
    pub fn device_found_sink(&self) -> DeviceFoundSink {
        DeviceFoundSink {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Attach the medium backends. A second call while initialized is a no-op.
    pub fn init(&self, backends: Backends) -> Result<(), DiscoveryError> {
        let _guard = self.inner.lifecycle.lock();
        if self.inner.backends.load().is_some() {
            log::debug!("[disc] already initialized");
            return Ok(());
        }
        if backends.is_empty() {
            log::error!("[disc] init failed: neither BLE nor CoAP backend available");
            return Err(DiscoveryError::NoBackend);
        }
        log::info!(
            "[disc] initialized (ble={} coap={})",
            backends.ble.is_some(),
            backends.coap.is_some()
        );
        self.inner.backends.store(Some(Arc::new(backends)));
        Ok(())
    }

    /// Stop every registration, then detach the backends.
    pub fn deinit(&self) {
        let _guard = self.inner.lifecycle.lock();
        let Some(backends) = self.inner.backends.load_full() else {
            log::debug!("[disc] deinit: not initialized");
            return;
        };

        self.inner.remove_all(&backends, None);
        self.inner.publish_list.lock().clear();
        {
            let mut list = self.inner.discovery_list.lock();
            list.clear();
            self.inner.capability_index.lock().clear();
        }
        for slot in &self.inner.module_listeners {
            *slot.write() = None;
        }
        self.inner.backends.store(None);
        log::info!("[disc] deinit complete");
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.backends.load().is_some()
    }

    /// Gate delivery of found-device events to internal modules.
    pub fn set_call_internal_modules(&self, enabled: bool) {
        self.inner
            .call_internal_modules
            .store(enabled, Ordering::Release);
    }

    pub fn call_internal_modules(&self) -> bool {
        self.inner.call_internal_modules.load(Ordering::Acquire)
    }

    // ---- client API ----------------------------------------------------

    pub fn publish_service(&self, package_name: &str, info: &PublishInfo) -> Result<(), DiscoveryError> {
        check_package_name(package_name)?;
        self.inner
            .publish(package_name, info, ServiceType::Publish)
    }

    pub fn unpublish_service(&self, package_name: &str, publish_id: i32) -> Result<(), DiscoveryError> {
        check_package_name(package_name)?;
        self.inner.unpublish(package_name, publish_id)
    }

    pub fn start_discovery(
        &self,
        package_name: &str,
        info: &SubscribeInfo,
        listener: Arc<dyn DiscoveryListener>,
    ) -> Result<(), DiscoveryError> {
        check_package_name(package_name)?;
        self.inner
            .start_discovery(package_name, info, Some(listener), ServiceType::Subscribe)
    }

    pub fn stop_discovery(&self, package_name: &str, subscribe_id: i32) -> Result<(), DiscoveryError> {
        check_package_name(package_name)?;
        self.inner.stop_discovery(package_name, subscribe_id)
    }

    /// Remove every publish and discovery registration of a dead client.
    pub fn on_client_death(&self, package_name: &str) {
        let Some(backends) = self.inner.backends.load_full() else {
            log::warn!("[disc] death of {}: not initialized", package_name);
            return;
        };
        log::info!("[disc] client {} died", package_name);
        self.inner.remove_all(&backends, Some(package_name));
    }

    // ---- internal module API --------------------------------------------

    /// Active publish on behalf of an internal module.
    pub fn publish(&self, module: DiscModule, info: &PublishInfo) -> Result<(), DiscoveryError> {
        require_mode(info.mode, DiscoverMode::Active)?;
        self.inner
            .publish(module.package_name(), info, ServiceType::PublishInner)
    }

    /// Passive publish (scan) on behalf of an internal module.
    pub fn start_scan(&self, module: DiscModule, info: &PublishInfo) -> Result<(), DiscoveryError> {
        require_mode(info.mode, DiscoverMode::Passive)?;
        self.inner
            .publish(module.package_name(), info, ServiceType::PublishInner)
    }

    pub fn unpublish(&self, module: DiscModule, publish_id: i32) -> Result<(), DiscoveryError> {
        self.inner.unpublish(module.package_name(), publish_id)
    }

    /// Active discovery (advertise) on behalf of an internal module.
    pub fn start_advertise(&self, module: DiscModule, info: &SubscribeInfo) -> Result<(), DiscoveryError> {
        require_mode(info.mode, DiscoverMode::Active)?;
        self.inner
            .start_discovery(module.package_name(), info, None, ServiceType::SubscribeInner)
    }

    /// Passive discovery (subscribe) on behalf of an internal module.
    pub fn subscribe(&self, module: DiscModule, info: &SubscribeInfo) -> Result<(), DiscoveryError> {
        require_mode(info.mode, DiscoverMode::Passive)?;
        self.inner
            .start_discovery(module.package_name(), info, None, ServiceType::SubscribeInner)
    }

    pub fn stop_advertise(&self, module: DiscModule, subscribe_id: i32) -> Result<(), DiscoveryError> {
        self.inner.stop_discovery(module.package_name(), subscribe_id)
    }

    /// Install the found-device listener of an internal module.
    ///
    /// The listener survives the module's registrations coming and going.
    pub fn set_discover_callback(
        &self,
        module: DiscModule,
        listener: Arc<dyn DiscoveryListener>,
    ) -> Result<(), DiscoveryError> {
        self.inner.require_backends()?;
        let slot = self.inner.module_slot(module);
        self.inner
            .discovery_list
            .lock()
            .set_listener(module.package_name(), listener, slot);
        Ok(())
    }

    // ---- backend pass-through -------------------------------------------

    /// Forward a link state change to the backend of `medium`.
    pub fn link_status_changed(&self, status: LinkStatus, medium: ExchangeMedium) {
        let Some(backends) = self.inner.backends.load_full() else {
            return;
        };
        let backend = match medium {
            ExchangeMedium::Ble => backends.ble.as_ref(),
            ExchangeMedium::Coap => backends.coap.as_ref(),
            ExchangeMedium::Auto => {
                log::error!("[disc] link status: unsupported medium {:?}", medium);
                return;
            }
        };
        if let Some(backend) = backend {
            backend.link_status_changed(status);
        }
    }

    /// Forward a local device info change to every backend.
    pub fn device_info_changed(&self, kind: InfoTypeChanged) {
        log::info!("[disc] device info changed: {:?}", kind);
        let Some(backends) = self.inner.backends.load_full() else {
            return;
        };
        for backend in [&backends.ble, &backends.coap].into_iter().flatten() {
            backend.update_local_device_info(kind);
        }
    }

    // ---- introspection ---------------------------------------------------

    /// Publish registrations currently held for `package_name`.
    pub fn publish_count(&self, package_name: &str) -> usize {
        self.inner.publish_list.lock().info_count(package_name)
    }

    /// Discovery registrations currently held for `package_name`.
    pub fn discovery_count(&self, package_name: &str) -> usize {
        self.inner.discovery_list.lock().info_count(package_name)
    }

    /// Packages with a publish list entry.
    pub fn publish_packages(&self) -> usize {
        self.inner.publish_list.lock().len()
    }

    /// Packages with a discovery list entry.
    pub fn discovery_packages(&self) -> usize {
        self.inner.discovery_list.lock().len()
    }

    /// `(package, id)` of the subscribers of `bit`, in fan-out order.
    pub fn capability_subscribers(&self, bit: u32) -> Vec<(String, i32)> {
        self.inner
            .capability_index
            .lock()
            .subscribers(bit)
            .map(|s| (s.package_name.to_string(), s.id))
            .collect()
    }

    /// Capability index entries referencing `package_name`.
    pub fn capability_entries(&self, package_name: &str) -> usize {
        self.inner.capability_index.lock().entries_for(package_name)
    }
}

impl Default for DiscoveryManager {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}

impl ManagerInner {
    fn require_backends(&self) -> Result<Arc<Backends>, DiscoveryError> {
        self.backends
            .load_full()
            .ok_or(DiscoveryError::NotInitialized)
    }

    fn module_slot(&self, module: DiscModule) -> ListenerSlot {
        Arc::clone(&self.module_listeners[module.index()])
    }

    fn new_slot(&self, package_name: &str) -> ListenerSlot {
        DiscModule::from_package_name(package_name).map_or_else(empty_slot, |m| self.module_slot(m))
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn publish(&self, package_name: &str, info: &PublishInfo, ty: ServiceType) -> Result<(), DiscoveryError> {
        let backends = self.require_backends()?;
        let option = info.to_option(self.config.max_capability_data_len)?;
        let service = ServiceInfo {
            handle: self.next_handle(),
            id: info.publish_id,
            mode: info.mode,
            medium: info.medium,
            option: InnerOption::Publish(option),
        };

        self.publish_list.lock().insert(
            package_name,
            service.clone(),
            ty,
            None,
            self.new_slot(package_name),
        )?;

        if let Err(e) = self.call_by_medium(&backends, &service, InterfaceFunc::Publish) {
            log::error!(
                "[disc] publish {} id={} failed: {}",
                package_name,
                service.id,
                e
            );
            self.publish_list
                .lock()
                .remove_handle(package_name, service.handle);
            return Err(e);
        }
        log::debug!("[disc] published {} id={}", package_name, service.id);
        Ok(())
    }

    fn unpublish(&self, package_name: &str, publish_id: i32) -> Result<(), DiscoveryError> {
        let backends = self.require_backends()?;
        let service = self
            .publish_list
            .lock()
            .remove(package_name, publish_id)
            .ok_or_else(|| not_found(package_name, publish_id))?;

        self.call_by_medium(&backends, &service, InterfaceFunc::Unpublish)
            .map_err(|e| {
                log::error!("[disc] unpublish {} id={} failed: {}", package_name, publish_id, e);
                e
            })
    }

    fn start_discovery(
        &self,
        package_name: &str,
        info: &SubscribeInfo,
        listener: Option<Arc<dyn DiscoveryListener>>,
        ty: ServiceType,
    ) -> Result<(), DiscoveryError> {
        let backends = self.require_backends()?;
        let option = info.to_option(self.config.max_capability_data_len)?;
        let bitmap = option.capability_bitmap;
        let service = ServiceInfo {
            handle: self.next_handle(),
            id: info.subscribe_id,
            mode: info.mode,
            medium: info.medium,
            option: InnerOption::Subscribe(option),
        };

        {
            let mut list = self.discovery_list.lock();
            let (slot, name) = list.insert(
                package_name,
                service.clone(),
                ty,
                listener,
                self.new_slot(package_name),
            )?;
            let subscriber = Arc::new(Subscriber {
                handle: service.handle,
                id: service.id,
                module: DiscModule::from_package_name(&name),
                package_name: name,
                medium: service.medium,
                listener: slot,
            });
            self.capability_index
                .lock()
                .insert(subscriber, bitmap, ty.is_inner());
        }

        if !ty.is_inner() {
            self.stats.report_discovery_startup(package_name);
        }

        if let Err(e) = self.call_by_medium(&backends, &service, InterfaceFunc::StartDiscovery) {
            log::error!(
                "[disc] start discovery {} id={} failed: {}",
                package_name,
                service.id,
                e
            );
            let mut list = self.discovery_list.lock();
            list.remove_handle(package_name, service.handle);
            self.capability_index.lock().remove(service.handle, bitmap);
            return Err(e);
        }
        log::debug!("[disc] discovery started {} id={}", package_name, service.id);
        Ok(())
    }

    fn stop_discovery(&self, package_name: &str, subscribe_id: i32) -> Result<(), DiscoveryError> {
        let backends = self.require_backends()?;
        let service = {
            let mut list = self.discovery_list.lock();
            let service = list
                .remove(package_name, subscribe_id)
                .ok_or_else(|| not_found(package_name, subscribe_id))?;
            self.capability_index
                .lock()
                .remove(service.handle, service.option.capability_bitmap());
            service
        };

        self.call_by_medium(&backends, &service, InterfaceFunc::StopDiscovery)
            .map_err(|e| {
                log::error!(
                    "[disc] stop discovery {} id={} failed: {}",
                    package_name,
                    subscribe_id,
                    e
                );
                e
            })
    }

    /// Stop every registration, optionally only those of one package.
    ///
    /// Ids are collected first so the backend calls run without list locks.
    fn remove_all(&self, backends: &Backends, package_name: Option<&str>) {
        let publish_ids = self.publish_list.lock().ids(package_name);
        for (package, id) in publish_ids {
            let result = self
                .publish_list
                .lock()
                .remove(&package, id)
                .ok_or_else(|| not_found(&package, id))
                .and_then(|service| self.call_by_medium(backends, &service, InterfaceFunc::Unpublish));
            log::info!("[disc] cleanup publish {} id={}: {:?}", package, id, result);
        }

        let discovery_ids = self.discovery_list.lock().ids(package_name);
        for (package, id) in discovery_ids {
            let removed = {
                let mut list = self.discovery_list.lock();
                let removed = list.remove(&package, id);
                if let Some(service) = &removed {
                    self.capability_index
                        .lock()
                        .remove(service.handle, service.option.capability_bitmap());
                }
                removed
            };
            let result = removed
                .ok_or_else(|| not_found(&package, id))
                .and_then(|service| {
                    self.call_by_medium(backends, &service, InterfaceFunc::StopDiscovery)
                });
            log::info!("[disc] cleanup discovery {} id={}: {:?}", package, id, result);
        }
    }

    /// Issue one lifecycle call on the backend(s) selected by the medium.
    ///
    /// `Auto` succeeds when at least one backend accepts the call.
    fn call_by_medium(
        &self,
        backends: &Backends,
        service: &ServiceInfo,
        func: InterfaceFunc,
    ) -> Result<(), DiscoveryError> {
        self.stats.record_scan_times(service.medium);
        if matches!(func, InterfaceFunc::Publish | InterfaceFunc::StartDiscovery) {
            self.arm_first_discovery();
        }

        match service.medium {
            ExchangeMedium::Ble => self.call_one(backends, ExchangeMedium::Ble, service, func),
            ExchangeMedium::Coap => self.call_one(backends, ExchangeMedium::Coap, service, func),
            ExchangeMedium::Auto => {
                let coap = self.call_one(backends, ExchangeMedium::Coap, service, func);
                let ble = self.call_one(backends, ExchangeMedium::Ble, service, func);
                if coap.is_ok() || ble.is_ok() {
                    Ok(())
                } else {
                    log::error!("[disc] all media failed for {:?} id={}", func, service.id);
                    Err(DiscoveryError::BackendFailure {
                        medium: ExchangeMedium::Auto,
                    })
                }
            }
        }
    }

    fn call_one(
        &self,
        backends: &Backends,
        medium: ExchangeMedium,
        service: &ServiceInfo,
        func: InterfaceFunc,
    ) -> Result<(), DiscoveryError> {
        let backend = match medium {
            ExchangeMedium::Ble => backends.ble.as_ref(),
            ExchangeMedium::Coap => backends.coap.as_ref(),
            ExchangeMedium::Auto => None,
        };
        let Some(backend) = backend else {
            log::debug!("[disc] no backend for {:?}", medium);
            return Err(DiscoveryError::BackendFailure { medium });
        };

        call_backend(backend.as_ref(), func, service.mode, &service.option).map_err(|e| {
            log::warn!("[disc] {:?} {:?} id={}: {}", medium, func, service.id, e);
            self.stats.record_fault(medium, e.code);
            DiscoveryError::BackendFailure { medium }
        })
    }

    fn arm_first_discovery(&self) {
        let mut started = self.first_discovery.lock();
        if started.is_none() {
            *started = Some(Instant::now());
        }
    }

    fn finish_first_discovery(&self, medium: ExchangeMedium) {
        let started = self.first_discovery.lock().take();
        if let Some(started) = started {
            self.stats
                .record_first_discovery_time(medium, started.elapsed());
        }
    }

    /// Fan a found device out to every subscriber of its capability bits.
    ///
    /// Each subscriber is notified at most once per event even if it
    /// matches several bits.
    pub(crate) fn on_device_found(&self, device: &DeviceInfo, additions: &FoundAdditions) {
        log::debug!(
            "[disc] device found: capability={:?} medium={:?}",
            device.capability_bitmap,
            additions.medium
        );
        let call_internal = self.call_internal_modules.load(Ordering::Acquire);
        let index = self.capability_index.lock();
        let mut notified = HashSet::new();

        for bit in device.capability_bitmap.bits() {
            for subscriber in index.subscribers(bit) {
                if !notified.insert(subscriber.handle) {
                    continue;
                }
                if subscriber.module.is_some() {
                    if !call_internal {
                        continue;
                    }
                    self.finish_first_discovery(subscriber.medium);
                }
                let listener = subscriber.listener.read().clone();
                if let Some(listener) = listener {
                    listener.on_device_found(&subscriber.package_name, device, additions);
                }
            }
        }
    }
}

fn check_package_name(package_name: &str) -> Result<(), DiscoveryError> {
    if package_name.is_empty() {
        return Err(DiscoveryError::InvalidParam("empty package name".into()));
    }
    if package_name.len() >= PKG_NAME_SIZE_MAX {
        return Err(DiscoveryError::PackageNameTooLong(package_name.len()));
    }
    Ok(())
}

fn require_mode(actual: DiscoverMode, expected: DiscoverMode) -> Result<(), DiscoveryError> {
    if actual != expected {
        return Err(DiscoveryError::InvalidParam(format!(
            "mode {:?}, expected {:?}",
            actual, expected
        )));
    }
    Ok(())
}

fn not_found(package_name: &str, id: i32) -> DiscoveryError {
    DiscoveryError::InfoNotFound {
        package: package_name.to_string(),
        id,
    }
}
