// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registration bookkeeping: per-package service lists and the
//! capability-indexed subscriber lists used for found-device fan-out.
//!
//! Neither structure locks by itself; the manager wraps each in its own
//! mutex and always takes the service list before the capability index.

use super::capability::{CapabilityBitmap, CAPABILITY_MAX_BITNUM};
use super::option::{DeviceInfo, DiscoverMode, ExchangeMedium, FoundAdditions, InnerOption};
use crate::error::DiscoveryError;
use crate::work_queue::WorkQueue;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Receives found-device events.
///
/// Called while the manager holds its capability-index lock: an
/// implementation must not call back into the same [`DiscoveryManager`]
/// synchronously. Wrap it in a [`DeferredListener`] if it needs to.
///
/// [`DiscoveryManager`]: super::DiscoveryManager
pub trait DiscoveryListener: Send + Sync {
    fn on_device_found(&self, package_name: &str, device: &DeviceInfo, additions: &FoundAdditions);
}

/// Shared, swappable listener of one service item.
pub(crate) type ListenerSlot = Arc<RwLock<Option<Arc<dyn DiscoveryListener>>>>;

pub(crate) fn empty_slot() -> ListenerSlot {
    Arc::new(RwLock::new(None))
}

/// Internal modules with privileged (head-of-list) registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscModule {
    Lnn,
    Conn,
}

impl DiscModule {
    pub const ALL: [Self; 2] = [Self::Lnn, Self::Conn];

    /// Package name the module registers under.
    pub fn package_name(self) -> &'static str {
        match self {
            Self::Lnn => "MODULE_LNN",
            Self::Conn => "MODULE_CONN",
        }
    }

    pub fn from_package_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.package_name() == name)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Lnn => 0,
            Self::Conn => 1,
        }
    }
}

impl TryFrom<i32> for DiscModule {
    type Error = DiscoveryError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(Self::Lnn),
            2 => Ok(Self::Conn),
            other => Err(DiscoveryError::InvalidParam(format!("module {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServiceType {
    Publish,
    PublishInner,
    Subscribe,
    SubscribeInner,
}

impl ServiceType {
    pub(crate) fn is_inner(self) -> bool {
        matches!(self, Self::PublishInner | Self::SubscribeInner)
    }
}

/// One publish/subscribe registration.
#[derive(Debug, Clone)]
pub(crate) struct ServiceInfo {
    pub handle: u64,
    pub id: i32,
    pub mode: DiscoverMode,
    pub medium: ExchangeMedium,
    pub option: InnerOption,
}

/// All registrations of one package.
pub(crate) struct ServiceItem {
    pub package_name: Arc<str>,
    pub listener: ListenerSlot,
    pub infos: Vec<ServiceInfo>,
}

#[derive(Default)]
pub(crate) struct ServiceList {
    items: Vec<ServiceItem>,
}

impl ServiceList {
    fn position(&self, package_name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| &*item.package_name == package_name)
    }

    /// Create the package's item if missing. Inner items go to the head.
    fn item_mut(&mut self, package_name: &str, ty: ServiceType, new_slot: ListenerSlot) -> &mut ServiceItem {
        let index = match self.position(package_name) {
            Some(index) => index,
            None => {
                let item = ServiceItem {
                    package_name: Arc::from(package_name),
                    listener: new_slot,
                    infos: Vec::new(),
                };
                if ty.is_inner() {
                    self.items.insert(0, item);
                    0
                } else {
                    self.items.push(item);
                    self.items.len() - 1
                }
            }
        };
        &mut self.items[index]
    }

    /// Append `info` under `package_name`.
    ///
    /// `new_slot` becomes the listener slot if the item has to be created.
    /// External subscriptions replace the item's listener; inner ones never
    /// clear an existing listener. Returns the item's slot and name.
    pub fn insert(
        &mut self,
        package_name: &str,
        info: ServiceInfo,
        ty: ServiceType,
        listener: Option<Arc<dyn DiscoveryListener>>,
        new_slot: ListenerSlot,
    ) -> Result<(ListenerSlot, Arc<str>), DiscoveryError> {
        if let Some(index) = self.position(package_name) {
            if self.items[index].infos.iter().any(|i| i.id == info.id) {
                return Err(DiscoveryError::Duplicate {
                    package: package_name.to_string(),
                    id: info.id,
                });
            }
        }

        let item = self.item_mut(package_name, ty, new_slot);
        match ty {
            ServiceType::Subscribe => *item.listener.write() = listener,
            ServiceType::SubscribeInner => {
                if listener.is_some() {
                    *item.listener.write() = listener;
                }
            }
            ServiceType::Publish | ServiceType::PublishInner => {}
        }
        item.infos.push(info);
        Ok((Arc::clone(&item.listener), Arc::clone(&item.package_name)))
    }

    /// Set the listener of a package, creating a registration-less item if
    /// needed.
    pub fn set_listener(
        &mut self,
        package_name: &str,
        listener: Arc<dyn DiscoveryListener>,
        new_slot: ListenerSlot,
    ) {
        let item = self.item_mut(package_name, ServiceType::SubscribeInner, new_slot);
        *item.listener.write() = Some(listener);
    }

    /// Remove a registration by id; drops the item once it has no
    /// registrations left.
    pub fn remove(&mut self, package_name: &str, id: i32) -> Option<ServiceInfo> {
        self.remove_where(package_name, |info| info.id == id)
    }

    /// Remove the exact registration identified by `handle` (rollback).
    pub fn remove_handle(&mut self, package_name: &str, handle: u64) -> Option<ServiceInfo> {
        self.remove_where(package_name, |info| info.handle == handle)
    }

    fn remove_where<F>(&mut self, package_name: &str, pred: F) -> Option<ServiceInfo>
    where
        F: Fn(&ServiceInfo) -> bool,
    {
        let index = self.position(package_name)?;
        let item = &mut self.items[index];
        let pos = item.infos.iter().position(pred)?;
        let info = item.infos.remove(pos);
        if item.infos.is_empty() {
            self.items.remove(index);
        }
        Some(info)
    }

    /// `(package, id)` of every registration, optionally for one package.
    pub fn ids(&self, package_name: Option<&str>) -> Vec<(Arc<str>, i32)> {
        self.items
            .iter()
            .filter(|item| package_name.map_or(true, |p| &*item.package_name == p))
            .flat_map(|item| {
                item.infos
                    .iter()
                    .map(|info| (Arc::clone(&item.package_name), info.id))
            })
            .collect()
    }

    pub fn info_count(&self, package_name: &str) -> usize {
        self.position(package_name)
            .map_or(0, |index| self.items[index].infos.len())
    }

    #[cfg(test)]
    pub fn contains_package(&self, package_name: &str) -> bool {
        self.position(package_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Entry of the capability index.
pub(crate) struct Subscriber {
    pub handle: u64,
    pub id: i32,
    pub package_name: Arc<str>,
    pub medium: ExchangeMedium,
    pub module: Option<DiscModule>,
    pub listener: ListenerSlot,
}

/// One ordered subscriber list per capability bit.
pub(crate) struct CapabilityIndex {
    lists: Vec<VecDeque<Arc<Subscriber>>>,
}

impl Default for CapabilityIndex {
    fn default() -> Self {
        Self {
            lists: (0..CAPABILITY_MAX_BITNUM).map(|_| VecDeque::new()).collect(),
        }
    }
}

impl CapabilityIndex {
    /// Insert under every set bit, at the head for privileged subscribers.
    pub fn insert(&mut self, subscriber: Arc<Subscriber>, bitmap: CapabilityBitmap, at_head: bool) {
        for bit in bitmap.bits() {
            let list = &mut self.lists[bit as usize];
            if at_head {
                list.push_front(Arc::clone(&subscriber));
            } else {
                list.push_back(Arc::clone(&subscriber));
            }
        }
    }

    pub fn remove(&mut self, handle: u64, bitmap: CapabilityBitmap) -> usize {
        let mut removed = 0;
        for bit in bitmap.bits() {
            let list = &mut self.lists[bit as usize];
            let before = list.len();
            list.retain(|s| s.handle != handle);
            removed += before - list.len();
        }
        removed
    }

    pub fn subscribers(&self, bit: u32) -> impl Iterator<Item = &Arc<Subscriber>> {
        self.lists
            .get(bit as usize)
            .into_iter()
            .flat_map(|list| list.iter())
    }

    /// Number of entries (across all bits) that belong to `package_name`.
    pub fn entries_for(&self, package_name: &str) -> usize {
        self.lists
            .iter()
            .flat_map(|list| list.iter())
            .filter(|s| &*s.package_name == package_name)
            .count()
    }

    pub fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }
}

/// Listener adapter that re-posts found-device events onto a [`WorkQueue`].
///
/// The wrapped listener then runs on the queue's consumer thread, outside the
/// manager's locks, and may call back into the manager.
pub struct DeferredListener {
    queue: Arc<WorkQueue>,
    target: Arc<dyn DiscoveryListener>,
}

impl DeferredListener {
    pub fn new(queue: Arc<WorkQueue>, target: Arc<dyn DiscoveryListener>) -> Self {
        Self { queue, target }
    }
}

impl DiscoveryListener for DeferredListener {
    fn on_device_found(&self, package_name: &str, device: &DeviceInfo, additions: &FoundAdditions) {
        let target = Arc::clone(&self.target);
        let package_name = package_name.to_string();
        let device = device.clone();
        let additions = *additions;
        if let Err(e) = self.queue.enqueue(Vec::new(), move |_| {
            target.on_device_found(&package_name, &device, &additions);
        }) {
            log::warn!(
                "[disc] deferred found-device event dropped on {}: {}",
                self.queue.name(),
                e
            );
        }
    }
}
