// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish/subscribe requests and the options handed to backends.
//!
//! Clients describe a request with [`PublishInfo`] / [`SubscribeInfo`]
//! (capability names, id, medium, mode). Once validated, the manager resolves
//! the names into a [`CapabilityBitmap`] and stores a [`PublishOption`] /
//! [`SubscribeOption`], which is what a [`DiscoveryBackend`] receives.
//!
//! [`DiscoveryBackend`]: super::DiscoveryBackend

use super::capability::CapabilityBitmap;
use crate::error::DiscoveryError;

/// Discovery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoverMode {
    Passive,
    Active,
}

impl DiscoverMode {
    pub const PASSIVE_RAW: i32 = 0x55;
    pub const ACTIVE_RAW: i32 = 0xAA;
}

impl TryFrom<i32> for DiscoverMode {
    type Error = DiscoveryError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            Self::PASSIVE_RAW => Ok(Self::Passive),
            Self::ACTIVE_RAW => Ok(Self::Active),
            other => Err(DiscoveryError::InvalidParam(format!("mode {:#x}", other))),
        }
    }
}

/// Radio / transport used for discovery. `Auto` means every available backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeMedium {
    Auto,
    Ble,
    Coap,
}

impl TryFrom<i32> for ExchangeMedium {
    type Error = DiscoveryError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Auto),
            1 => Ok(Self::Ble),
            2 => Ok(Self::Coap),
            other => Err(DiscoveryError::InvalidMedium(other)),
        }
    }
}

/// Advertisement / scan frequency tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FreqType {
    #[default]
    Low,
    Mid,
    High,
    SuperHigh,
}

impl TryFrom<i32> for FreqType {
    type Error = DiscoveryError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Low),
            1 => Ok(Self::Mid),
            2 => Ok(Self::High),
            3 => Ok(Self::SuperHigh),
            other => Err(DiscoveryError::InvalidParam(format!("freq {}", other))),
        }
    }
}

/// Network link state forwarded to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up,
    Down,
}

/// Which piece of local device information changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoTypeChanged {
    DeviceName,
    Account,
}

/// Client publish request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishInfo {
    pub publish_id: i32,
    pub mode: DiscoverMode,
    pub medium: ExchangeMedium,
    pub freq: FreqType,
    /// Capability names; at least one, all from the capability table.
    pub capabilities: Vec<String>,
    pub capability_data: Vec<u8>,
    pub ranging: bool,
}

impl PublishInfo {
    pub fn new(publish_id: i32, mode: DiscoverMode, medium: ExchangeMedium, capability: &str) -> Self {
        Self {
            publish_id,
            mode,
            medium,
            freq: FreqType::Low,
            capabilities: vec![capability.to_string()],
            capability_data: Vec::new(),
            ranging: false,
        }
    }

    pub fn with_capability(mut self, capability: &str) -> Self {
        self.capabilities.push(capability.to_string());
        self
    }

    pub fn with_freq(mut self, freq: FreqType) -> Self {
        self.freq = freq;
        self
    }

    pub fn with_capability_data(mut self, data: Vec<u8>) -> Self {
        self.capability_data = data;
        self
    }

    pub fn with_ranging(mut self, ranging: bool) -> Self {
        self.ranging = ranging;
        self
    }

    /// Validate and resolve into the backend option.
    pub(crate) fn to_option(&self, max_data_len: usize) -> Result<PublishOption, DiscoveryError> {
        check_capability_data(&self.capability_data, max_data_len)?;
        Ok(PublishOption {
            freq: self.freq,
            capability_bitmap: resolve_capabilities(&self.capabilities)?,
            capability_data: self.capability_data.clone(),
            ranging: self.ranging,
        })
    }
}

/// Client subscribe (discovery) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeInfo {
    pub subscribe_id: i32,
    pub mode: DiscoverMode,
    pub medium: ExchangeMedium,
    pub freq: FreqType,
    pub is_same_account: bool,
    pub is_wake_remote: bool,
    pub capabilities: Vec<String>,
    pub capability_data: Vec<u8>,
}

impl SubscribeInfo {
    pub fn new(
        subscribe_id: i32,
        mode: DiscoverMode,
        medium: ExchangeMedium,
        capability: &str,
    ) -> Self {
        Self {
            subscribe_id,
            mode,
            medium,
            freq: FreqType::Low,
            is_same_account: false,
            is_wake_remote: false,
            capabilities: vec![capability.to_string()],
            capability_data: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: &str) -> Self {
        self.capabilities.push(capability.to_string());
        self
    }

    pub fn with_freq(mut self, freq: FreqType) -> Self {
        self.freq = freq;
        self
    }

    pub fn with_capability_data(mut self, data: Vec<u8>) -> Self {
        self.capability_data = data;
        self
    }

    pub fn with_flags(mut self, is_same_account: bool, is_wake_remote: bool) -> Self {
        self.is_same_account = is_same_account;
        self.is_wake_remote = is_wake_remote;
        self
    }

    pub(crate) fn to_option(&self, max_data_len: usize) -> Result<SubscribeOption, DiscoveryError> {
        check_capability_data(&self.capability_data, max_data_len)?;
        Ok(SubscribeOption {
            freq: self.freq,
            is_same_account: self.is_same_account,
            is_wake_remote: self.is_wake_remote,
            capability_bitmap: resolve_capabilities(&self.capabilities)?,
            capability_data: self.capability_data.clone(),
        })
    }
}

fn check_capability_data(data: &[u8], max_len: usize) -> Result<(), DiscoveryError> {
    if data.len() > max_len {
        return Err(DiscoveryError::InvalidParam(format!(
            "capability data {} bytes exceeds {}",
            data.len(),
            max_len
        )));
    }
    Ok(())
}

fn resolve_capabilities(names: &[String]) -> Result<CapabilityBitmap, DiscoveryError> {
    if names.is_empty() {
        return Err(DiscoveryError::CapabilityInvalid(String::new()));
    }
    CapabilityBitmap::from_names(names)
}

/// What a backend receives for publish / scan calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOption {
    pub freq: FreqType,
    pub capability_bitmap: CapabilityBitmap,
    pub capability_data: Vec<u8>,
    pub ranging: bool,
}

/// What a backend receives for advertise / subscribe calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOption {
    pub freq: FreqType,
    pub is_same_account: bool,
    pub is_wake_remote: bool,
    pub capability_bitmap: CapabilityBitmap,
    pub capability_data: Vec<u8>,
}

/// Stored option of one registration; the variant fixes the service kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InnerOption {
    Publish(PublishOption),
    Subscribe(SubscribeOption),
}

impl InnerOption {
    pub fn capability_bitmap(&self) -> CapabilityBitmap {
        match self {
            Self::Publish(option) => option.capability_bitmap,
            Self::Subscribe(option) => option.capability_bitmap,
        }
    }
}

/// Device reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: String,
    pub device_type: u32,
    pub capability_bitmap: CapabilityBitmap,
    pub capability_data: Vec<u8>,
}

/// Side information attached to a found-device report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundAdditions {
    pub medium: ExchangeMedium,
}
