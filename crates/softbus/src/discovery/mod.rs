// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Capability publish/subscribe discovery.
//!
//! # Architecture
//!
//! ```text
//! client / internal module
//!        | publish_service / start_discovery / subscribe ...
//!        v
//! DiscoveryManager --- publish list, discovery list, capability index
//!        | mode + medium dispatch
//!        v
//! DiscoveryBackend (BLE, CoAP) --DeviceFoundSink--> fan-out to listeners
//! ```

pub mod backend;
pub mod capability;
pub mod manager;
pub mod option;
pub mod service;

pub use backend::{BackendResult, Backends, DeviceFoundSink, DiscoveryBackend};
pub use capability::{capability_bit, capability_name, CapabilityBitmap, CAPABILITY_MAP, CAPABILITY_MAX_BITNUM};
pub use manager::{DiscoveryManager, PKG_NAME_SIZE_MAX};
pub use option::{
    DeviceInfo, DiscoverMode, ExchangeMedium, FoundAdditions, FreqType, InfoTypeChanged,
    InnerOption, LinkStatus, PublishInfo, PublishOption, SubscribeInfo, SubscribeOption,
};
pub use service::{DeferredListener, DiscModule, DiscoveryListener};
