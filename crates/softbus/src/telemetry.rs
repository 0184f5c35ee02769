// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery statistics sink.
//!
//! The discovery manager reports through [`DiscoveryStats`]; failures inside a
//! sink are the sink's problem and never reach the manager.
#![allow(missing_docs)]

use crate::discovery::ExchangeMedium;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Fire-and-forget statistics collaborator.
pub trait DiscoveryStats: Send + Sync {
    /// One backend call was issued on `medium`.
    fn record_scan_times(&self, medium: ExchangeMedium);

    /// Latency from the first backend call to the first found device.
    fn record_first_discovery_time(&self, medium: ExchangeMedium, elapsed: Duration);

    /// A backend call on `medium` failed with `code`.
    fn record_fault(&self, medium: ExchangeMedium, code: i32);

    /// A client started a discovery.
    fn report_discovery_startup(&self, package_name: &str);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl DiscoveryStats for NoopStats {
    fn record_scan_times(&self, _medium: ExchangeMedium) {}
    fn record_first_discovery_time(&self, _medium: ExchangeMedium, _elapsed: Duration) {}
    fn record_fault(&self, _medium: ExchangeMedium, _code: i32) {}
    fn report_discovery_startup(&self, _package_name: &str) {}
}

/// Atomic-counter statistics.
///
/// Thread-safe: every counter is a Relaxed atomic, so recording never blocks.
#[derive(Debug, Default)]
pub struct DiscoveryMetrics {
    scan_auto: AtomicU64,
    scan_ble: AtomicU64,
    scan_coap: AtomicU64,
    faults: AtomicU64,
    startups: AtomicU64,
    first_discoveries: AtomicU64,
    last_first_discovery_us: AtomicU64,
}

/// Point-in-time copy of [`DiscoveryMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub scan_auto: u64,
    pub scan_ble: u64,
    pub scan_coap: u64,
    pub faults: u64,
    pub startups: u64,
    pub first_discoveries: u64,
    pub last_first_discovery_us: u64,
}

impl MetricsSnapshot {
    pub fn scan_total(&self) -> u64 {
        self.scan_auto + self.scan_ble + self.scan_coap
    }
}

impl DiscoveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scan_auto: self.scan_auto.load(Ordering::Relaxed),
            scan_ble: self.scan_ble.load(Ordering::Relaxed),
            scan_coap: self.scan_coap.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            startups: self.startups.load(Ordering::Relaxed),
            first_discoveries: self.first_discoveries.load(Ordering::Relaxed),
            last_first_discovery_us: self.last_first_discovery_us.load(Ordering::Relaxed),
        }
    }

    fn scan_counter(&self, medium: ExchangeMedium) -> &AtomicU64 {
        match medium {
            ExchangeMedium::Auto => &self.scan_auto,
            ExchangeMedium::Ble => &self.scan_ble,
            ExchangeMedium::Coap => &self.scan_coap,
        }
    }
}

impl DiscoveryStats for DiscoveryMetrics {
    fn record_scan_times(&self, medium: ExchangeMedium) {
        self.scan_counter(medium).fetch_add(1, Ordering::Relaxed);
    }

    fn record_first_discovery_time(&self, _medium: ExchangeMedium, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.first_discoveries.fetch_add(1, Ordering::Relaxed);
        self.last_first_discovery_us.store(us, Ordering::Relaxed);
    }

    fn record_fault(&self, medium: ExchangeMedium, code: i32) {
        log::debug!("[disc] fault medium={:?} code={}", medium, code);
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    fn report_discovery_startup(&self, _package_name: &str) {
        self.startups.fetch_add(1, Ordering::Relaxed);
    }
}
