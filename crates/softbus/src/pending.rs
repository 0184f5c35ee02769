// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pending packet registry.
//!
//! Correlates an outbound request `(channel_id, seq)` with its reply so a
//! caller can block on an asynchronous transport:
//!
//! ```text
//! registry.create(ch, seq)?;         // before sending the request
//! transport.send(...);
//! registry.wait(ch, seq, timeout, true)?;
//!                                    // receive thread: registry.deliver(ch, seq, reply)
//! ```
//!
//! At most one entry exists per key. A reply that arrives before the waiter
//! is kept and handed out as [`PendingReply::AlreadyTriggered`].

use crate::error::PendingError;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Key = (i32, i32);

#[derive(Default)]
struct PendingPacket {
    reply: Mutex<Option<Vec<u8>>>,
    cond: Condvar,
}

/// Outcome of a successful [`PendingRegistry::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingReply {
    /// Reply had already been delivered when `wait` was called.
    AlreadyTriggered(Vec<u8>),
    /// Reply arrived while the caller was blocked.
    Delivered(Vec<u8>),
}

impl PendingReply {
    pub fn data(&self) -> &[u8] {
        match self {
            Self::AlreadyTriggered(data) | Self::Delivered(data) => data,
        }
    }

    pub fn into_data(self) -> Vec<u8> {
        match self {
            Self::AlreadyTriggered(data) | Self::Delivered(data) => data,
        }
    }
}

/// Registry of in-flight request/response correlations.
#[derive(Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<Key, Arc<PendingPacket>>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `(channel_id, seq)`; fails if it is already in flight.
    pub fn create(&self, channel_id: i32, seq: i32) -> Result<(), PendingError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&(channel_id, seq)) {
            log::warn!(
                "[pending] duplicate packet channel={} seq={}",
                channel_id,
                seq
            );
            return Err(PendingError::AlreadyExists { channel_id, seq });
        }
        entries.insert((channel_id, seq), Arc::new(PendingPacket::default()));
        Ok(())
    }

    /// Store the reply and wake the waiter, if any.
    ///
    /// A second delivery before the waiter consumed the first replaces it.
    pub fn deliver(&self, channel_id: i32, seq: i32, data: Vec<u8>) -> Result<(), PendingError> {
        let packet = self
            .lookup(channel_id, seq)
            .ok_or(PendingError::NotFound { channel_id, seq })?;

        *packet.reply.lock() = Some(data);
        packet.cond.notify_all();
        Ok(())
    }

    /// Block until the reply for `(channel_id, seq)` arrives or `timeout`
    /// elapses.
    ///
    /// On timeout the entry stays registered (a late reply can still complete
    /// it) unless `delete_on_return` is set. On success the entry is removed
    /// only when `delete_on_return` is set.
    pub fn wait(
        &self,
        channel_id: i32,
        seq: i32,
        timeout: Duration,
        delete_on_return: bool,
    ) -> Result<PendingReply, PendingError> {
        let packet = self
            .lookup(channel_id, seq)
            .ok_or(PendingError::NotFound { channel_id, seq })?;

        let result = {
            let mut reply = packet.reply.lock();
            if let Some(data) = reply.take() {
                Ok(PendingReply::AlreadyTriggered(data))
            } else {
                // Absolute deadline: spurious wakeups re-wait on the same instant.
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(data) = reply.take() {
                        break Ok(PendingReply::Delivered(data));
                    }
                    if packet.cond.wait_until(&mut reply, deadline).timed_out() {
                        break reply
                            .take()
                            .map(PendingReply::Delivered)
                            .ok_or(PendingError::Timeout { channel_id, seq });
                    }
                }
            }
        };

        if let Err(e) = &result {
            log::debug!("[pending] {}", e);
        }
        if delete_on_return {
            self.delete(channel_id, seq);
        }
        result
    }

    /// Remove `(channel_id, seq)`; returns whether it existed.
    pub fn delete(&self, channel_id: i32, seq: i32) -> bool {
        self.entries.lock().remove(&(channel_id, seq)).is_some()
    }

    pub fn contains(&self, channel_id: i32, seq: i32) -> bool {
        self.entries.lock().contains_key(&(channel_id, seq))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, channel_id: i32, seq: i32) -> Option<Arc<PendingPacket>> {
        self.entries.lock().get(&(channel_id, seq)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_create_fails_until_deleted() {
        let registry = PendingRegistry::new();
        registry.create(1, 1).expect("first");
        assert_eq!(
            registry.create(1, 1),
            Err(PendingError::AlreadyExists {
                channel_id: 1,
                seq: 1
            })
        );
        assert!(registry.delete(1, 1));
        registry.create(1, 1).expect("after delete");
    }

    #[test]
    fn test_same_seq_other_channel_is_independent() {
        let registry = PendingRegistry::new();
        registry.create(1, 7).expect("ch1");
        registry.create(2, 7).expect("ch2");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_deliver_before_wait_is_already_triggered() {
        let registry = PendingRegistry::new();
        registry.create(3, 4).expect("create");
        registry.deliver(3, 4, b"ok".to_vec()).expect("deliver");

        let start = Instant::now();
        let reply = registry
            .wait(3, 4, Duration::from_secs(10), true)
            .expect("reply");
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(reply, PendingReply::AlreadyTriggered(b"ok".to_vec()));
        assert!(!registry.contains(3, 4));
    }

    #[test]
    fn test_timeout_keeps_entry_unless_deleted() {
        let registry = PendingRegistry::new();
        registry.create(1, 2).expect("create");

        let err = registry
            .wait(1, 2, Duration::from_millis(20), false)
            .unwrap_err();
        assert_eq!(
            err,
            PendingError::Timeout {
                channel_id: 1,
                seq: 2
            }
        );
        assert!(registry.contains(1, 2));

        // Late reply still completes the kept entry.
        registry.deliver(1, 2, vec![5]).expect("late deliver");
        let reply = registry
            .wait(1, 2, Duration::from_millis(20), true)
            .expect("late reply");
        assert_eq!(reply.into_data(), vec![5]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_timeout_with_delete_removes_entry() {
        let registry = PendingRegistry::new();
        registry.create(1, 3).expect("create");
        assert!(registry
            .wait(1, 3, Duration::from_millis(10), true)
            .is_err());
        assert!(!registry.contains(1, 3));
    }

    #[test]
    fn test_unknown_key_is_not_found() {
        let registry = PendingRegistry::new();
        assert_eq!(
            registry.deliver(9, 9, Vec::new()),
            Err(PendingError::NotFound {
                channel_id: 9,
                seq: 9
            })
        );
        assert!(matches!(
            registry.wait(9, 9, Duration::from_millis(1), false),
            Err(PendingError::NotFound { .. })
        ));
    }

    #[test]
    fn test_deliver_wakes_blocked_waiter() {
        let registry = Arc::new(PendingRegistry::new());
        registry.create(5, 100).expect("create");

        let waiter = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let start = Instant::now();
                let reply = registry.wait(5, 100, Duration::from_secs(5), true);
                (reply, start.elapsed())
            })
        };

        std::thread::sleep(Duration::from_millis(10));
        registry.deliver(5, 100, b"x".to_vec()).expect("deliver");

        let (reply, elapsed) = waiter.join().expect("waiter");
        assert_eq!(reply.expect("reply").data(), b"x");
        assert!(elapsed < Duration::from_secs(5));
    }
}
