// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded single-consumer work queue.
//!
//! Moves callback execution off the thread that detected an event (transport
//! I/O thread, topology callback thread) onto one dedicated consumer thread.
//!
//! # Ordering
//!
//! Items run in enqueue order. Callbacks run with the queue lock released, so a
//! callback may enqueue more work (or even destroy the queue) without
//! deadlocking.
//!
//! # Ownership
//!
//! The queue owns an item's data buffer from a successful [`WorkQueue::enqueue`]
//! until its callback consumes it. A rejected enqueue hands the buffer back in
//! [`EnqueueError::data`].

use crate::config::WorkQueueConfig;
use crate::error::WorkQueueError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Deferred callback run on the consumer thread with its data buffer.
pub type WorkFn = Box<dyn FnOnce(Vec<u8>) + Send + 'static>;

struct WorkItem {
    process: WorkFn,
    data: Vec<u8>,
}

struct State {
    items: VecDeque<WorkItem>,
    running: bool,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
    capacity: usize,
    name: String,
}

/// Rejected enqueue: the reason plus the caller's data buffer.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct EnqueueError {
    pub kind: WorkQueueError,
    pub data: Vec<u8>,
}

impl EnqueueError {
    /// Recover the rejected buffer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Bounded FIFO executed by a single named consumer thread.
pub struct WorkQueue {
    shared: Arc<Shared>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl WorkQueue {
    /// Create a queue and spawn its consumer thread.
    pub fn new(capacity: usize, name: &str) -> Result<Self, WorkQueueError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity.min(1024)),
                running: true,
            }),
            cond: Condvar::new(),
            capacity,
            name: name.to_string(),
        });

        let worker = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || consumer_loop(&worker))
            .map_err(|e| {
                log::error!("[work-queue] {}: failed to spawn consumer: {}", name, e);
                WorkQueueError::Spawn(e.to_string())
            })?;

        log::debug!("[work-queue] {}: started (capacity={})", name, capacity);

        Ok(Self {
            shared,
            consumer: Mutex::new(Some(handle)),
        })
    }

    /// Create a queue from its configuration section.
    pub fn from_config(config: &WorkQueueConfig) -> Result<Self, WorkQueueError> {
        Self::new(config.capacity, &config.name)
    }

    /// Queue `process` to run later with `data`.
    ///
    /// Fails with [`WorkQueueError::Stopped`] once [`WorkQueue::destroy`] has
    /// begun and with [`WorkQueueError::Full`] when `capacity` items are
    /// already waiting. In both cases `process` is dropped without running and
    /// `data` is returned.
    pub fn enqueue<F>(&self, data: Vec<u8>, process: F) -> Result<(), EnqueueError>
    where
        F: FnOnce(Vec<u8>) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if !state.running {
            return Err(EnqueueError {
                kind: WorkQueueError::Stopped,
                data,
            });
        }
        if state.items.len() >= self.shared.capacity {
            return Err(EnqueueError {
                kind: WorkQueueError::Full,
                data,
            });
        }
        state.items.push_back(WorkItem {
            process: Box::new(process),
            data,
        });
        drop(state);
        self.shared.cond.notify_one();
        Ok(())
    }

    /// Stop the queue and join the consumer.
    ///
    /// Items still queued are dropped without running. Blocks until the
    /// callback in flight (if any) returns. Calling it again, or from inside a
    /// callback running on this queue, does not block.
    pub fn destroy(&self) -> Result<(), WorkQueueError> {
        {
            let mut state = self.shared.state.lock();
            state.running = false;
        }
        self.shared.cond.notify_all();

        let Some(handle) = self.consumer.lock().take() else {
            return Ok(());
        };

        if handle.thread().id() == std::thread::current().id() {
            // Destroyed from one of our own callbacks; the loop exits on return.
            return Ok(());
        }

        handle.join().map_err(|_| {
            log::error!("[work-queue] {}: consumer panicked", self.shared.name);
            WorkQueueError::ConsumerPanicked
        })?;
        log::debug!("[work-queue] {}: stopped", self.shared.name);
        Ok(())
    }

    /// Number of items waiting (not counting the one being executed).
    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// `false` once [`WorkQueue::destroy`] has begun.
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        let _ = self.destroy();
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.shared.name)
            .field("capacity", &self.shared.capacity)
            .finish_non_exhaustive()
    }
}

fn consumer_loop(shared: &Shared) {
    let mut state = shared.state.lock();
    loop {
        while state.items.is_empty() && state.running {
            shared.cond.wait(&mut state);
        }

        if !state.running {
            let dropped = state.items.len();
            state.items.clear();
            if dropped > 0 {
                log::debug!(
                    "[work-queue] {}: discarded {} pending items on stop",
                    shared.name,
                    dropped
                );
            }
            return;
        }

        let Some(item) = state.items.pop_front() else {
            continue;
        };

        drop(state);
        let WorkItem { process, data } = item;
        if catch_unwind(AssertUnwindSafe(move || process(data))).is_err() {
            log::error!("[work-queue] {}: work item panicked", shared.name);
        }
        state = shared.state.lock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = WorkQueue::new(256, "wq-fifo").expect("queue");
        let n = fastrand::usize(1..200);
        let (tx, rx) = mpsc::channel();

        for i in 0..n {
            let tx = tx.clone();
            queue
                .enqueue((i as u32).to_le_bytes().to_vec(), move |data| {
                    let mut raw = [0u8; 4];
                    raw.copy_from_slice(&data);
                    tx.send(u32::from_le_bytes(raw)).expect("send");
                })
                .expect("enqueue");
        }

        let seen: Vec<u32> = (0..n)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("item"))
            .collect();
        let expected: Vec<u32> = (0..n as u32).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_full_returns_data_and_skips_callback() {
        let queue = WorkQueue::new(1, "wq-full").expect("queue");
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        queue
            .enqueue(vec![1], move |_| {
                started_tx.send(()).expect("started");
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
            })
            .expect("first");
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("consumer picked first item");

        queue.enqueue(vec![2], |_| {}).expect("second fits");

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        let err = queue
            .enqueue(vec![3, 3, 3], move |_| {
                ran_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap_err();
        assert_eq!(err.kind, WorkQueueError::Full);
        assert_eq!(err.into_data(), vec![3, 3, 3]);

        release_tx.send(()).expect("release");
        queue.destroy().expect("destroy");
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_enqueue_after_destroy_is_stopped() {
        let queue = WorkQueue::new(4, "wq-stopped").expect("queue");
        queue.destroy().expect("destroy");
        assert!(!queue.is_running());

        let err = queue.enqueue(vec![7], |_| {}).unwrap_err();
        assert_eq!(err.kind, WorkQueueError::Stopped);
        assert_eq!(err.data, vec![7]);

        // Second destroy is a no-op.
        assert!(queue.destroy().is_ok());
    }

    #[test]
    fn test_destroy_discards_pending_items() {
        let queue = WorkQueue::new(8, "wq-drain").expect("queue");
        let (started_tx, started_rx) = mpsc::channel();
        let ran = Arc::new(AtomicUsize::new(0));

        queue
            .enqueue(Vec::new(), move |_| {
                started_tx.send(()).expect("started");
                std::thread::sleep(Duration::from_millis(50));
            })
            .expect("blocker");
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("blocker started");

        for _ in 0..4 {
            let ran = Arc::clone(&ran);
            queue
                .enqueue(Vec::new(), move |_| {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .expect("enqueue");
        }

        queue.destroy().expect("destroy");
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_callback_can_reenqueue() {
        let queue = Arc::new(WorkQueue::new(4, "wq-reenter").expect("queue"));
        let (tx, rx) = mpsc::channel();

        let inner_queue = Arc::clone(&queue);
        queue
            .enqueue(vec![1], move |_| {
                inner_queue
                    .enqueue(vec![2], move |data| tx.send(data).expect("send"))
                    .expect("nested enqueue");
            })
            .expect("outer enqueue");

        let data = rx.recv_timeout(Duration::from_secs(5)).expect("nested ran");
        assert_eq!(data, vec![2]);
    }

    #[test]
    fn test_panicking_item_does_not_kill_consumer() {
        let queue = WorkQueue::new(4, "wq-panic").expect("queue");
        let (tx, rx) = mpsc::channel();

        queue
            .enqueue(Vec::new(), |_| panic!("boom"))
            .expect("enqueue panicking item");
        queue
            .enqueue(vec![9], move |data| tx.send(data).expect("send"))
            .expect("enqueue");

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).expect("survived"),
            vec![9]
        );
        assert!(queue.destroy().is_ok());
    }
}
