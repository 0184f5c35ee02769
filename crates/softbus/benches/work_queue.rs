// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Work Queue Benchmark
//!
//! Measures the cost of moving callbacks off the caller thread:
//! - enqueue latency when the consumer keeps up
//! - end-to-end latency of one item (enqueue to callback)
//! - batch throughput for several payload sizes

#![allow(clippy::uninlined_format_args)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use softbus::WorkQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

fn bench_enqueue(c: &mut Criterion) {
    let queue = WorkQueue::new(1 << 16, "bench-enqueue").expect("queue");
    c.bench_function("work_queue_enqueue", |b| {
        b.iter(|| {
            // Full means the consumer fell behind; that sample is still an enqueue attempt.
            let _ = queue.enqueue(black_box(vec![0u8; 16]), |data| {
                black_box(data);
            });
        });
    });
    queue.destroy().expect("destroy");
}

fn bench_round_trip(c: &mut Criterion) {
    let queue = WorkQueue::new(64, "bench-rtt").expect("queue");
    c.bench_function("work_queue_round_trip", |b| {
        b.iter(|| {
            let (tx, rx) = mpsc::channel();
            queue
                .enqueue(vec![1u8; 32], move |data| {
                    let _ = tx.send(data.len());
                })
                .expect("enqueue");
            black_box(rx.recv().expect("callback ran"));
        });
    });
    queue.destroy().expect("destroy");
}

fn bench_batch(c: &mut Criterion) {
    const BATCH: usize = 256;
    let mut group = c.benchmark_group("work_queue_batch");
    for size in [64usize, 1024, 16 * 1024] {
        group.throughput(Throughput::Bytes((size * BATCH) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let queue = WorkQueue::new(BATCH, "bench-batch").expect("queue");
            let done = Arc::new(AtomicUsize::new(0));
            b.iter(|| {
                done.store(0, Ordering::SeqCst);
                for _ in 0..BATCH {
                    let done = Arc::clone(&done);
                    queue
                        .enqueue(vec![0u8; size], move |data| {
                            black_box(&data);
                            done.fetch_add(1, Ordering::SeqCst);
                        })
                        .expect("enqueue");
                }
                while done.load(Ordering::SeqCst) < BATCH {
                    std::hint::spin_loop();
                }
            });
            queue.destroy().expect("destroy");
        });
    }
    group.finish();
}

criterion_group!(benches, bench_enqueue, bench_round_trip, bench_batch);
criterion_main!(benches);
