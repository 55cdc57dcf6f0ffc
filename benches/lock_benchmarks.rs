//! Benchmarks for the hot acquire/heartbeat/release paths, run against the
//! in-memory fake store so results measure the manager's own overhead rather
//! than network latency to a real DynamoDB endpoint.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lockkeeper::clock::SystemClock;
use lockkeeper::config::LockManagerConfig;
use lockkeeper::core::LockManager;
use lockkeeper::storage::fake::FakeLockStore;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

fn config() -> LockManagerConfig {
    LockManagerConfig {
        owner: "bench-owner".to_string(),
        max_shards: 4,
        lease_duration_s: 10,
        heartbeat_interval_s: 3,
        abandonment_threshold_ms: 300_000,
        max_payload_bytes: 1024,
    }
}

fn bench_acquire_fresh(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("acquire_fresh", |b| {
        b.to_async(&rt).iter(|| async {
            let manager = LockManager::new(
                Arc::new(FakeLockStore::new()),
                SystemClock,
                config(),
                None,
            );
            let cancel = CancellationToken::new();
            let _ = manager
                .acquire(black_box("bench-key"), black_box(Vec::new()), &cancel)
                .await;
            manager.close().await;
        })
    });
}

fn bench_acquire_and_release(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("acquire_and_release", |b| {
        b.to_async(&rt).iter(|| async {
            let manager = LockManager::new(
                Arc::new(FakeLockStore::new()),
                SystemClock,
                config(),
                None,
            );
            let cancel = CancellationToken::new();
            let _ = manager.acquire(black_box("bench-key"), Vec::new(), &cancel).await;
            let _ = manager.release(black_box("bench-key"), &cancel).await;
            manager.close().await;
        })
    });
}

fn bench_heartbeat(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("heartbeat", |b| {
        b.to_async(&rt).iter(|| async {
            let manager = LockManager::new(
                Arc::new(FakeLockStore::new()),
                SystemClock,
                config(),
                None,
            );
            let cancel = CancellationToken::new();
            manager.acquire("bench-key", Vec::new(), &cancel).await.unwrap();
            let _ = manager.heartbeat(black_box("bench-key"), None, &cancel).await;
            manager.close().await;
        })
    });
}

criterion_group!(benches, bench_acquire_fresh, bench_acquire_and_release, bench_heartbeat);
criterion_main!(benches);
