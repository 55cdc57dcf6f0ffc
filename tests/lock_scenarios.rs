//! Integration tests exercising the six acceptance scenarios: fresh acquire,
//! contested acquire, steal after expiry, heartbeat losing a race, abandonment,
//! and release/double-release — all through the public `LockManager` API
//! against the in-memory fake store.

use std::sync::Arc;

use lockkeeper::clock::FixedClock;
use lockkeeper::config::LockManagerConfig;
use lockkeeper::core::LockManager;
use lockkeeper::errors::LockError;
use lockkeeper::storage::fake::FakeLockStore;
use lockkeeper::storage::LockStore;
use tokio_util::sync::CancellationToken;

fn config(owner: &str) -> LockManagerConfig {
    LockManagerConfig {
        owner: owner.to_string(),
        max_shards: 3,
        lease_duration_s: 10,
        heartbeat_interval_s: 3,
        abandonment_threshold_ms: 300_000,
        max_payload_bytes: 4096,
    }
}

fn manager(
    store: Arc<FakeLockStore>,
    now_ms: i64,
    owner: &str,
) -> LockManager<Arc<FakeLockStore>, Arc<FixedClock>> {
    LockManager::new(store, Arc::new(FixedClock::new(now_ms)), config(owner), None)
}

fn no_cancel() -> CancellationToken {
    CancellationToken::new()
}

#[tokio::test]
async fn fresh_acquire_grants_the_lock() {
    let store = Arc::new(FakeLockStore::new());
    let mgr = manager(store, 0, "worker-a");

    let record = mgr
        .acquire("order-42", b"payload".to_vec(), &no_cancel())
        .await
        .unwrap();
    assert_eq!(record.owner, "worker-a");
    assert_eq!(record.payload, b"payload");

    mgr.close().await;
}

#[tokio::test]
async fn contested_acquire_returns_unavailable_and_leaves_holder_in_place() {
    let store = Arc::new(FakeLockStore::new());
    let holder = manager(store.clone(), 0, "worker-a");
    holder.acquire("order-42", Vec::new(), &no_cancel()).await.unwrap();

    let contender = manager(store.clone(), 1_000, "worker-b");
    let result = contender.acquire("order-42", Vec::new(), &no_cancel()).await;
    assert!(matches!(result, Err(LockError::Unavailable)));

    let remote = store.get("order-42").await.unwrap().unwrap();
    assert_eq!(remote.owner, "worker-a");

    holder.close().await;
    contender.close().await;
}

#[tokio::test]
async fn steal_after_expiry_transfers_ownership() {
    let store = Arc::new(FakeLockStore::new());
    let holder = manager(store.clone(), 0, "worker-a");
    holder.acquire("order-42", Vec::new(), &no_cancel()).await.unwrap();

    // Lease duration is 10s; advance well past expiry.
    let thief = manager(store, 20_000, "worker-b");
    let record = thief.acquire("order-42", Vec::new(), &no_cancel()).await.unwrap();
    assert_eq!(record.owner, "worker-b");

    holder.close().await;
    thief.close().await;
}

#[tokio::test]
async fn heartbeat_loses_race_to_a_steal() {
    let store = Arc::new(FakeLockStore::new());
    let holder = manager(store.clone(), 0, "worker-a");
    holder.acquire("order-42", Vec::new(), &no_cancel()).await.unwrap();

    let thief = manager(store, 20_000, "worker-b");
    thief.acquire("order-42", Vec::new(), &no_cancel()).await.unwrap();

    let result = holder.heartbeat("order-42", None, &no_cancel()).await;
    assert!(matches!(result, Err(LockError::Unavailable)));
    assert_eq!(holder.held_count().await, 0);

    holder.close().await;
    thief.close().await;
}

#[tokio::test]
async fn abandonment_evicts_the_local_belief() {
    let mut cfg = config("worker-a");
    cfg.abandonment_threshold_ms = 5_000;
    let store = Arc::new(FakeLockStore::new());
    let clock = Arc::new(FixedClock::new(0));
    let mgr = LockManager::new(store, clock.clone(), cfg, None);

    mgr.acquire("order-42", Vec::new(), &no_cancel()).await.unwrap();
    clock.advance(5_001);

    let result = mgr.heartbeat("order-42", None, &no_cancel()).await;
    assert!(matches!(result, Err(LockError::Abandoned)));
    assert_eq!(mgr.held_count().await, 0);

    mgr.close().await;
}

#[tokio::test]
async fn release_then_double_release_is_not_found() {
    let store = Arc::new(FakeLockStore::new());
    let mgr = manager(store.clone(), 0, "worker-a");
    mgr.acquire("order-42", Vec::new(), &no_cancel()).await.unwrap();

    mgr.release("order-42", &no_cancel()).await.unwrap();
    assert!(store.get("order-42").await.unwrap().is_none());

    let second = mgr.release("order-42", &no_cancel()).await;
    assert!(matches!(second, Err(LockError::NotFound)));

    mgr.close().await;
}

#[tokio::test]
async fn a_pre_cancelled_token_short_circuits_acquire() {
    let store = Arc::new(FakeLockStore::new());
    let mgr = manager(store, 0, "worker-a");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = mgr.acquire("order-42", Vec::new(), &cancel).await;
    assert!(matches!(result, Err(LockError::Cancelled)));

    mgr.close().await;
}
