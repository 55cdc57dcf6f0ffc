//! Distributed lock manager implementation.
//!
//! This module drives the acquisition/steal state machine described in
//! spec.md §4.3: it reads the current remote record, decides whether to
//! acquire fresh, steal an expired lease, or refuse, performs exactly one
//! conditional write, and on success publishes the result to the local
//! registry. A background heartbeat loop (see [`crate::core::heartbeat`])
//! renews every registry entry on a fixed cadence.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::LockManagerConfig;
use crate::core::heartbeat;
use crate::errors::{LockError, Result};
use crate::metrics::{Metrics, MetricsTimer};
use crate::registry::LockRegistry;
use crate::storage::{CasPut, LockStore};

/// One row of the backing table — see spec.md §3 "Data Model".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Caller-supplied identifier; primary key.
    pub lock_id: String,
    /// Stable identifier of the holding process (host + pid suffices).
    pub owner: String,
    /// How long the lease remains valid after `last_updated_ms`.
    pub lease_duration_ms: i64,
    /// Set on every successful write.
    pub last_updated_ms: i64,
    /// Set once, at initial acquisition; never overwritten by steals-by-same-owner
    /// or heartbeats.
    pub created_at_ms: i64,
    /// New value on every write; the CAS token.
    pub record_version: String,
    /// Partitioning hint for secondary-index scans; random at creation, preserved
    /// on updates.
    pub shard: u32,
    /// Passed to the backing store's native row-expiry facility.
    pub ttl_epoch_s: i64,
    /// Caller-supplied opaque data carried with the lock.
    pub payload: Vec<u8>,
}

/// A remote record is expired relative to `now_ms` iff its lease has run out.
/// Evaluated only by contenders considering a steal — a holder never uses this
/// to judge its own lease, relying on CAS feedback instead (spec.md §4.2).
pub fn is_expired(record: &LockRecord, now_ms: i64) -> bool {
    now_ms - record.last_updated_ms > record.lease_duration_ms
}

/// Shared state between the public `LockManager` handle and the heartbeat
/// loop task, so both can perform the same CAS-renewal logic without
/// duplicating it.
pub(crate) struct Inner<S: LockStore, C: Clock> {
    pub(crate) store: S,
    pub(crate) clock: C,
    pub(crate) registry: LockRegistry,
    pub(crate) config: LockManagerConfig,
    pub(crate) metrics: Option<Arc<Metrics>>,
    /// Lifecycle cancellation: fired by `LockManager::close`. In-flight remote
    /// calls observe it and short-circuit, same as a caller-supplied token.
    pub(crate) cancel: CancellationToken,
}

/// Distributed advisory lock manager for coordinating access to an opaque
/// identifier across a fleet of peer processes.
pub struct LockManager<S: LockStore + 'static, C: Clock + 'static = crate::clock::SystemClock> {
    pub(crate) inner: Arc<Inner<S, C>>,
    heartbeat_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: LockStore + 'static, C: Clock + 'static> LockManager<S, C> {
    /// Construct a new manager and start its heartbeat loop.
    ///
    /// The loop runs on its own task for the lifetime of this manager; call
    /// [`LockManager::close`] to stop it.
    pub fn new(store: S, clock: C, config: LockManagerConfig, metrics: Option<Arc<Metrics>>) -> Self {
        let cancel = CancellationToken::new();
        let inner = Arc::new(Inner {
            store,
            clock,
            registry: LockRegistry::new(),
            config,
            metrics,
            cancel,
        });

        let interval = Duration::from_secs(inner.config.heartbeat_interval_s.max(1));
        let handle = heartbeat::spawn(inner.clone(), interval, inner.cancel.clone());

        Self {
            inner,
            heartbeat_handle: Mutex::new(Some(handle)),
        }
    }

    /// Attempt to obtain the lock named `id` with the caller's payload.
    ///
    /// `cancel` is a caller-scoped cancellation context (spec.md §4.1); the
    /// call also observes the manager's own shutdown signal.
    pub async fn acquire(&self, id: &str, payload: Vec<u8>, cancel: &CancellationToken) -> Result<LockRecord> {
        acquire_inner(&self.inner, id, payload, cancel).await
    }

    /// Renew a lease this process believes it holds.
    pub async fn heartbeat(
        &self,
        id: &str,
        new_payload: Option<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        heartbeat_inner(&self.inner, id, new_payload, cancel).await
    }

    /// Release a lock this process believes it holds.
    pub async fn release(&self, id: &str, cancel: &CancellationToken) -> Result<()> {
        release_inner(&self.inner, id, cancel).await
    }

    /// Stop the heartbeat loop and release internal resources. Does not
    /// attempt to release outstanding locks; those are left to expire.
    pub async fn close(&self) {
        self.inner.cancel.cancel();
        let handle = self.heartbeat_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Number of locks this process currently believes it holds.
    pub async fn held_count(&self) -> usize {
        self.inner.registry.len().await
    }
}

/// Races `fut` against both the caller-supplied `cancel` token and the
/// manager's own shutdown token, so an in-flight remote call aborts as soon
/// as either fires (spec.md §5 "Suspension points").
async fn guarded<F, T>(cancel: &CancellationToken, inner_cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(LockError::Cancelled),
        _ = inner_cancel.cancelled() => Err(LockError::Cancelled),
        result = fut => result,
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(LockError::Invalid("lock_id must not be empty".into()));
    }
    Ok(())
}

fn validate_payload(payload: &[u8], config: &LockManagerConfig) -> Result<()> {
    if payload.len() > config.max_payload_bytes {
        return Err(LockError::Invalid(format!(
            "payload of {} bytes exceeds max_payload_bytes ({})",
            payload.len(),
            config.max_payload_bytes
        )));
    }
    Ok(())
}

pub(crate) async fn acquire_inner<S: LockStore, C: Clock>(
    inner: &Inner<S, C>,
    id: &str,
    payload: Vec<u8>,
    cancel: &CancellationToken,
) -> Result<LockRecord> {
    validate_id(id)?;
    validate_payload(&payload, &inner.config)?;

    let timer = inner.metrics.clone().map(|m| MetricsTimer::new(m, "acquire"));
    let now = inner.clock.now_ms();
    let existing = guarded(cancel, &inner.cancel, inner.store.get(id)).await;

    let result = match existing {
        Err(e) => Err(e),
        Ok(None) => acquire_fresh(inner, id, payload, now, cancel).await,
        Ok(Some(existing)) if !is_expired(&existing, now) => {
            tracing::debug!(lock_id = %id, owner = %existing.owner, "lock held by a live lease");
            Err(LockError::Unavailable)
        }
        Ok(Some(existing)) => steal(inner, id, payload, now, &existing, cancel).await,
    };

    if let Some(timer) = timer {
        timer.finish(match &result {
            Ok(_) => "success",
            Err(LockError::Unavailable) => "unavailable",
            Err(LockError::Cancelled) => "cancelled",
            Err(_) => "error",
        });
    }

    result
}

async fn acquire_fresh<S: LockStore, C: Clock>(
    inner: &Inner<S, C>,
    id: &str,
    payload: Vec<u8>,
    now: i64,
    cancel: &CancellationToken,
) -> Result<LockRecord> {
    let record = new_record(inner, id, payload, now, now, random_shard(inner.config.max_shards));

    match guarded(cancel, &inner.cancel, inner.store.put_if_absent(&record)).await {
        Ok(()) => {
            inner.registry.insert(id.to_string(), record.clone()).await;
            if let Some(metrics) = &inner.metrics {
                metrics.increment_locks_acquired();
            }
            tracing::debug!(lock_id = %id, owner = %inner.config.owner, "acquired fresh lock");
            Ok(record)
        }
        Err(LockError::PreconditionFailed) => {
            tracing::debug!(lock_id = %id, "lost the race to acquire a fresh lock");
            Err(LockError::Unavailable)
        }
        Err(e) => {
            tracing::error!(lock_id = %id, error = %e, "storage error acquiring fresh lock");
            Err(e)
        }
    }
}

async fn steal<S: LockStore, C: Clock>(
    inner: &Inner<S, C>,
    id: &str,
    payload: Vec<u8>,
    now: i64,
    existing: &LockRecord,
    cancel: &CancellationToken,
) -> Result<LockRecord> {
    let record = new_record(inner, id, payload, now, now, existing.shard);
    let steal_before_ms = now - existing.lease_duration_ms;

    let put = CasPut {
        record: &record,
        expected_version: &existing.record_version,
        expected_owner: &inner.config.owner,
        steal_before_ms,
    };

    match guarded(cancel, &inner.cancel, inner.store.put_cas(put)).await {
        Ok(()) => {
            inner.registry.insert(id.to_string(), record.clone()).await;
            if let Some(metrics) = &inner.metrics {
                metrics.increment_locks_stolen();
            }
            tracing::info!(
                lock_id = %id,
                previous_owner = %existing.owner,
                new_owner = %inner.config.owner,
                "stole expired lock"
            );
            Ok(record)
        }
        Err(LockError::PreconditionFailed) => {
            tracing::debug!(lock_id = %id, "lost the race to steal an expired lock");
            Err(LockError::Unavailable)
        }
        Err(e) => {
            tracing::error!(lock_id = %id, error = %e, "storage error stealing lock");
            Err(e)
        }
    }
}

fn new_record<S: LockStore, C: Clock>(
    inner: &Inner<S, C>,
    id: &str,
    payload: Vec<u8>,
    created_at_ms: i64,
    last_updated_ms: i64,
    shard: u32,
) -> LockRecord {
    let lease_duration_ms = (inner.config.lease_duration_s as i64) * 1_000;
    LockRecord {
        lock_id: id.to_string(),
        owner: inner.config.owner.clone(),
        lease_duration_ms,
        last_updated_ms,
        created_at_ms,
        record_version: crate::clock::new_version_id(),
        shard,
        ttl_epoch_s: ttl_epoch_s(last_updated_ms, inner.config.lease_duration_s),
        payload,
    }
}

/// `ttl_epoch_s` must always be strictly greater than the lease end, so the
/// backing store's native row-expiry never races a valid lease (spec.md §3).
fn ttl_epoch_s(last_updated_ms: i64, lease_duration_s: u64) -> i64 {
    last_updated_ms / 1000 + 10 * lease_duration_s as i64
}

fn random_shard(max_shards: u32) -> u32 {
    rand::thread_rng().gen_range(0..max_shards)
}

pub(crate) async fn heartbeat_inner<S: LockStore, C: Clock>(
    inner: &Inner<S, C>,
    id: &str,
    new_payload: Option<Vec<u8>>,
    cancel: &CancellationToken,
) -> Result<()> {
    validate_id(id)?;
    if let Some(payload) = &new_payload {
        validate_payload(payload, &inner.config)?;
    }

    let timer = inner.metrics.clone().map(|m| MetricsTimer::new(m, "heartbeat"));

    let Some(local) = inner.registry.get(id).await else {
        return Err(LockError::NotFound);
    };

    let now = inner.clock.now_ms();

    if now - local.created_at_ms > inner.config.abandonment_threshold_ms {
        inner.registry.evict(id).await;
        if let Some(metrics) = &inner.metrics {
            metrics.increment_locks_abandoned();
        }
        tracing::warn!(lock_id = %id, held_for_ms = now - local.created_at_ms, "lock abandoned");
        if let Some(timer) = timer {
            timer.finish("abandoned");
        }
        return Err(LockError::Abandoned);
    }

    let payload = new_payload.unwrap_or_else(|| local.payload.clone());
    let record = new_record(inner, id, payload, local.created_at_ms, now, local.shard);

    let steal_before_ms = now - local.lease_duration_ms;
    let put = CasPut {
        record: &record,
        expected_version: &local.record_version,
        expected_owner: &inner.config.owner,
        steal_before_ms,
    };

    let result = guarded(cancel, &inner.cancel, inner.store.put_cas(put)).await;

    let outcome = match &result {
        Ok(()) => {
            inner.registry.insert(id.to_string(), record.clone()).await;
            "success"
        }
        Err(LockError::PreconditionFailed) => "unavailable",
        Err(LockError::Cancelled) => "cancelled",
        Err(_) => "error",
    };
    if let Some(timer) = timer {
        timer.finish(outcome);
    }

    match result {
        Ok(()) => Ok(()),
        Err(LockError::PreconditionFailed) => {
            inner.registry.evict(id).await;
            if let Some(metrics) = &inner.metrics {
                metrics.decrement_active_locks_lost();
            }
            tracing::debug!(lock_id = %id, "heartbeat lost the lease — evicting local entry");
            Err(LockError::Unavailable)
        }
        Err(e) => {
            tracing::error!(lock_id = %id, error = %e, "storage error during heartbeat");
            Err(e)
        }
    }
}

pub(crate) async fn release_inner<S: LockStore, C: Clock>(
    inner: &Inner<S, C>,
    id: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    validate_id(id)?;

    let timer = inner.metrics.clone().map(|m| MetricsTimer::new(m, "release"));

    let Some(local) = inner.registry.evict(id).await else {
        if let Some(timer) = timer {
            timer.finish("not_found");
        }
        return Err(LockError::NotFound);
    };

    let result = guarded(
        cancel,
        &inner.cancel,
        inner.store.delete_cas(id, &local.owner, &local.record_version),
    )
    .await;

    let outcome = match &result {
        Ok(()) => "success",
        Err(LockError::PreconditionFailed) => "precondition_failed",
        Err(LockError::Cancelled) => "cancelled",
        Err(_) => "error",
    };
    if let Some(timer) = timer {
        timer.finish(outcome);
    }

    match result {
        Ok(()) => {
            if let Some(metrics) = &inner.metrics {
                metrics.increment_locks_released();
            }
            tracing::debug!(lock_id = %id, "released lock");
            Ok(())
        }
        Err(LockError::PreconditionFailed) => {
            // Expected: another process already stole or deleted the row. The
            // eviction above already happened; the next contender will see the
            // row as expired via last_updated_ms regardless.
            if let Some(metrics) = &inner.metrics {
                metrics.decrement_active_locks_lost();
            }
            tracing::debug!(lock_id = %id, "release's conditional delete lost a race");
            Err(LockError::ReleaseFailed("precondition not met".to_string()))
        }
        Err(LockError::Storage(e)) => {
            tracing::error!(lock_id = %id, error = %e, "storage error releasing lock");
            Err(LockError::ReleaseFailed(e))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::fake::FakeLockStore;

    fn config(owner: &str) -> LockManagerConfig {
        LockManagerConfig {
            owner: owner.to_string(),
            max_shards: 2,
            lease_duration_s: 10,
            heartbeat_interval_s: 3,
            abandonment_threshold_ms: 300_000,
            max_payload_bytes: 1024,
        }
    }

    fn manager(
        store: Arc<FakeLockStore>,
        now_ms: i64,
        cfg: LockManagerConfig,
    ) -> LockManager<Arc<FakeLockStore>, FixedClock> {
        LockManager::new(store, FixedClock::new(now_ms), cfg, None)
    }

    fn no_cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn fresh_acquire_succeeds() {
        let store = Arc::new(FakeLockStore::new());
        let mgr = manager(store, 0, config("owner-a"));
        let record = mgr
            .acquire("job-1", b"payload".to_vec(), &no_cancel())
            .await
            .unwrap();
        assert_eq!(record.owner, "owner-a");
        assert_eq!(record.created_at_ms, 0);
        mgr.close().await;
    }

    #[tokio::test]
    async fn contested_acquire_is_unavailable() {
        let store = Arc::new(FakeLockStore::new());
        let mgr_a = manager(store.clone(), 0, config("owner-a"));
        mgr_a.acquire("job-1", Vec::new(), &no_cancel()).await.unwrap();

        let mgr_b = manager(store, 1_000, config("owner-b"));
        let result = mgr_b.acquire("job-1", Vec::new(), &no_cancel()).await;
        assert!(matches!(result, Err(LockError::Unavailable)));

        // Table unchanged: still owner-a's record.
        let remote = mgr_b.inner.store.get("job-1").await.unwrap().unwrap();
        assert_eq!(remote.owner, "owner-a");

        mgr_a.close().await;
        mgr_b.close().await;
    }

    #[tokio::test]
    async fn steal_after_expiry_preserves_shard_and_resets_created_at() {
        let store = Arc::new(FakeLockStore::new());
        let mgr_a = manager(store.clone(), 0, config("owner-a"));
        let first = mgr_a.acquire("job-1", Vec::new(), &no_cancel()).await.unwrap();

        let mgr_b = manager(store, 15_000, config("owner-b"));
        let stolen = mgr_b.acquire("job-1", Vec::new(), &no_cancel()).await.unwrap();

        assert_eq!(stolen.owner, "owner-b");
        assert_ne!(stolen.record_version, first.record_version);
        assert_eq!(stolen.shard, first.shard);
        assert_eq!(stolen.created_at_ms, 15_000);

        mgr_a.close().await;
        mgr_b.close().await;
    }

    #[tokio::test]
    async fn heartbeat_without_local_entry_is_not_found() {
        let store = Arc::new(FakeLockStore::new());
        let mgr = manager(store, 0, config("owner-a"));
        let result = mgr.heartbeat("job-1", None, &no_cancel()).await;
        assert!(matches!(result, Err(LockError::NotFound)));
        mgr.close().await;
    }

    #[tokio::test]
    async fn heartbeat_advances_last_updated_and_preserves_created_at() {
        let store = Arc::new(FakeLockStore::new());
        let mgr = manager(store, 0, config("owner-a"));
        let first = mgr.acquire("job-1", Vec::new(), &no_cancel()).await.unwrap();

        let result = mgr.heartbeat("job-1", None, &no_cancel()).await;
        assert!(result.is_ok());
        let renewed = mgr.inner.registry.get("job-1").await.unwrap();
        assert_eq!(renewed.created_at_ms, first.created_at_ms);
        assert_ne!(renewed.record_version, first.record_version);
        mgr.close().await;
    }

    #[tokio::test]
    async fn heartbeat_loses_race_after_another_process_steals() {
        let store = Arc::new(FakeLockStore::new());
        let mgr_a = manager(store.clone(), 0, config("owner-a"));
        mgr_a.acquire("job-1", Vec::new(), &no_cancel()).await.unwrap();

        let mgr_b = manager(store, 15_000, config("owner-b"));
        mgr_b.acquire("job-1", Vec::new(), &no_cancel()).await.unwrap();

        // A's heartbeat tick fires against a CAS token that is no longer current.
        let result = heartbeat_inner(&mgr_a.inner, "job-1", None, &no_cancel()).await;
        assert!(matches!(result, Err(LockError::Unavailable)));
        assert!(mgr_a.inner.registry.get("job-1").await.is_none());

        mgr_a.close().await;
        mgr_b.close().await;
    }

    #[tokio::test]
    async fn abandonment_evicts_without_remote_write() {
        let mut cfg = config("owner-a");
        cfg.abandonment_threshold_ms = 1_000;
        let store = Arc::new(FakeLockStore::new());
        let mgr = manager(store, 0, cfg);
        let record = mgr.acquire("job-1", Vec::new(), &no_cancel()).await.unwrap();

        mgr.inner.clock.advance(1_001);

        let result = heartbeat_inner(&mgr.inner, "job-1", None, &no_cancel()).await;
        assert!(matches!(result, Err(LockError::Abandoned)));
        assert!(mgr.inner.registry.get("job-1").await.is_none());

        // Remote record is untouched by abandonment.
        let remote = mgr.inner.store.get("job-1").await.unwrap().unwrap();
        assert_eq!(remote.record_version, record.record_version);
        mgr.close().await;
    }

    #[tokio::test]
    async fn release_deletes_remote_row_and_local_entry() {
        let store = Arc::new(FakeLockStore::new());
        let mgr = manager(store, 0, config("owner-a"));
        mgr.acquire("job-1", Vec::new(), &no_cancel()).await.unwrap();

        mgr.release("job-1", &no_cancel()).await.unwrap();
        assert!(mgr.inner.registry.get("job-1").await.is_none());
        assert!(mgr.inner.store.get("job-1").await.unwrap().is_none());

        let second = mgr.release("job-1", &no_cancel()).await;
        assert!(matches!(second, Err(LockError::NotFound)));
        mgr.close().await;
    }

    #[tokio::test]
    async fn empty_id_is_invalid() {
        let store = Arc::new(FakeLockStore::new());
        let mgr = manager(store, 0, config("owner-a"));
        let result = mgr.acquire("", Vec::new(), &no_cancel()).await;
        assert!(matches!(result, Err(LockError::Invalid(_))));
        mgr.close().await;
    }

    #[tokio::test]
    async fn oversize_payload_is_invalid() {
        let store = Arc::new(FakeLockStore::new());
        let mgr = manager(store, 0, config("owner-a"));
        let huge = vec![0u8; 2048];
        let result = mgr.acquire("job-1", huge, &no_cancel()).await;
        assert!(matches!(result, Err(LockError::Invalid(_))));
        mgr.close().await;
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_acquire() {
        let store = Arc::new(FakeLockStore::new());
        let mgr = manager(store, 0, config("owner-a"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = mgr.acquire("job-1", Vec::new(), &cancel).await;
        assert!(matches!(result, Err(LockError::Cancelled)));
        mgr.close().await;
    }

    #[test]
    fn expiry_predicate_boundary() {
        let record = LockRecord {
            lock_id: "job-1".into(),
            owner: "owner-a".into(),
            lease_duration_ms: 10_000,
            last_updated_ms: 0,
            created_at_ms: 0,
            record_version: "v1".into(),
            shard: 0,
            ttl_epoch_s: 100,
            payload: Vec::new(),
        };
        assert!(!is_expired(&record, 10_000));
        assert!(is_expired(&record, 10_001));
    }
}
