//! Local Lock Registry.
//!
//! A process-wide mapping from lock id to the most recently observed record
//! the process believes it owns. This is a belief, not a truth: any operation
//! may discover the backing store disagrees and must evict the local entry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::core::lock_manager::LockRecord;

/// Guards a `HashMap<lock_id, LockRecord>` with a single read/write lock.
/// Per spec.md §9: a hash map guarded by one lock suffices at expected fleet
/// sizes; finer-grained per-id locking is unnecessary and would obscure the
/// abandonment sweep.
#[derive(Clone, Default)]
pub struct LockRegistry {
    entries: Arc<RwLock<HashMap<String, LockRecord>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the belief for `lock_id`.
    pub async fn insert(&self, lock_id: String, record: LockRecord) {
        let mut guard = self.entries.write().await;
        guard.insert(lock_id, record);
    }

    /// Remove any belief held for `lock_id`.
    pub async fn evict(&self, lock_id: &str) -> Option<LockRecord> {
        let mut guard = self.entries.write().await;
        guard.remove(lock_id)
    }

    /// Look up the belief held for `lock_id`, if any.
    pub async fn get(&self, lock_id: &str) -> Option<LockRecord> {
        let guard = self.entries.read().await;
        guard.get(lock_id).cloned()
    }

    /// Snapshot the set of ids currently believed held, releasing the lock
    /// before returning so the heartbeat loop never holds it across remote I/O.
    pub async fn snapshot_ids(&self) -> Vec<String> {
        let guard = self.entries.read().await;
        guard.keys().cloned().collect()
    }

    /// Number of locks currently believed held by this process.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lock_manager::LockRecord;

    fn sample(lock_id: &str) -> LockRecord {
        LockRecord {
            lock_id: lock_id.to_string(),
            owner: "owner-a".to_string(),
            lease_duration_ms: 10_000,
            last_updated_ms: 0,
            created_at_ms: 0,
            record_version: "v1".to_string(),
            shard: 0,
            ttl_epoch_s: 100,
            payload: Vec::new(),
        }
    }

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let registry = LockRegistry::new();
        registry.insert("job-1".to_string(), sample("job-1")).await;
        let found = registry.get("job-1").await.expect("entry should exist");
        assert_eq!(found.record_version, "v1");
    }

    #[tokio::test]
    async fn evict_removes_entry() {
        let registry = LockRegistry::new();
        registry.insert("job-1".to_string(), sample("job-1")).await;
        let evicted = registry.evict("job-1").await;
        assert!(evicted.is_some());
        assert!(registry.get("job-1").await.is_none());
    }

    #[tokio::test]
    async fn snapshot_reflects_current_entries() {
        let registry = LockRegistry::new();
        registry.insert("a".to_string(), sample("a")).await;
        registry.insert("b".to_string(), sample("b")).await;
        let mut ids = registry.snapshot_ids().await;
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
