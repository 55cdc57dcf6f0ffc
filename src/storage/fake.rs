//! In-memory stand-in for [`LockStore`], used by the manager's own tests so
//! CAS races and steal timing can be exercised deterministically without a
//! live DynamoDB endpoint. Grounded on the teacher's `tests/mock_server.rs`
//! stand-in pattern, generalized to the storage-adapter trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::lock_manager::LockRecord;
use crate::errors::{LockError, Result};
use crate::storage::{CasPut, LockStore};

#[derive(Default)]
pub struct FakeLockStore {
    rows: Mutex<HashMap<String, LockRecord>>,
}

impl FakeLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for FakeLockStore {
    async fn get(&self, lock_id: &str) -> Result<Option<LockRecord>> {
        Ok(self.rows.lock().unwrap().get(lock_id).cloned())
    }

    async fn put_if_absent(&self, record: &LockRecord) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&record.lock_id) {
            return Err(LockError::PreconditionFailed);
        }
        rows.insert(record.lock_id.clone(), record.clone());
        Ok(())
    }

    async fn put_cas(&self, put: CasPut<'_>) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let Some(existing) = rows.get(&put.record.lock_id) else {
            return Err(LockError::PreconditionFailed);
        };

        let version_matches = existing.record_version == put.expected_version;
        let same_owner = existing.owner == put.expected_owner;
        let expired_for_steal = existing.owner != put.expected_owner
            && existing.last_updated_ms < put.steal_before_ms;

        if version_matches && (same_owner || expired_for_steal) {
            rows.insert(put.record.lock_id.clone(), put.record.clone());
            Ok(())
        } else {
            Err(LockError::PreconditionFailed)
        }
    }

    async fn delete_cas(&self, lock_id: &str, expected_owner: &str, expected_version: &str) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get(lock_id) {
            Some(existing)
                if existing.owner == expected_owner && existing.record_version == expected_version =>
            {
                rows.remove(lock_id);
                Ok(())
            }
            Some(_) => Err(LockError::PreconditionFailed),
            None => Err(LockError::PreconditionFailed),
        }
    }
}
