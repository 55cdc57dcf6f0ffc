//! Storage Adapter.
//!
//! Encodes/decodes a `LockRecord` to and from the backing key-value table and
//! translates conditional-write failures into a typed `PreconditionFailed`
//! signal. The manager never talks to the backing store directly — it always
//! goes through a `LockStore` implementation, so tests can swap in an
//! in-memory fake (`storage::fake::FakeLockStore`) without a live DynamoDB
//! endpoint.

pub mod dynamodb;
pub mod fake;

use async_trait::async_trait;

use crate::core::lock_manager::LockRecord;
use crate::errors::Result;

/// Parameters for a conditional update that either renews a lease held by
/// `expected_owner`, or steals one abandoned by a different owner — the
/// single predicate spec.md §4.3 specifies for both renewals and steals:
///
/// ```text
/// record_version == expected_version
/// AND ( owner == expected_owner
///       OR ( owner != expected_owner AND last_updated_ms < steal_before_ms ) )
/// ```
pub struct CasPut<'a> {
    /// The new record to write on success.
    pub record: &'a LockRecord,
    /// The `record_version` that must currently be stored under this id.
    pub expected_version: &'a str,
    /// The owner that may renew unconditionally (the current owner's belief).
    pub expected_owner: &'a str,
    /// A different owner may steal only if the stored `last_updated_ms` is
    /// strictly less than this value (i.e. the lease has expired).
    pub steal_before_ms: i64,
}

/// Storage adapter contract. All reads MUST request strong consistency.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Strongly-consistent read of the current record, if any.
    async fn get(&self, lock_id: &str) -> Result<Option<LockRecord>>;

    /// Conditional create: succeeds only if no row exists for `record.lock_id`.
    /// Returns `Err(LockError::PreconditionFailed)` if a row already exists.
    async fn put_if_absent(&self, record: &LockRecord) -> Result<()>;

    /// Conditional update implementing the renew-or-steal predicate above.
    /// Returns `Err(LockError::PreconditionFailed)` if the predicate is not met.
    async fn put_cas(&self, put: CasPut<'_>) -> Result<()>;

    /// Conditional delete: succeeds only if the row's `owner` and
    /// `record_version` both still match. Returns
    /// `Err(LockError::PreconditionFailed)` otherwise.
    async fn delete_cas(&self, lock_id: &str, expected_owner: &str, expected_version: &str) -> Result<()>;
}

#[async_trait]
impl<T: LockStore + ?Sized> LockStore for std::sync::Arc<T> {
    async fn get(&self, lock_id: &str) -> Result<Option<LockRecord>> {
        T::get(self, lock_id).await
    }

    async fn put_if_absent(&self, record: &LockRecord) -> Result<()> {
        T::put_if_absent(self, record).await
    }

    async fn put_cas(&self, put: CasPut<'_>) -> Result<()> {
        T::put_cas(self, put).await
    }

    async fn delete_cas(&self, lock_id: &str, expected_owner: &str, expected_version: &str) -> Result<()> {
        T::delete_cas(self, lock_id, expected_owner, expected_version).await
    }
}
