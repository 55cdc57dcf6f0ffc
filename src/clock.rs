//! Clock & Identifier Source.
//!
//! Wall-clock milliseconds for lease math, and a time-ordered unique version
//! identifier generator. Implementations may, but are not required to, apply
//! a monotonic adjustment layer; the system tolerates modest clock skew by
//! making `lease_duration_ms` generous relative to it.

use uuid::Uuid;

/// Source of wall-clock time, abstracted so tests can control it.
pub trait Clock: Send + Sync {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Production clock backed by `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Returns a globally unique, time-ordered version identifier.
///
/// A v7 UUID is used so operator scans of the backing table sort roughly
/// chronologically; uniqueness under concurrent creation across the fleet is
/// the only hard requirement.
pub fn new_version_id() -> String {
    Uuid::now_v7().to_string()
}

/// A fixed clock for deterministic expiry/abandonment boundary tests.
///
/// Not gated behind `#[cfg(test)]` so integration tests under `tests/` (which
/// compile this crate as an ordinary dependency) can use it too.
pub struct FixedClock(pub std::sync::atomic::AtomicI64);

impl FixedClock {
    pub fn new(now_ms: i64) -> Self {
        Self(std::sync::atomic::AtomicI64::new(now_ms))
    }

    pub fn advance(&self, delta_ms: i64) {
        self.0
            .fetch_add(delta_ms, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now_ms(&self) -> i64 {
        T::now_ms(self)
    }
}
