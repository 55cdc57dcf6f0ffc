//! Error types and handling for the lock service.
//!
//! This module defines the custom error type used throughout the crate
//! for consistent error handling and reporting.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LockError>;

/// Error kinds surfaced by the lock manager and its collaborators.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another holder has a live lease, or a conditional write lost a race.
    #[error("lock unavailable")]
    Unavailable,

    /// The operation referred to a lock this process does not believe it holds.
    #[error("lock not found in local registry")]
    NotFound,

    /// The local holder exceeded the abandonment threshold.
    #[error("lock abandoned after exceeding the hold threshold")]
    Abandoned,

    /// Any non-precondition backing-store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Malformed arguments or a configuration violation.
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// `release`'s conditional delete failed after the local entry was evicted.
    #[error("release failed: {0}")]
    ReleaseFailed(String),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal adapter signal: a conditional write's precondition was not met.
    /// Never surfaced past `storage::LockStore` — the manager translates it into
    /// `Unavailable`, `NotFound`, or a silent steal-retry depending on context.
    #[error("precondition failed")]
    PreconditionFailed,
}
