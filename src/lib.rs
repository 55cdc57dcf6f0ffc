//! Lockkeeper - Distributed Advisory Lock Service
//!
//! A lease-based distributed mutual-exclusion service backed by a
//! conditional-write key-value store. Callers acquire a lock by name,
//! renew it with periodic heartbeats, and release it when done; an
//! abandoned or crashed holder's lease is automatically stolen by the
//! next contender once it expires.
//!
//! # Quick Start
//!
//! ```no_run
//! use lockkeeper::clock::SystemClock;
//! use lockkeeper::config::{DynamoDbConfig, LockManagerConfig};
//! use lockkeeper::core::LockManager;
//! use lockkeeper::storage::dynamodb::DynamoLockStore;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DynamoLockStore::new(&DynamoDbConfig::default()).await;
//!     let manager = LockManager::new(store, SystemClock, LockManagerConfig::default(), None);
//!     let cancel = CancellationToken::new();
//!     let record = manager.acquire("job-42", Vec::new(), &cancel).await?;
//!     println!("acquired {} as {}", record.lock_id, record.owner);
//!     manager.release("job-42", &cancel).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod clock;
pub mod config;
pub mod core;
pub mod errors;
pub mod metrics;
pub mod registry;
pub mod shell;
pub mod storage;

pub use errors::{LockError, Result};
