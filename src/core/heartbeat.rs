//! Background heartbeat loop.
//!
//! Runs for the lifetime of a `LockManager`, renewing every lock the process
//! currently believes it holds on a fixed cadence. Failures are logged, not
//! propagated — the public `acquire`/`heartbeat`/`release` API is the only
//! place callers observe lease loss directly (spec.md §4.5).

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::core::lock_manager::{heartbeat_inner, Inner};
use crate::errors::LockError;
use crate::storage::LockStore;

pub(crate) fn spawn<S: LockStore + 'static, C: Clock + 'static>(
    inner: Arc<Inner<S, C>>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("heartbeat loop cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    run_once(&inner).await;
                }
            }
        }
    })
}

async fn run_once<S: LockStore, C: Clock>(inner: &Arc<Inner<S, C>>) {
    let ids = inner.registry.snapshot_ids().await;
    if ids.is_empty() {
        return;
    }

    let results = join_all(
        ids.iter()
            .map(|id| heartbeat_inner(inner, id, None, &inner.cancel)),
    )
    .await;

    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(()) => {}
            Err(LockError::Abandoned) => {
                tracing::warn!(lock_id = %id, "heartbeat abandoned lock past the hold-time threshold");
            }
            Err(LockError::Unavailable) => {
                tracing::debug!(lock_id = %id, "heartbeat lost the lease to another owner");
            }
            Err(LockError::Cancelled) => {
                tracing::debug!(lock_id = %id, "heartbeat tick cancelled mid-flight");
            }
            Err(e) => {
                tracing::error!(lock_id = %id, error = %e, "heartbeat failed");
            }
        }
    }
}
