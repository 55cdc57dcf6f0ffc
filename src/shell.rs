//! External Client Shell.
//!
//! Models the one piece of a consuming chat-bot/job-runner shell relevant to
//! this crate: acquire the lock guarding an event's identifier, hand the
//! event to a handler, then release. The transport the event arrived over and
//! whatever backend the handler ultimately calls are out of scope — only the
//! shape of the collaboration is modeled here, against an in-memory stub so
//! the crate is self-contained and testable without a real chat integration.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::core::LockManager;
use crate::errors::{LockError, Result};
use crate::storage::LockStore;

/// A unit of work arriving over whatever transport the shell fronts.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub payload: Vec<u8>,
}

/// Handles one event while its lock is held.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<()>;
}

/// Acquire the lock for `event.id`, hand the event to `handler`, then release
/// — releasing regardless of the handler's outcome. A contended lock is a
/// silent no-op; any other acquire failure is logged and returned.
///
/// `cancel` is the cancellation-capable context spec.md §4.1 requires every
/// operation to accept; the shell forwards the same one to both calls.
pub async fn dispatch<S, C, H>(
    manager: &LockManager<S, C>,
    handler: &H,
    event: Event,
    cancel: &CancellationToken,
) -> Result<()>
where
    S: LockStore + 'static,
    C: Clock + 'static,
    H: EventHandler,
{
    match manager.acquire(&event.id, event.payload.clone(), cancel).await {
        Ok(_) => {}
        Err(LockError::Unavailable) => {
            tracing::debug!(event_id = %event.id, "lock unavailable, skipping event");
            return Ok(());
        }
        Err(e) => {
            tracing::error!(event_id = %event.id, error = %e, "failed to acquire lock for event");
            return Err(e);
        }
    }

    let handler_result = handler.handle(&event).await;

    if let Err(e) = manager.release(&event.id, cancel).await {
        tracing::error!(event_id = %event.id, error = %e, "failed to release lock after handling event");
    }

    handler_result
}

/// In-memory stand-ins for the transport and handler, used only so
/// `dispatch` can be exercised by tests and the demo binary.
pub mod stub {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory queue of events, standing in for whatever transport a
    /// real shell would poll.
    #[derive(Default)]
    pub struct StubEventSource {
        events: Mutex<Vec<Event>>,
    }

    impl StubEventSource {
        pub fn new(events: Vec<Event>) -> Self {
            Self {
                events: Mutex::new(events),
            }
        }

        pub fn next(&self) -> Option<Event> {
            self.events.lock().unwrap().pop()
        }
    }

    /// A handler that records the ids it was asked to process.
    #[derive(Default)]
    pub struct RecordingHandler {
        pub handled: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: &Event) -> Result<()> {
            self.handled.lock().unwrap().push(event.id.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::RecordingHandler;
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::LockManagerConfig;
    use crate::storage::fake::FakeLockStore;
    use std::sync::Arc;

    fn manager() -> LockManager<Arc<FakeLockStore>, FixedClock> {
        let cfg = LockManagerConfig {
            owner: "shell-owner".to_string(),
            max_shards: 1,
            lease_duration_s: 10,
            heartbeat_interval_s: 3,
            abandonment_threshold_ms: 60_000,
            max_payload_bytes: 1024,
        };
        LockManager::new(Arc::new(FakeLockStore::new()), FixedClock::new(0), cfg, None)
    }

    #[tokio::test]
    async fn dispatch_acquires_handles_and_releases() {
        let mgr = manager();
        let handler = RecordingHandler::default();
        let event = Event {
            id: "job-1".to_string(),
            payload: Vec::new(),
        };

        dispatch(&mgr, &handler, event, &CancellationToken::new()).await.unwrap();

        assert_eq!(handler.handled.lock().unwrap().as_slice(), ["job-1"]);
        assert_eq!(mgr.held_count().await, 0);
        mgr.close().await;
    }

    #[tokio::test]
    async fn dispatch_is_silent_no_op_when_contended() {
        let mgr = manager();
        mgr.acquire("job-1", Vec::new(), &CancellationToken::new()).await.unwrap();

        let handler = RecordingHandler::default();
        let event = Event {
            id: "job-1".to_string(),
            payload: Vec::new(),
        };

        let result = dispatch(&mgr, &handler, event, &CancellationToken::new()).await;
        assert!(result.is_ok());
        assert!(handler.handled.lock().unwrap().is_empty());
        mgr.close().await;
    }
}
