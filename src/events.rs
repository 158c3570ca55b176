//! Lifecycle event notifications
//!
//! Observability side-channel for queue activity. The caller-facing handle
//! stays authoritative for settle outcomes; events never carry settle
//! responsibility. A failing handler is logged and skipped so it can neither
//! stop the remaining handlers nor crash the coordinator.

use crate::error::Result;
use crate::types::{BatchId, Json, OperationId, Priority};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Kinds of lifecycle events, used as subscription keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OperationQueued,
    OperationStarted,
    OperationRetry,
    OperationCompleted,
    OperationFailed,
    QueueCleared,
    BatchStarted,
    BatchCompleted,
    BatchFailed,
}

/// A lifecycle notification emitted by the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// Operation accepted and inserted into the pending queue
    OperationQueued { id: OperationId, priority: Priority },
    /// Operation admitted into the active set
    OperationStarted { id: OperationId, attempt: u32 },
    /// Retryable failure; the operation re-enters its tier after the delay
    OperationRetry {
        id: OperationId,
        attempt: u32,
        delay: Duration,
    },
    /// Operation settled successfully
    OperationCompleted {
        id: OperationId,
        execution_time_ms: u64,
    },
    /// Operation settled with a terminal failure
    OperationFailed {
        id: OperationId,
        error: String,
        category: String,
    },
    /// All queued operations were rejected and dropped
    QueueCleared { dropped: usize },
    /// Batch submission began
    BatchStarted {
        batch_id: BatchId,
        size: usize,
        parallel: bool,
    },
    /// Batch collected all settled outcomes
    BatchCompleted {
        batch_id: BatchId,
        fulfilled: usize,
        rejected: usize,
    },
    /// Batch aborted on structurally bad input
    BatchFailed { batch_id: BatchId, error: String },
}

impl QueueEvent {
    /// Subscription key for this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::OperationQueued { .. } => EventKind::OperationQueued,
            Self::OperationStarted { .. } => EventKind::OperationStarted,
            Self::OperationRetry { .. } => EventKind::OperationRetry,
            Self::OperationCompleted { .. } => EventKind::OperationCompleted,
            Self::OperationFailed { .. } => EventKind::OperationFailed,
            Self::QueueCleared { .. } => EventKind::QueueCleared,
            Self::BatchStarted { .. } => EventKind::BatchStarted,
            Self::BatchCompleted { .. } => EventKind::BatchCompleted,
            Self::BatchFailed { .. } => EventKind::BatchFailed,
        }
    }
}

/// Handler invoked for subscribed lifecycle events
pub trait EventHandler: Send + Sync {
    /// Handle one event; an `Err` is logged and does not affect other
    /// handlers
    fn handle(&self, event: &QueueEvent) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&QueueEvent) -> Result<()> + Send + Sync,
{
    fn handle(&self, event: &QueueEvent) -> Result<()> {
        self(event)
    }
}

/// Token identifying one subscription, used for unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Subscribe/emit hub for queue lifecycle events
pub struct EventBus {
    handlers: Mutex<HashMap<EventKind, Vec<(HandlerId, Arc<dyn EventHandler>)>>>,
    next_id: Mutex<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Register a handler for one event kind
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> HandlerId {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            HandlerId(*next)
        };
        self.handlers
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a previously registered handler; returns whether it was found
    pub fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock().unwrap();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(hid, _)| *hid != id);
        before != list.len()
    }

    /// Deliver an event to every handler subscribed to its kind
    ///
    /// Handlers run outside the registry lock, so a handler may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: &QueueEvent) {
        let subscribed: Vec<(HandlerId, Arc<dyn EventHandler>)> = {
            let handlers = self.handlers.lock().unwrap();
            handlers.get(&event.kind()).cloned().unwrap_or_default()
        };
        for (id, handler) in subscribed {
            if let Err(error) = handler.handle(event) {
                warn!(?id, kind = ?event.kind(), %error, "event handler failed");
            }
        }
    }

    /// Drop all subscriptions
    pub fn clear(&self) {
        self.handlers.lock().unwrap().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count: usize = self
            .handlers
            .lock()
            .unwrap()
            .values()
            .map(|list| list.len())
            .sum();
        f.debug_struct("EventBus").field("handlers", &count).finish()
    }
}

/// Serializable payload helper for handlers that forward events as JSON
pub fn event_to_json(event: &QueueEvent) -> Json {
    serde_json::to_value(event).unwrap_or(Json::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixture_event() -> QueueEvent {
        QueueEvent::OperationQueued {
            id: OperationId::generate(),
            priority: Priority::Normal,
        }
    }

    fn handler<F>(f: F) -> Arc<dyn EventHandler>
    where
        F: Fn(&QueueEvent) -> Result<()> + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    #[test]
    fn test_subscribe_and_emit() {
        let fixture = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        fixture.subscribe(
            EventKind::OperationQueued,
            handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        fixture.emit(&fixture_event());
        fixture.emit(&fixture_event());

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_emit_only_reaches_matching_kind() {
        let fixture = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        fixture.subscribe(
            EventKind::OperationCompleted,
            handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        fixture.emit(&fixture_event());

        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let fixture = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let id = fixture.subscribe(
            EventKind::OperationQueued,
            handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        assert!(fixture.unsubscribe(EventKind::OperationQueued, id));
        fixture.emit(&fixture_event());

        assert_eq!(seen.load(Ordering::SeqCst), 0);
        // Second unsubscribe finds nothing
        assert!(!fixture.unsubscribe(EventKind::OperationQueued, id));
    }

    #[test]
    fn test_failing_handler_does_not_stop_others() {
        let fixture = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        fixture.subscribe(
            EventKind::OperationQueued,
            handler(|_| Err(QueueError::terminal("handler broke"))),
        );
        fixture.subscribe(
            EventKind::OperationQueued,
            handler(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        fixture.emit(&fixture_event());

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_subscribe_during_emit() {
        let fixture = Arc::new(EventBus::new());
        let bus = fixture.clone();

        fixture.subscribe(
            EventKind::OperationQueued,
            handler(move |_| {
                bus.subscribe(EventKind::OperationCompleted, handler(|_| Ok(())));
                Ok(())
            }),
        );

        // Must not deadlock
        fixture.emit(&fixture_event());
    }

    #[test]
    fn test_event_kind_mapping() {
        let fixture = QueueEvent::QueueCleared { dropped: 3 };
        let actual = fixture.kind();
        let expected = EventKind::QueueCleared;
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_event_serialization() {
        let actual = event_to_json(&QueueEvent::QueueCleared { dropped: 1 });
        assert_eq!(actual["event"], "queue_cleared");
        assert_eq!(actual["dropped"], 1);
    }
}
