//! Core types for the operation queue
//!
//! Defines operation identifiers, priorities, enqueue options, the internal
//! operation record, and the caller-facing settle handle.

use crate::error::{QueueError, Result};
use chrono::{DateTime, Utc};
use derive_setters::Setters;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// JSON value produced by an operation
pub type Json = serde_json::Value;

/// Future returned by one invocation of an operation's work
pub type OperationFuture = BoxFuture<'static, Result<Json>>;

/// Caller-supplied unit of work; invoked once per attempt
pub type OperationWork = Arc<dyn Fn() -> OperationFuture + Send + Sync>;

/// Unique identifier for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(uuid::Uuid);

impl OperationId {
    /// Generate a new unique operation identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op_{}", self.0)
    }
}

/// Unique identifier for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(uuid::Uuid);

impl BatchId {
    /// Generate a new unique batch identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch_{}", self.0)
    }
}

/// Priority tiers for queued operations
///
/// Ordering is admission order: `High` sorts before `Normal`, which sorts
/// before `Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Admitted before all other tiers
    High,
    /// Default tier
    #[default]
    Normal,
    /// Background work, admitted last
    Low,
}

/// Options accepted by `enqueue`
///
/// `timeout` and `max_retries` fall back to the queue's configured defaults
/// when left unset.
#[derive(Debug, Clone, Default, Setters)]
#[setters(strip_option, into)]
pub struct EnqueueOptions {
    /// Priority tier
    pub priority: Priority,
    /// Per-attempt execution timeout
    pub timeout: Option<Duration>,
    /// Maximum retry attempts after the first failure
    pub max_retries: Option<u32>,
    /// Opaque caller payload, carried into history entries
    pub metadata: Option<Json>,
}

impl EnqueueOptions {
    /// Validate the options; bad options are never retried
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(QueueError::validation("timeout must be non-zero"));
        }
        Ok(())
    }
}

/// One unit of work plus its retry and scheduling state
pub(crate) struct OperationRecord {
    pub id: OperationId,
    pub priority: Priority,
    pub work: OperationWork,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_count: u32,
    pub enqueued_at: DateTime<Utc>,
    pub metadata: Json,
    /// Settle handle; taken exactly once when the operation reaches a
    /// terminal state
    pub settle_tx: Option<oneshot::Sender<Result<Json>>>,
}

impl OperationRecord {
    pub fn new(
        work: OperationWork,
        options: EnqueueOptions,
        default_timeout: Duration,
        default_max_retries: u32,
    ) -> (Self, OperationHandle) {
        let id = OperationId::generate();
        let (tx, rx) = oneshot::channel();
        let record = Self {
            id,
            priority: options.priority,
            work,
            timeout: options.timeout.unwrap_or(default_timeout),
            max_retries: options.max_retries.unwrap_or(default_max_retries),
            retry_count: 0,
            enqueued_at: Utc::now(),
            metadata: options.metadata.unwrap_or(Json::Null),
            settle_tx: Some(tx),
        };
        (record, OperationHandle { id, rx })
    }

    /// Check whether the retry budget allows another attempt
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Resolve or reject the caller's handle; a dropped receiver is fine
    pub fn settle(&mut self, outcome: Result<Json>) {
        if let Some(tx) = self.settle_tx.take() {
            let _ = tx.send(outcome);
        }
    }
}

impl fmt::Debug for OperationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRecord")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Caller-facing handle to an enqueued operation
///
/// Await [`OperationHandle::wait`] for the operation's single definitive
/// settle. Dropping the handle does not cancel the operation.
#[derive(Debug)]
pub struct OperationHandle {
    id: OperationId,
    rx: oneshot::Receiver<Result<Json>>,
}

impl OperationHandle {
    /// Identifier of the underlying operation, usable with `cancel`
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Wait for the operation to settle
    pub async fn wait(self) -> Result<Json> {
        self.rx.await.unwrap_or(Err(QueueError::Shutdown))
    }
}

/// Aggregate counters for the queue
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Operations accepted by `enqueue`
    pub total_queued: u64,
    /// Operations that settled successfully
    pub total_completed: u64,
    /// Operations that settled with a terminal failure
    pub total_failed: u64,
    /// Retry attempts scheduled
    pub total_retried: u64,
    /// Operations cancelled before admission
    pub total_cancelled: u64,
    /// Running average execution time of completed operations
    pub avg_execution_time_ms: f64,
}

impl QueueStats {
    /// Record an accepted operation
    pub fn record_queued(&mut self) {
        self.total_queued += 1;
    }

    /// Record a successful settle and fold its execution time into the
    /// running average
    pub fn record_completion(&mut self, execution_time_ms: u64) {
        self.total_completed += 1;
        let total =
            self.avg_execution_time_ms * (self.total_completed - 1) as f64;
        self.avg_execution_time_ms =
            (total + execution_time_ms as f64) / self.total_completed as f64;
    }

    /// Record a terminal failure
    pub fn record_failure(&mut self) {
        self.total_failed += 1;
    }

    /// Record a scheduled retry
    pub fn record_retry(&mut self) {
        self.total_retried += 1;
    }

    /// Record a pre-admission cancellation
    pub fn record_cancelled(&mut self) {
        self.total_cancelled += 1;
    }
}
