//! Queue coordinator: admission, execution, retries, and teardown
//!
//! A single logical coordinator drives many independently-progressing
//! operations. Admission decisions are serialized under one mutex held for
//! short critical sections and never across an await; each admitted
//! operation runs as its own tokio task and re-enters the coordinator when
//! it settles or when its retry backoff elapses.

use crate::batch::{BatchOperation, BatchOptions, BatchResult, SettledOutcome, merge_outcomes};
use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::events::{EventBus, EventHandler, EventKind, HandlerId, QueueEvent};
use crate::history::{HistoryEntry, HistoryStore};
use crate::queue::PendingQueue;
use crate::retry::{BackoffSchedule, DefaultClassifier, ErrorClassifier};
use crate::timeout;
use crate::types::{
    EnqueueOptions, Json, OperationFuture, OperationHandle, OperationId, OperationRecord,
    OperationWork, Priority, QueueStats,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Context passed to the failure sink alongside the classified error
#[derive(Debug, Clone, Serialize)]
pub struct FailureContext {
    /// Operation that failed terminally
    pub id: OperationId,
    /// Retry attempts consumed before giving up
    pub retry_count: u32,
    /// Caller metadata carried from enqueue
    pub metadata: Json,
}

/// Injected error-reporting collaborator
///
/// Receives every terminal failure with its classified error and context.
/// Retryable failures stay internal until the budget is exhausted.
pub trait FailureSink: Send + Sync {
    /// Report one terminal failure
    fn report(&self, error: &QueueError, context: &FailureContext);
}

/// Point-in-time snapshot returned by [`OperationQueue::status`]
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Operations waiting for admission
    pub queue_size: usize,
    /// Operations currently executing
    pub active_count: usize,
    /// Configured concurrency bound
    pub max_concurrent: usize,
    /// Aggregate counters
    pub stats: QueueStats,
    /// Most recent completed operations, newest first
    pub recent_completed: Vec<HistoryEntry>,
    /// Most recent failed operations, newest first
    pub recent_failed: Vec<HistoryEntry>,
}

/// Marker for an operation in the active set
#[derive(Debug)]
struct ActiveOperation {
    #[allow(dead_code)]
    priority: Priority,
    #[allow(dead_code)]
    started_at: DateTime<Utc>,
}

/// Mutable coordinator state; every field is guarded by one mutex so
/// admission decisions observe a consistent queue and active set
struct CoreState {
    pending: PendingQueue,
    active: HashMap<OperationId, ActiveOperation>,
    history: HistoryStore,
    stats: QueueStats,
    shutting_down: bool,
}

struct QueueInner {
    config: QueueConfig,
    backoff: BackoffSchedule,
    classifier: Arc<dyn ErrorClassifier>,
    failure_sink: Option<Arc<dyn FailureSink>>,
    events: EventBus,
    state: Mutex<CoreState>,
    /// Notified whenever an operation leaves the active set
    drained: Notify,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

/// Bounded-concurrency priority operation queue
///
/// Built by its owner and passed by reference (or clone; clones share the
/// same queue) to collaborators. Requires a tokio runtime.
#[derive(Clone)]
pub struct OperationQueue {
    inner: Arc<QueueInner>,
}

impl OperationQueue {
    /// Create a queue with the default classifier and no failure sink
    pub fn new(config: QueueConfig) -> Result<Self> {
        Self::with_components(config, Arc::new(DefaultClassifier), None)
    }

    /// Create a queue with injected collaborators
    pub fn with_components(
        config: QueueConfig,
        classifier: Arc<dyn ErrorClassifier>,
        failure_sink: Option<Arc<dyn FailureSink>>,
    ) -> Result<Self> {
        config.validate()?;
        let inner = Arc::new(QueueInner {
            backoff: BackoffSchedule::new(config.backoff_base, config.backoff_cap),
            state: Mutex::new(CoreState {
                pending: PendingQueue::new(),
                active: HashMap::new(),
                history: HistoryStore::new(config.max_history_size, config.max_history_age),
                stats: QueueStats::default(),
                shutting_down: false,
            }),
            classifier,
            failure_sink,
            events: EventBus::new(),
            drained: Notify::new(),
            cleanup_task: Mutex::new(None),
            config,
        });

        let cleanup = QueueInner::spawn_cleanup(&inner);
        *inner.cleanup_task.lock().unwrap() = Some(cleanup);

        Ok(Self { inner })
    }

    /// Submit one unit of work
    ///
    /// Returns a handle that settles exactly once: with the work's value,
    /// or with the terminal error after the retry budget is exhausted.
    pub fn enqueue(&self, work: OperationWork, options: EnqueueOptions) -> Result<OperationHandle> {
        options.validate()?;
        let (id, priority, handle) = {
            let mut state = self.inner.state.lock().unwrap();
            if state.shutting_down {
                return Err(QueueError::Shutdown);
            }
            let (record, handle) = OperationRecord::new(
                work,
                options,
                self.inner.config.default_timeout,
                self.inner.config.default_max_retries,
            );
            let id = record.id;
            let priority = record.priority;
            state.stats.record_queued();
            state.pending.push(record);
            (id, priority, handle)
        };
        debug!(%id, ?priority, "operation queued");
        self.inner
            .events
            .emit(&QueueEvent::OperationQueued { id, priority });
        QueueInner::schedule_pump(&self.inner);
        Ok(handle)
    }

    /// Submit a closure-shaped unit of work
    pub fn enqueue_fn<F, Fut>(&self, work: F, options: EnqueueOptions) -> Result<OperationHandle>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Json>> + Send + 'static,
    {
        let work: OperationWork = Arc::new(move || Box::pin(work()) as OperationFuture);
        self.enqueue(work, options)
    }

    /// Submit a group of operations and collect every settled outcome
    ///
    /// Parallel mode enqueues everything up front, still subject to the
    /// shared concurrency bound. Sequential mode awaits each operation's
    /// full settlement, including retries, before enqueuing the next. An
    /// individual failure becomes a rejected outcome and never aborts the
    /// batch; only structurally bad input fails the call.
    pub async fn execute_batch(
        &self,
        operations: Vec<BatchOperation>,
        options: BatchOptions,
    ) -> Result<BatchResult> {
        let batch_id = crate::types::BatchId::generate();
        if operations.is_empty() {
            let error = QueueError::validation("batch must contain at least one operation");
            self.inner.events.emit(&QueueEvent::BatchFailed {
                batch_id,
                error: error.to_string(),
            });
            return Err(error);
        }

        self.inner.events.emit(&QueueEvent::BatchStarted {
            batch_id,
            size: operations.len(),
            parallel: options.parallel,
        });

        let mut outcomes = Vec::with_capacity(operations.len());
        if options.parallel {
            let handles: Vec<Result<OperationHandle>> = operations
                .into_iter()
                .map(|op| self.enqueue(op.work, Self::batch_op_options(op.options, &options)))
                .collect();
            for handle in handles {
                outcomes.push(Self::settle_outcome(handle).await);
            }
        } else {
            for op in operations {
                let handle = self.enqueue(op.work, Self::batch_op_options(op.options, &options));
                outcomes.push(Self::settle_outcome(handle).await);
            }
        }

        let merged = options
            .merge_results
            .then(|| merge_outcomes(&outcomes, &options.merge_strategy));

        let result = BatchResult {
            batch_id,
            outcomes,
            merged,
        };
        self.inner.events.emit(&QueueEvent::BatchCompleted {
            batch_id,
            fulfilled: result.fulfilled(),
            rejected: result.rejected(),
        });
        Ok(result)
    }

    fn batch_op_options(mut op_options: EnqueueOptions, batch: &BatchOptions) -> EnqueueOptions {
        if let Some(priority) = batch.priority {
            op_options.priority = priority;
        }
        op_options
    }

    async fn settle_outcome(handle: Result<OperationHandle>) -> SettledOutcome {
        match handle {
            Ok(handle) => match handle.wait().await {
                Ok(value) => SettledOutcome::Fulfilled(value),
                Err(error) => SettledOutcome::Rejected(error),
            },
            Err(error) => SettledOutcome::Rejected(error),
        }
    }

    /// Cancel a still-queued operation
    ///
    /// Returns `false` for unknown or already-admitted operations; active
    /// work always runs to natural completion.
    pub fn cancel(&self, id: OperationId) -> bool {
        let removed = {
            let mut state = self.inner.state.lock().unwrap();
            let removed = state.pending.remove(id);
            if removed.is_some() {
                state.stats.record_cancelled();
            }
            removed
        };
        match removed {
            Some(mut record) => {
                debug!(%id, "operation cancelled before admission");
                record.settle(Err(QueueError::Cancelled));
                true
            }
            None => false,
        }
    }

    /// Reject and drop every queued operation
    pub fn clear(&self) {
        let drained = {
            let mut state = self.inner.state.lock().unwrap();
            let drained = state.pending.drain();
            for _ in &drained {
                state.stats.record_cancelled();
            }
            drained
        };
        let dropped = drained.len();
        for mut record in drained {
            record.settle(Err(QueueError::Cancelled));
        }
        info!(dropped, "queue cleared");
        self.inner
            .events
            .emit(&QueueEvent::QueueCleared { dropped });
    }

    /// Snapshot of queue state, counters, and recent history
    pub fn status(&self) -> QueueStatus {
        const RECENT_LIMIT: usize = 10;
        let state = self.inner.state.lock().unwrap();
        QueueStatus {
            queue_size: state.pending.len(),
            active_count: state.active.len(),
            max_concurrent: self.inner.config.max_concurrent,
            stats: state.stats.clone(),
            recent_completed: state.history.recent_completed(RECENT_LIMIT),
            recent_failed: state.history.recent_failed(RECENT_LIMIT),
        }
    }

    /// Register a lifecycle event handler
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> HandlerId {
        self.inner.events.subscribe(kind, handler)
    }

    /// Remove a lifecycle event handler
    pub fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool {
        self.inner.events.unsubscribe(kind, id)
    }

    /// Shut the queue down
    ///
    /// Stops admitting work, rejects everything still queued with
    /// [`QueueError::Shutdown`], stops the history cleanup task, and waits
    /// up to the configured grace period for in-flight operations to drain.
    /// Operations sleeping out a retry backoff are rejected when their timer
    /// fires; their handles still settle exactly once.
    pub async fn shutdown(&self) {
        let rejected = {
            let mut state = self.inner.state.lock().unwrap();
            if state.shutting_down {
                Vec::new()
            } else {
                state.shutting_down = true;
                state.pending.drain()
            }
        };
        info!(rejected = rejected.len(), "queue shutting down");
        for mut record in rejected {
            record.settle(Err(QueueError::Shutdown));
        }

        if let Some(handle) = self.inner.cleanup_task.lock().unwrap().take() {
            handle.abort();
        }

        let drain = async {
            loop {
                // Register before checking so a settle between the check and
                // the await cannot be missed
                let mut notified = std::pin::pin!(self.inner.drained.notified());
                notified.as_mut().enable();
                if self.inner.state.lock().unwrap().active.is_empty() {
                    break;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(self.inner.config.shutdown_grace, drain)
            .await
            .is_err()
        {
            warn!(
                grace = ?self.inner.config.shutdown_grace,
                "shutdown grace elapsed with operations still in flight"
            );
        }

        self.inner.events.clear();
    }
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock().unwrap();
        f.debug_struct("OperationQueue")
            .field("queue_size", &state.pending.len())
            .field("active_count", &state.active.len())
            .field("max_concurrent", &self.inner.config.max_concurrent)
            .finish()
    }
}

impl QueueInner {
    /// Run admission on the next scheduler tick
    ///
    /// Deferring to a spawned task keeps `enqueue` cheap and lets a burst of
    /// enqueues land in the pending queue before tiers are compared.
    fn schedule_pump(inner: &Arc<Self>) {
        let inner = inner.clone();
        tokio::spawn(async move {
            Self::pump(&inner);
        });
    }

    /// Admit operations while a slot and a pending operation exist
    fn pump(inner: &Arc<Self>) {
        loop {
            let record = {
                let mut state = inner.state.lock().unwrap();
                if state.shutting_down {
                    return;
                }
                if state.active.len() >= inner.config.max_concurrent {
                    return;
                }
                let Some(record) = state.pending.pop_next() else {
                    return;
                };
                state.active.insert(
                    record.id,
                    ActiveOperation {
                        priority: record.priority,
                        started_at: Utc::now(),
                    },
                );
                record
            };
            let attempt = record.retry_count + 1;
            debug!(id = %record.id, attempt, "operation admitted");
            inner.events.emit(&QueueEvent::OperationStarted {
                id: record.id,
                attempt,
            });
            let task_inner = inner.clone();
            tokio::spawn(async move {
                Self::run_operation(task_inner, record).await;
            });
        }
    }

    /// Execute one attempt and route its settlement
    async fn run_operation(inner: Arc<Self>, mut record: OperationRecord) {
        let started = Instant::now();
        let attempt = (record.work)();
        let outcome = timeout::guard(attempt, record.timeout).await;
        let execution_time_ms = started.elapsed().as_millis() as u64;

        {
            let mut state = inner.state.lock().unwrap();
            state.active.remove(&record.id);
        }
        inner.drained.notify_waiters();

        match outcome {
            Ok(value) => {
                {
                    let mut state = inner.state.lock().unwrap();
                    state.stats.record_completion(execution_time_ms);
                    state.history.record_completed(
                        record.id,
                        value.clone(),
                        execution_time_ms,
                        record.retry_count,
                        record.metadata.clone(),
                    );
                }
                debug!(id = %record.id, execution_time_ms, "operation completed");
                inner.events.emit(&QueueEvent::OperationCompleted {
                    id: record.id,
                    execution_time_ms,
                });
                record.settle(Ok(value));
            }
            Err(failure) => {
                let retryable = inner.classifier.is_retryable(&failure);
                if retryable && record.can_retry() {
                    Self::schedule_retry(&inner, record, &failure);
                } else {
                    Self::fail_terminally(&inner, record, failure, execution_time_ms);
                }
            }
        }

        Self::pump(&inner);
    }

    /// Re-insert a retryable failure into its original tier after backoff
    fn schedule_retry(inner: &Arc<Self>, mut record: OperationRecord, failure: &QueueError) {
        record.retry_count += 1;
        let attempt = record.retry_count;
        let delay = inner.backoff.delay_for(attempt);
        {
            let mut state = inner.state.lock().unwrap();
            state.stats.record_retry();
        }
        warn!(
            id = %record.id,
            attempt,
            ?delay,
            %failure,
            "operation failed, retry scheduled"
        );
        inner.events.emit(&QueueEvent::OperationRetry {
            id: record.id,
            attempt,
            delay,
        });
        let timer_inner = inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            Self::requeue(timer_inner, record);
        });
    }

    /// Put a backed-off operation back into the pending queue
    ///
    /// A queue that began shutting down while the backoff timer slept
    /// rejects the operation instead.
    fn requeue(inner: Arc<Self>, mut record: OperationRecord) {
        {
            let mut state = inner.state.lock().unwrap();
            if !state.shutting_down {
                state.pending.push(record);
                drop(state);
                Self::pump(&inner);
                return;
            }
        }
        record.settle(Err(QueueError::Shutdown));
    }

    /// Terminal failure: history, stats, sink, event, settle-reject
    fn fail_terminally(
        inner: &Arc<Self>,
        mut record: OperationRecord,
        failure: QueueError,
        execution_time_ms: u64,
    ) {
        {
            let mut state = inner.state.lock().unwrap();
            state.stats.record_failure();
            state.history.record_failed(
                record.id,
                &failure,
                execution_time_ms,
                record.retry_count,
                record.metadata.clone(),
            );
        }
        error!(
            id = %record.id,
            category = failure.category(),
            %failure,
            "operation failed terminally"
        );
        if let Some(sink) = &inner.failure_sink {
            let context = FailureContext {
                id: record.id,
                retry_count: record.retry_count,
                metadata: record.metadata.clone(),
            };
            sink.report(&failure, &context);
        }
        inner.events.emit(&QueueEvent::OperationFailed {
            id: record.id,
            error: failure.to_string(),
            category: failure.category().to_string(),
        });
        record.settle(Err(failure));
    }

    /// Background task evicting aged and over-cap history entries
    fn spawn_cleanup(inner: &Arc<Self>) -> JoinHandle<()> {
        let inner = inner.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.config.cleanup_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let evicted = {
                    let mut state = inner.state.lock().unwrap();
                    state.history.cleanup(Utc::now())
                };
                if evicted > 0 {
                    debug!(evicted, "history cleanup evicted entries");
                }
            }
        })
    }
}
