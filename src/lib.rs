//! # opqueue
//!
//! Bounded-concurrency priority operation queue.
//!
//! A single-process coordinator that accepts asynchronous units of work,
//! admits a limited number concurrently, enforces per-attempt timeouts,
//! retries transient failures with exponential backoff, and exposes batch
//! execution with settle-all semantics.
//!
//! ## Key Components
//!
//! - **OperationQueue**: the coordinator; admission, execution, teardown
//! - **PendingQueue**: tier + FIFO ordered holding area (internal)
//! - **ErrorClassifier / BackoffSchedule**: pluggable retry policy
//! - **HistoryStore**: bounded diagnostics of settled operations
//! - **EventBus**: lifecycle notifications
//! - **Batch types**: joint submission with one settled outcome per operation
//!
//! ## Usage
//!
//! ```rust
//! use opqueue::{EnqueueOptions, OperationQueue, Priority, QueueConfig};
//!
//! # async fn example() -> opqueue::Result<()> {
//! let queue = OperationQueue::new(QueueConfig::default())?;
//!
//! let handle = queue.enqueue_fn(
//!     || async { Ok(serde_json::json!({"saved": true})) },
//!     EnqueueOptions::default().priority(Priority::High),
//! )?;
//!
//! let result = handle.wait().await?;
//! assert_eq!(result["saved"], true);
//!
//! queue.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod manager;
pub mod retry;
pub mod types;

mod queue;
mod timeout;

// Re-export the public API
pub use batch::{
    BatchOperation, BatchOptions, BatchResult, CustomMerger, MergeStrategy, SettledOutcome,
};
pub use config::QueueConfig;
pub use error::{QueueError, Result};
pub use events::{EventBus, EventHandler, EventKind, HandlerId, QueueEvent};
pub use history::{HistoryEntry, HistoryOutcome};
pub use manager::{FailureContext, FailureSink, OperationQueue, QueueStatus};
pub use retry::{BackoffSchedule, DefaultClassifier, ErrorClassifier};
pub use types::{
    BatchId, EnqueueOptions, Json, OperationFuture, OperationHandle, OperationId, OperationWork,
    Priority, QueueStats,
};

/// Common type aliases for convenience
pub type DateTime = chrono::DateTime<chrono::Utc>;
pub type Duration = std::time::Duration;
