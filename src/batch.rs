//! Batch submission types and result merging
//!
//! A batch groups operations for joint submission and collects one settled
//! outcome per operation without short-circuiting on failure. The
//! coordinator logic lives on `OperationQueue::execute_batch`; this module
//! holds the caller-facing types and the optional result merging.

use crate::error::QueueError;
use crate::types::{BatchId, EnqueueOptions, Json, OperationWork, Priority};
use derive_setters::Setters;
use std::fmt;
use std::sync::Arc;

/// One operation inside a batch
pub struct BatchOperation {
    /// Work to execute
    pub work: OperationWork,
    /// Per-operation enqueue options
    pub options: EnqueueOptions,
}

impl BatchOperation {
    /// Create a batch operation with default options
    pub fn new(work: OperationWork) -> Self {
        Self {
            work,
            options: EnqueueOptions::default(),
        }
    }

    /// Create a batch operation with explicit options
    pub fn with_options(work: OperationWork, options: EnqueueOptions) -> Self {
        Self { work, options }
    }
}

impl fmt::Debug for BatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOperation")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Custom merger invoked over all settled outcomes
pub type CustomMerger = Arc<dyn Fn(&[SettledOutcome]) -> Json + Send + Sync>;

/// How fulfilled batch results are merged when merging is requested
#[derive(Clone, Default)]
pub enum MergeStrategy {
    /// Collect fulfilled values into a JSON array, in input order
    #[default]
    Array,
    /// Shallow-merge fulfilled JSON objects, later entries winning
    Object,
    /// Caller-supplied merger over all outcomes
    Custom(CustomMerger),
}

impl fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array => write!(f, "Array"),
            Self::Object => write!(f, "Object"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Options accepted by `execute_batch`
#[derive(Debug, Clone, Setters)]
#[setters(strip_option, into)]
pub struct BatchOptions {
    /// Priority applied to every operation in the batch; per-operation
    /// options win when both are set
    pub priority: Option<Priority>,
    /// Submit operations concurrently (default) or await each settlement
    /// before enqueuing the next
    pub parallel: bool,
    /// Produce a merged result alongside the per-operation outcomes
    pub merge_results: bool,
    /// Merge strategy used when `merge_results` is set
    pub merge_strategy: MergeStrategy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            priority: None,
            parallel: true,
            merge_results: false,
            merge_strategy: MergeStrategy::default(),
        }
    }
}

/// Settled outcome of one batch operation
#[derive(Debug, Clone)]
pub enum SettledOutcome {
    /// Operation resolved with a value
    Fulfilled(Json),
    /// Operation rejected; the failure never escapes the batch as an error
    Rejected(QueueError),
}

impl SettledOutcome {
    /// Check whether the operation resolved
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// The fulfilled value, if any
    pub fn value(&self) -> Option<&Json> {
        match self {
            Self::Fulfilled(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    /// The rejection error, if any
    pub fn error(&self) -> Option<&QueueError> {
        match self {
            Self::Fulfilled(_) => None,
            Self::Rejected(error) => Some(error),
        }
    }
}

/// Result of one batch submission
#[derive(Debug)]
pub struct BatchResult {
    /// Batch identifier, also carried by the batch lifecycle events
    pub batch_id: BatchId,
    /// One settled outcome per operation, in input order
    pub outcomes: Vec<SettledOutcome>,
    /// Merged result when merging was requested
    pub merged: Option<Json>,
}

impl BatchResult {
    /// Count of fulfilled outcomes
    pub fn fulfilled(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_fulfilled()).count()
    }

    /// Count of rejected outcomes
    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.fulfilled()
    }
}

/// Merge settled outcomes per the requested strategy
pub(crate) fn merge_outcomes(outcomes: &[SettledOutcome], strategy: &MergeStrategy) -> Json {
    match strategy {
        MergeStrategy::Array => Json::Array(
            outcomes
                .iter()
                .filter_map(|o| o.value().cloned())
                .collect(),
        ),
        MergeStrategy::Object => {
            let mut merged = serde_json::Map::new();
            for outcome in outcomes {
                if let Some(Json::Object(map)) = outcome.value() {
                    for (key, value) in map {
                        merged.insert(key.clone(), value.clone());
                    }
                }
            }
            Json::Object(merged)
        }
        MergeStrategy::Custom(merger) => merger(outcomes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fixture_outcomes() -> Vec<SettledOutcome> {
        vec![
            SettledOutcome::Fulfilled(json!({"a": 1})),
            SettledOutcome::Rejected(QueueError::terminal("broken")),
            SettledOutcome::Fulfilled(json!({"b": 2})),
        ]
    }

    #[test]
    fn test_batch_options_defaults() {
        let actual = BatchOptions::default();

        assert_eq!(actual.priority, None);
        assert!(actual.parallel);
        assert!(!actual.merge_results);
    }

    #[test]
    fn test_settled_outcome_accessors() {
        let fulfilled = SettledOutcome::Fulfilled(json!(1));
        let rejected = SettledOutcome::Rejected(QueueError::Cancelled);

        assert!(fulfilled.is_fulfilled());
        assert_eq!(fulfilled.value(), Some(&json!(1)));
        assert!(fulfilled.error().is_none());

        assert!(!rejected.is_fulfilled());
        assert!(rejected.value().is_none());
        assert!(matches!(rejected.error(), Some(QueueError::Cancelled)));
    }

    #[test]
    fn test_merge_array_skips_rejections() {
        let fixture = fixture_outcomes();

        let actual = merge_outcomes(&fixture, &MergeStrategy::Array);
        let expected = json!([{"a": 1}, {"b": 2}]);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_merge_object_shallow_merges() {
        let fixture = fixture_outcomes();

        let actual = merge_outcomes(&fixture, &MergeStrategy::Object);
        let expected = json!({"a": 1, "b": 2});
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_merge_object_later_entries_win() {
        let fixture = vec![
            SettledOutcome::Fulfilled(json!({"k": "first"})),
            SettledOutcome::Fulfilled(json!({"k": "second"})),
        ];

        let actual = merge_outcomes(&fixture, &MergeStrategy::Object);
        let expected = json!({"k": "second"});
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_merge_custom() {
        let fixture = fixture_outcomes();
        let merger: CustomMerger = Arc::new(|outcomes| json!(outcomes.len()));

        let actual = merge_outcomes(&fixture, &MergeStrategy::Custom(merger));
        let expected = json!(3);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_batch_result_counts() {
        let fixture = BatchResult {
            batch_id: BatchId::generate(),
            outcomes: fixture_outcomes(),
            merged: None,
        };

        assert_eq!(fixture.fulfilled(), 2);
        assert_eq!(fixture.rejected(), 1);
    }
}
