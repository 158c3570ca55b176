//! Failure classification and retry backoff
//!
//! Classification is pluggable: the queue asks an [`ErrorClassifier`] whether
//! a failure is worth retrying instead of matching on error text. The backoff
//! schedule is plain exponential with a cap and no jitter.

use crate::error::QueueError;
use std::time::Duration;

/// Decides whether a failed attempt should be retried
///
/// Implementations must not inspect error message text; classification works
/// on the error variant itself.
pub trait ErrorClassifier: Send + Sync {
    /// Check whether the error is transient enough to retry
    fn is_retryable(&self, error: &QueueError) -> bool;
}

/// Default classifier: timeouts and transient failures retry, everything
/// else is terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl ErrorClassifier for DefaultClassifier {
    fn is_retryable(&self, error: &QueueError) -> bool {
        error.is_retryable()
    }
}

/// Exponential backoff schedule: `base * 2^(attempt-1)`, capped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    base: Duration,
    cap: Duration,
}

impl BackoffSchedule {
    /// Create a schedule from a base delay and an upper bound
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before the given retry attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base.saturating_mul(1u32 << exponent);
        delay.min(self.cap)
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(10000),
        }
    }
}
