use crate::error::{QueueError, Result};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the operation queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct QueueConfig {
    /// Maximum concurrently-executing operations
    pub max_concurrent: usize,
    /// Default per-attempt timeout applied when enqueue options omit one
    pub default_timeout: Duration,
    /// Default retry budget applied when enqueue options omit one
    pub default_max_retries: u32,
    /// Base delay for exponential retry backoff
    pub backoff_base: Duration,
    /// Upper bound on a single backoff delay
    pub backoff_cap: Duration,
    /// Maximum entries kept in each history collection
    pub max_history_size: usize,
    /// Maximum age of a history entry before eviction
    pub max_history_age: Duration,
    /// How often the background history cleanup runs
    pub cleanup_interval: Duration,
    /// How long shutdown waits for in-flight operations to drain
    pub shutdown_grace: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            default_timeout: Duration::from_secs(30),
            default_max_retries: 2,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_millis(10000),
            max_history_size: 1000,
            max_history_age: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl QueueConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(QueueError::validation("max_concurrent must be at least 1"));
        }
        if self.default_timeout.is_zero() {
            return Err(QueueError::validation("default_timeout must be non-zero"));
        }
        if self.backoff_base.is_zero() {
            return Err(QueueError::validation("backoff_base must be non-zero"));
        }
        if self.backoff_cap < self.backoff_base {
            return Err(QueueError::validation(
                "backoff_cap must not be below backoff_base",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_queue_config_default() {
        let actual = QueueConfig::default();

        assert_eq!(actual.max_concurrent, 3);
        assert_eq!(actual.default_timeout, Duration::from_secs(30));
        assert_eq!(actual.default_max_retries, 2);
        assert_eq!(actual.backoff_base, Duration::from_millis(1000));
        assert_eq!(actual.backoff_cap, Duration::from_millis(10000));
        assert_eq!(actual.max_history_size, 1000);
        assert_eq!(actual.max_history_age, Duration::from_secs(300));
    }

    #[test]
    fn test_queue_config_default_is_valid() {
        let fixture = QueueConfig::default();
        assert!(fixture.validate().is_ok());
    }

    #[test]
    fn test_queue_config_rejects_zero_concurrency() {
        let fixture = QueueConfig::default().max_concurrent(0usize);

        let actual = fixture.validate();
        assert!(matches!(actual, Err(QueueError::Validation { .. })));
    }

    #[test]
    fn test_queue_config_rejects_inverted_backoff_bounds() {
        let fixture = QueueConfig::default()
            .backoff_base(Duration::from_secs(20))
            .backoff_cap(Duration::from_secs(10));

        let actual = fixture.validate();
        assert!(matches!(actual, Err(QueueError::Validation { .. })));
    }

    #[test]
    fn test_queue_config_setters() {
        let actual = QueueConfig::default()
            .max_concurrent(8usize)
            .max_history_size(50usize);

        assert_eq!(actual.max_concurrent, 8);
        assert_eq!(actual.max_history_size, 50);
    }
}
