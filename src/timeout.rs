//! Timeout guard for running operations
//!
//! Races one attempt of an operation's work against its timeout. Exactly one
//! of the three outcomes wins: the work resolves, the work rejects, or the
//! timeout fires. A timeout win drops the attempt's future, so the losing
//! side produces no further effects.

use crate::error::{QueueError, Result};
use crate::types::{Json, OperationFuture};
use std::time::Duration;

/// Run one attempt under a timeout
///
/// A fired timeout is reported as [`QueueError::Timeout`], which the default
/// classifier treats as retryable.
pub(crate) async fn guard(attempt: OperationFuture, timeout: Duration) -> Result<Json> {
    match tokio::time::timeout(timeout, attempt).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => Err(QueueError::timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_work_resolves_before_timeout() {
        let attempt: OperationFuture = Box::pin(async { Ok(serde_json::json!("done")) });

        let actual = guard(attempt, Duration::from_secs(5)).await.unwrap();
        let expected = serde_json::json!("done");
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_work_rejection_wins_over_timeout() {
        let attempt: OperationFuture =
            Box::pin(async { Err(QueueError::terminal("invalid input")) });

        let actual = guard(attempt, Duration::from_secs(5)).await;
        assert!(matches!(actual, Err(QueueError::Terminal { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_for_slow_work() {
        let attempt: OperationFuture = Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Json::Null)
        });

        let actual = guard(attempt, Duration::from_millis(100)).await;
        assert!(matches!(
            actual,
            Err(QueueError::Timeout { timeout_ms: 100 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_attempt_is_dropped() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let attempt: OperationFuture = Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(Json::Null)
        });

        let _ = guard(attempt, Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_secs(120)).await;

        // The attempt future was dropped at the race; it never ran to
        // completion.
        assert!(!finished.load(Ordering::SeqCst));
    }
}
