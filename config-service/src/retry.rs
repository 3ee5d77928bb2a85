//! # Transaction Retry Policy
//!
//! Write conflicts are the only retryable failure. A retried operation
//! starts a brand new transaction, so it re-reads everything from a
//! fresh snapshot.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use shared::{config::TransactionConfig, DirectoryResult};

/// Bounded retry of conflicted transactions with linear backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &TransactionConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, fails for good, or runs out of
    /// attempts
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> DirectoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DirectoryResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    debug!(operation = name, attempt, error = %e, "Retrying conflicted transaction");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => {
                    warn!(operation = name, attempts = attempt, "Giving up on conflicted transaction");
                    return Err(e);
                }
                result => return result,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TransactionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::DirectoryError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(0))
    }

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let calls = &AtomicU32::new(0);
        let result = policy(5)
            .run("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DirectoryError::WriteConflict("devices".into()))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: DirectoryResult<()> = policy(3)
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DirectoryError::WriteConflict("devices".into()))
            })
            .await;

        assert!(matches!(result, Err(DirectoryError::WriteConflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: DirectoryResult<()> = policy(5)
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DirectoryError::NotFound("IchibuV1/x".into()))
            })
            .await;

        assert!(matches!(result, Err(DirectoryError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        assert_eq!(policy(0).max_attempts(), 1);
    }
}
