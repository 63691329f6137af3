//! Bounded retry of writes to a contention-prone store.

use std::future::Future;

use demand_core::{ForecastError, Result, RetryPolicy};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Runs store writes, retrying while the store reports itself busy.
///
/// Only errors for which [`ForecastError::is_transient`] holds are retried,
/// with a fixed delay between attempts. Once the attempts are exhausted the
/// last error is surfaced as [`ForecastError::StorageContention`]. Every
/// other error propagates on first occurrence.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryingPersistence {
    policy: RetryPolicy,
}

impl RetryingPersistence {
    /// Creates a retrier with `policy`.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy in use.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Executes `write`, calling it again after each transient failure.
    ///
    /// # Errors
    /// Returns [`ForecastError::StorageContention`] after `max_attempts`
    /// transient failures, or the first non-transient error unchanged.
    pub async fn execute<T, F, Fut>(&self, mut write: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            match write().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(attempts, "Write succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() => {
                    if attempts >= max_attempts {
                        warn!(attempts, error = %e, "Store still busy, giving up");
                        return Err(ForecastError::StorageContention {
                            attempts,
                            message: e.to_string(),
                        });
                    }
                    warn!(
                        attempt = attempts,
                        error = %e,
                        delay = ?self.policy.delay(),
                        "Store busy, retrying"
                    );
                    sleep(self.policy.delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryingPersistence {
        RetryingPersistence::new(RetryPolicy {
            max_attempts: 3,
            delay_ms: 1,
        })
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ForecastError::StoreBusy("database is locked".to_string()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_storage_contention() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast()
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ForecastError::StoreBusy("database is locked".to_string()))
            })
            .await;
        assert!(matches!(
            result,
            Err(ForecastError::StorageContention { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast()
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ForecastError::Storage("constraint failed".to_string()))
            })
            .await;
        assert!(matches!(result, Err(ForecastError::Storage(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempt_policy_still_runs_once() {
        let retry = RetryingPersistence::new(RetryPolicy {
            max_attempts: 0,
            delay_ms: 1,
        });
        let result = retry.execute(|| async { Ok::<_, ForecastError>(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }
}
