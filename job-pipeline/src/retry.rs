use std::{future::Future, time::Duration};

use common::error::{AppError, ExternalCallError};
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tracing::warn;

pub const DEFAULT_MAX_ATTEMPTS: usize = 2;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_500);

/// Upstream gateway failures are worth one more try; everything else is
/// terminal for the item.
pub fn is_transient(err: &AppError) -> bool {
    err.as_external().is_some_and(ExternalCallError::is_transient)
}

/// How capability calls are repeated. One instance is shared by every step.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
    pub retryable: fn(&AppError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            retryable: is_transient,
        }
    }
}

impl RetryPolicy {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Runs `action` until it succeeds, fails with a non-retryable error or
    /// the attempts are used up. The last error is returned.
    pub async fn run<T, A, Fut>(&self, operation: &'static str, action: A) -> Result<T, AppError>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let retries = self.max_attempts.saturating_sub(1);
        let strategy = FixedInterval::new(self.delay).take(retries);
        let retryable = self.retryable;

        RetryIf::spawn(strategy, action, |err: &AppError| {
            let retry = retryable(err);
            if retry {
                warn!(operation, error = %err, "transient failure, retrying");
            }
            retry
        })
        .await
    }
}

/// Bounds one call; expiry is reported as an upstream failure without status.
pub async fn bounded<T, Fut>(operation: &str, limit: Duration, call: Fut) -> Result<T, AppError>
where
    Fut: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ExternalCallError::timed_out(operation, limit).into()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::with_delay(Duration::from_millis(1))
    }

    async fn failing_with(calls: Arc<AtomicUsize>, status: u16) -> Result<u32, AppError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(ExternalCallError::with_status(status, "upstream").into())
    }

    #[tokio::test]
    async fn transient_errors_are_retried_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = policy()
            .run("content", || failing_with(Arc::clone(&calls), 503))
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = policy()
            .run("content", || failing_with(Arc::clone(&calls), 400))
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_attempt_can_succeed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = policy()
            .run("content", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ExternalCallError::with_status(502, "bad gateway").into())
                    } else {
                        Ok(7_u32)
                    }
                }
            })
            .await;
        assert_eq!(result.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bounded_reports_timeouts_without_status() {
        let result: Result<(), AppError> = bounded(
            "slow",
            Duration::from_millis(5),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        let err = result.expect_err("timed out");
        let external = err.as_external().expect("external error");
        assert_eq!(external.status, None);
        assert!(external.message.contains("timed out"));
        assert!(!is_transient(&err));
    }
}
