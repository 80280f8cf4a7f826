//! Bounded retry with fatal exit on exhaustion
//!
//! Wraps a device operation in a retry loop bounded by attempt count, not
//! wall clock; the per-attempt timeout lives on the link. Only errors the
//! service classifies as transient are retried. Exhausting the budget is
//! treated as an operational emergency: the executor logs a final error and
//! invokes its exit hook, which defaults to terminating the process with a
//! non-zero status. Periodic field-device workers must not run silently
//! degraded.

use std::future::Future;
use std::sync::Arc;

use tracing::error;

use crate::error::{AdsClientError, Result};

/// Hook invoked when the retry budget is exhausted. The default terminates
/// the process; tests inject a recorder instead.
pub type ExitHandler = Arc<dyn Fn(i32) + Send + Sync>;

/// Retry loop around transient device operations
#[derive(Clone)]
pub struct RetryExecutor {
    max_attempts: u32,
    on_exhausted: ExitHandler,
}

impl RetryExecutor {
    /// Executor with the given attempt budget and the process-exit policy
    pub fn new(max_attempts: u32) -> Self {
        Self::with_exit_handler(max_attempts, Arc::new(|code| std::process::exit(code)))
    }

    /// Executor with an injected exhaustion hook
    pub fn with_exit_handler(max_attempts: u32, on_exhausted: ExitHandler) -> Self {
        assert!(max_attempts > 0, "retry budget must be at least 1 attempt");
        Self {
            max_attempts,
            on_exhausted,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Invoke `operation` until it succeeds or the budget is spent.
    ///
    /// Each transient failure logs the remaining-attempt count and the
    /// failure message. Non-transient errors propagate immediately without
    /// consuming the budget. On exhaustion the exit hook runs; if it
    /// returns (tests), a `RetryExhausted` error is surfaced.
    pub async fn execute<F, Fut, T>(&self, context: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut remaining = self.max_attempts;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    remaining -= 1;
                    if remaining == 0 {
                        error!(
                            "{context}: operation failed after {} attempts. Exiting. Last error: {e}",
                            self.max_attempts
                        );
                        (self.on_exhausted)(1);
                        return Err(AdsClientError::RetryExhausted {
                            context: context.to_string(),
                            attempts: self.max_attempts,
                        });
                    }
                    error!("{context}: operation failed. Retrying... ({remaining} remaining) {e}");
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tracing_test::traced_test;

    use super::*;

    fn recording_executor(max_attempts: u32) -> (RetryExecutor, Arc<AtomicU32>) {
        let exits = Arc::new(AtomicU32::new(0));
        let hook_exits = Arc::clone(&exits);
        let executor = RetryExecutor::with_exit_handler(
            max_attempts,
            Arc::new(move |_code| {
                hook_exits.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (executor, exits)
    }

    #[tokio::test]
    async fn succeeds_without_consuming_budget() {
        let (executor, exits) = recording_executor(3);
        let result = executor
            .execute("read", || async { Ok::<_, AdsClientError>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(exits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn performs_exactly_max_attempts_then_exits() {
        let (executor, exits) = recording_executor(4);
        let attempts = Arc::new(AtomicU32::new(0));
        let op_attempts = Arc::clone(&attempts);

        let result = executor
            .execute("read", move || {
                let attempts = Arc::clone(&op_attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(AdsClientError::timeout("plc1"))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(AdsClientError::RetryExhausted { attempts: 4, .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let (executor, exits) = recording_executor(5);
        let attempts = Arc::new(AtomicU32::new(0));
        let op_attempts = Arc::clone(&attempts);

        let result = executor
            .execute("write", move || {
                let attempts = Arc::clone(&op_attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AdsClientError::busy("plc1"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(exits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let (executor, exits) = recording_executor(5);
        let attempts = Arc::new(AtomicU32::new(0));
        let op_attempts = Arc::clone(&attempts);

        let result = executor
            .execute("read", move || {
                let attempts = Arc::clone(&op_attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(AdsClientError::symbol_not_found("MAIN.nope"))
                }
            })
            .await;

        assert!(matches!(result, Err(AdsClientError::SymbolNotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(exits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn logs_remaining_attempts_on_each_failure() {
        let (executor, _exits) = recording_executor(2);
        let _ = executor
            .execute("poll plc1", || async {
                Err::<(), _>(AdsClientError::timeout("plc1"))
            })
            .await;

        assert!(logs_contain("1 remaining"));
        assert!(logs_contain("failed after 2 attempts"));
    }
}
