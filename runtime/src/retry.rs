//! Bounded retry with a fixed wait between attempts.
//!
//! Waits go through the injected [`Sleeper`], so tests observe every delay
//! without waiting for it.
//!
//! # Example
//!
//! ```rust
//! use fabric_livy_core::TokioSleeper;
//! use fabric_livy_runtime::retry::{RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::new(3, Duration::from_millis(10));
//!
//! let result = retry_with_predicate(
//!     policy,
//!     &TokioSleeper,
//!     || async { Ok::<_, String>(42) },
//!     |err: &String| err.contains("transient"),
//! )
//! .await?;
//! assert_eq!(result, 42);
//! # Ok(())
//! # }
//! ```

use fabric_livy_core::environment::Sleeper;
use std::time::Duration;

/// Attempt budget and wait between attempts.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `delay`: 5 seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included
    pub max_attempts: usize,
    /// Wait before each retry
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Policy making `max_attempts` attempts (at least one).
    #[must_use]
    pub const fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            delay,
        }
    }

    /// Policy for the query path: `configured` attempts, or three when
    /// unset, five seconds apart.
    #[must_use]
    pub const fn for_queries(configured: u32) -> Self {
        let attempts = if configured == 0 { 3 } else { configured as usize };
        Self::new(attempts, Duration::from_secs(5))
    }
}

/// Retry an async operation while `is_retryable` accepts its error.
///
/// Non-retryable errors are returned at once. Once the attempt budget is
/// spent the last error is returned.
///
/// # Errors
///
/// Returns the operation's error as described above.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(err);
                }

                if attempt >= policy.max_attempts {
                    tracing::error!(
                        attempt,
                        error = %err,
                        "Operation failed after max attempts"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_secs = policy.delay.as_secs(),
                    error = %err,
                    "Operation failed, retrying"
                );
                sleeper.sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_livy_testing::RecordingSleeper;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn query_policy_defaults_to_three_attempts() {
        assert_eq!(RetryPolicy::for_queries(0).max_attempts, 3);
        assert_eq!(RetryPolicy::for_queries(2).max_attempts, 2);
        assert_eq!(RetryPolicy::for_queries(2).delay, Duration::from_secs(5));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_first_try() {
        let sleeper = RecordingSleeper::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_predicate(
            RetryPolicy::default(),
            &sleeper,
            || {
                let c = Arc::clone(&counter_clone);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(42)
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(sleeper.count(), 0);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let sleeper = RecordingSleeper::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_predicate(
            RetryPolicy::new(3, Duration::from_secs(5)),
            &sleeper,
            || {
                let c = Arc::clone(&counter_clone);
                async move {
                    let attempt = c.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(format!("Attempt {attempt} failed"))
                    } else {
                        Ok(42)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(5); 2]);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let sleeper = RecordingSleeper::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_predicate(
            RetryPolicy::new(2, Duration::from_secs(1)),
            &sleeper,
            || {
                let c = Arc::clone(&counter_clone);
                async move {
                    let attempt = c.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>(format!("failure {attempt}"))
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("failure 1".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(sleeper.count(), 1);
    }

    #[tokio::test]
    async fn test_retry_with_predicate_skips_non_retryable() {
        let sleeper = RecordingSleeper::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let result = retry_with_predicate(
            RetryPolicy::default(),
            &sleeper,
            || {
                let c = Arc::clone(&counter_clone);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("permanent error")
                }
            },
            |err: &&str| err.contains("transient"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(sleeper.count(), 0);
    }
}
