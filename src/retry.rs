//! retry.rs
//!
//! Exponential backoff around fallible async calls.
//!
//! One policy type serves every call site. What differs between them is the
//! attempt budget, the first wait, and which errors deserve another try:
//! - record building retries only errors the collaborator tags as transient
//! - collection calls (add / query) retry everything
//!
//! The wait is multiplied after every failed attempt; no sleep follows the
//! final attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Attempts allowed when building (embedding) one file's records.
pub const RECORD_BUILD_ATTEMPTS: usize = 10;
/// First wait after a rate-limited record build.
pub const RECORD_BUILD_INITIAL_WAIT: Duration = Duration::from_secs(10);
/// Attempts allowed for a collection add or query.
pub const COLLECTION_CALL_ATTEMPTS: usize = 5;
/// First wait after a failed collection call.
pub const COLLECTION_CALL_INITIAL_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_wait: Duration,
    pub multiplier: u32,
}

#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("operation failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: E,
    },

    #[error("non-retryable failure on attempt {attempt}: {last}")]
    Rejected {
        attempt: usize,
        #[source]
        last: E,
    },
}

impl RetryPolicy {
    /// Doubling backoff starting at `initial_wait`.
    pub const fn new(max_attempts: usize, initial_wait: Duration) -> Self {
        Self {
            max_attempts,
            initial_wait,
            multiplier: 2,
        }
    }

    /// Policy for the externally rate-limited embedding of a file.
    pub const fn record_build() -> Self {
        Self::new(RECORD_BUILD_ATTEMPTS, RECORD_BUILD_INITIAL_WAIT)
    }

    /// Policy for vector-store collection mutations and queries.
    pub const fn collection_call() -> Self {
        Self::new(COLLECTION_CALL_ATTEMPTS, COLLECTION_CALL_INITIAL_WAIT)
    }

    /// Wait that precedes attempt `attempt + 1` (0-based `attempt`).
    pub fn wait_after(&self, attempt: usize) -> Duration {
        let factor = (self.multiplier as u64).saturating_pow(attempt as u32);
        let millis = (self.initial_wait.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis)
    }

    /// Retry on every error.
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(label, op, |_| true).await
    }

    /// Retry only while `should_retry` accepts the error; anything else is
    /// returned at once as [`RetryError::Rejected`].
    pub async fn run_if<T, E, F, Fut, P>(
        &self,
        label: &str,
        mut op: F,
        should_retry: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0usize;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !should_retry(&err) {
                return Err(RetryError::Rejected {
                    attempt: attempt + 1,
                    last: err,
                });
            }
            if attempt + 1 >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: max_attempts,
                    last: err,
                });
            }

            let wait = self.wait_after(attempt);
            warn!(
                "{label} failed, attempt {}/{}: {err}. Waiting {:?} before retry",
                attempt + 1,
                max_attempts,
                wait
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("busy")]
        Busy,
        #[error("bad input")]
        BadInput,
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_failures_with_doubling_waits() {
        let started = Instant::now();
        let mut calls = Vec::new();

        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        let result = policy
            .run("flaky", || {
                calls.push(started.elapsed());
                let n = calls.len();
                async move {
                    if n <= 3 {
                        Err(TestError::Busy)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(
            calls,
            vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(6),
                Duration::from_secs(14),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_runs_exactly_max_attempts() {
        let started = Instant::now();
        let mut calls = 0usize;

        let policy = RetryPolicy::new(4, Duration::from_secs(1));
        let err = policy
            .run("doomed", || {
                calls += 1;
                async { Err::<(), _>(TestError::Busy) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 4);
        assert!(matches!(err, RetryError::Exhausted { attempts: 4, .. }));
        assert!(err.to_string().contains("after 4 attempts"));
        // 1 + 2 + 4, nothing after the last attempt
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_errors_are_not_retried() {
        let started = Instant::now();
        let mut calls = 0usize;

        let err = RetryPolicy::record_build()
            .run_if(
                "build",
                || {
                    calls += 1;
                    async { Err::<(), _>(TestError::BadInput) }
                },
                |e: &TestError| matches!(e, TestError::Busy),
            )
            .await
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, RetryError::Rejected { attempt: 1, .. }));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn record_build_waits_grow_from_ten_seconds() {
        let policy = RetryPolicy::record_build();
        assert_eq!(policy.wait_after(0), Duration::from_secs(10));
        assert_eq!(policy.wait_after(1), Duration::from_secs(20));
        assert_eq!(policy.wait_after(3), Duration::from_secs(80));
        assert_eq!(RetryPolicy::collection_call().max_attempts, 5);
    }
}
