//! Bounded retry helper.
//!
//! All waiting loops in the workflow go through [`RetryPolicy`] so their
//! timing follows tokio time and can be driven by a paused clock in tests.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Fixed-backoff retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub attempts: u32,

    /// Sleep between consecutive attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Create a new policy.
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    /// A policy that tries exactly once.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Call `op` until it yields `Some`, or the budget is exhausted.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(value) = op(attempt).await {
                return Some(value);
            }
            if attempt < attempts {
                debug!(attempt, attempts, backoff_ms = self.backoff.as_millis() as u64, "Retrying");
                tokio::time::sleep(self.backoff).await;
            }
        }
        None
    }

    /// Call `predicate` until it returns true, or the budget is exhausted.
    pub async fn run_until<F, Fut>(&self, mut predicate: F) -> bool
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = bool>,
    {
        self.run(|attempt| {
            let fut = predicate(attempt);
            async move { fut.await.then_some(()) }
        })
        .await
        .is_some()
    }

    /// Call `op` until it succeeds, the budget is exhausted, or it fails with
    /// an error `retryable` rejects. Returns the last error.
    pub async fn retry<T, E, F, Fut>(
        &self,
        mut op: F,
        retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts || !retryable(&e) => return Err(e),
                Err(e) => debug!(attempt, attempts, error = %e, "Retrying after error"),
            }
            tokio::time::sleep(self.backoff).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_secs(1));

        let counter = calls.clone();
        let result = policy
            .run(|attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { (attempt == 3).then_some(attempt) }
            })
            .await;

        assert_eq!(result, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_sleeps_between_attempts_only() {
        let policy = RetryPolicy::new(4, Duration::from_secs(2));
        let start = Instant::now();

        let ok = policy.run_until(|_| async { false }).await;

        assert!(!ok);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_returns_last_error() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let start = Instant::now();

        let result: Result<(), String> = policy
            .retry(|attempt| async move { Err(format!("attempt {attempt}")) }, |_| true)
            .await;

        assert_eq!(result, Err("attempt 3".to_string()));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_rejected_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_secs(1));

        let counter = calls.clone();
        let result: Result<u32, String> = policy
            .retry(
                |attempt| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        match attempt {
                            1 => Err("flaky".to_string()),
                            _ => Err("corrupt".to_string()),
                        }
                    }
                },
                |e: &String| e != "corrupt",
            )
            .await;

        assert_eq!(result, Err("corrupt".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert!(policy.run_until(|_| async { true }).await);
    }
}
