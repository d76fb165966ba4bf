use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Exponential backoff: the delay doubles after every failed attempt, up to a cap.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: usize) -> Duration {
        let factor = 1u32.checked_shl(retry as u32).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Run `f` until it succeeds or the retry budget is spent.
    pub async fn retry<F, Fut, T, E>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.retry_if(operation, f, |_| true).await
    }

    /// Like [`retry`](Self::retry), but errors rejected by `retryable` are
    /// returned immediately.
    pub async fn retry_if<F, Fut, T, E, P>(&self, operation: &str, mut f: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut retries = 0;

        loop {
            let error = match f().await {
                Ok(value) => {
                    if retries > 0 {
                        info!(operation, attempts = retries + 1, "Recovered after retries");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if retries >= self.max_retries || !retryable(&error) {
                warn!(operation, attempts = retries + 1, error = %error, "Giving up");
                return Err(error);
            }

            let delay = self.backoff(retries);
            warn!(
                operation,
                attempt = retries + 1,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, backing off"
            );
            sleep(delay).await;
            retries += 1;
        }
    }
}
