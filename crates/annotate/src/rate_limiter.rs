use anyhow::Result;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// Rolling-window limiter: at most `max_requests` permits within any
/// trailing `window`.
///
/// The timestamp lock is held while a caller waits, so concurrent callers
/// are served in arrival order.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    margin: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            anyhow::bail!("rate limiter needs at least one request per window");
        }

        Ok(Self {
            max_requests,
            window,
            margin: Duration::from_secs(1),
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests)),
        })
    }

    /// 15 requests per 60 seconds.
    pub fn default_policy() -> Self {
        Self {
            max_requests: 15,
            window: Duration::from_secs(60),
            margin: Duration::from_secs(1),
            timestamps: Mutex::new(VecDeque::with_capacity(15)),
        }
    }

    /// Extra time added to each computed wait.
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    /// Wait until another call fits in the window, then record it.
    pub async fn acquire(&self) {
        let mut timestamps = self.timestamps.lock().await;

        loop {
            let now = Instant::now();
            self.expire(&mut timestamps, now);

            if timestamps.len() < self.max_requests {
                timestamps.push_back(now);
                return;
            }

            // Full: sleep until the oldest permit leaves the window, then sweep again
            let oldest = timestamps[0];
            let wait = self.window.saturating_sub(now.duration_since(oldest)) + self.margin;
            debug!(
                wait_ms = wait.as_millis() as u64,
                max_requests = self.max_requests,
                "Rate limit reached, waiting"
            );
            sleep(wait).await;
        }
    }

    /// Permits currently inside the trailing window.
    pub async fn in_window(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        self.expire(&mut timestamps, Instant::now());
        timestamps.len()
    }

    fn expire(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) < self.window {
                break;
            }
            timestamps.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_within_limit_is_immediate() {
        let limiter = RateLimiter::default_policy();
        let start = Instant::now();
        for _ in 0..15 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window().await, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_call_waits_one_window() {
        let limiter = RateLimiter::default_policy();
        let start = Instant::now();
        for _ in 0..16 {
            limiter.acquire().await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(60), "waited {:?}", elapsed);
        assert!(elapsed <= Duration::from_secs(62), "waited {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trailing_window_never_exceeded() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10))
            .unwrap()
            .with_margin(Duration::ZERO);
        let origin = Instant::now();
        let mut granted = Vec::new();

        for i in 0..12 {
            if i % 4 == 0 {
                sleep(Duration::from_millis(2500)).await;
            }
            limiter.acquire().await;
            granted.push(origin.elapsed());
        }

        for (i, &t) in granted.iter().enumerate() {
            let in_window = granted[..=i]
                .iter()
                .filter(|&&earlier| t - earlier < Duration::from_secs(10))
                .count();
            assert!(in_window <= 3, "{} permits in window ending at {:?}", in_window, t);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_budget() {
        let limiter = Arc::new(RateLimiter::new(2, Duration::from_secs(5)).unwrap());
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    start.elapsed()
                })
            })
            .collect();

        let mut waits = Vec::new();
        for handle in handles {
            waits.push(handle.await.unwrap());
        }
        waits.sort();

        assert_eq!(waits[0], Duration::ZERO);
        assert_eq!(waits[1], Duration::ZERO);
        assert!(waits[2] >= Duration::from_secs(5));
        assert!(waits[3] >= Duration::from_secs(5));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(RateLimiter::new(0, Duration::from_secs(1)).is_err());
    }
}
