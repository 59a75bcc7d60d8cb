// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Sliding-window rate limiter for one source client.
///
/// Keeps the timestamps of the calls made within the last `window`. A caller
/// is admitted while fewer than `max_requests` calls remain in the window;
/// otherwise it sleeps until the oldest timestamp leaves the window. Clones
/// share the same window.
#[derive(Debug, Clone)]
pub struct SlidingWindowRateLimiter {
    max_requests: usize,
    window: Duration,
    calls: Arc<Mutex<VecDeque<Instant>>>,
}

impl SlidingWindowRateLimiter {
    /// Create a limiter admitting at most `max_requests` calls per `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            calls: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Limiter over the usual sixty second window.
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Wait until a request can be made according to the rate limit.
    pub async fn acquire(&self) {
        loop {
            let wait_time = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
                {
                    calls.pop_front();
                }

                if calls.len() < self.max_requests {
                    calls.push_back(now);
                    return;
                }

                match calls.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            tracing::debug!(
                target: "sources",
                "rate limiting: waiting {:?}",
                wait_time
            );
            sleep(wait_time).await;
        }
    }

    /// Number of calls currently inside the window.
    pub async fn in_window(&self) -> usize {
        let calls = self.calls.lock().await;
        let now = Instant::now();
        calls
            .iter()
            .filter(|call| now.duration_since(**call) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_calls_under_ceiling_are_immediate() {
        let limiter = SlidingWindowRateLimiter::new(3, Duration::from_millis(200));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(limiter.in_window().await, 3);
    }

    #[tokio::test]
    async fn test_call_over_ceiling_waits_for_oldest_to_expire() {
        let limiter = SlidingWindowRateLimiter::new(2, Duration::from_millis(100));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(100),
            "expected >= 100ms, got {:?}",
            elapsed
        );
        assert!(elapsed < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_clones_share_window() {
        let limiter = SlidingWindowRateLimiter::new(1, Duration::from_millis(80));
        let other = limiter.clone();
        let start = Instant::now();

        limiter.acquire().await;
        other.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_concurrent_callers_respect_ceiling() {
        let limiter = SlidingWindowRateLimiter::new(2, Duration::from_millis(100));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap().duration_since(start));
        }
        admitted.sort();

        assert!(admitted[1] < Duration::from_millis(50));
        assert!(admitted[2] >= Duration::from_millis(100));
    }

    #[test]
    fn test_zero_ceiling_is_raised_to_one() {
        let limiter = SlidingWindowRateLimiter::per_minute(0);
        assert_eq!(limiter.max_requests(), 1);
    }
}
