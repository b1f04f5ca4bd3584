//! Token bucket admission control for async clients.
//!
//! The bucket holds up to `burst_limit` tokens and refills continuously at
//! `requests_per_second`. Every admitted call takes one token. A caller that
//! finds less than one token computes how long the deficit takes to refill,
//! sleeps that long without holding the lock, then tries again. Waiters are
//! not queued; ordering among them is whatever the scheduler produces.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::config::ApiConfig;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes a token, or reports how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let wait = (1.0 - self.tokens) / self.refill_rate;
            Err(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX))
        }
    }
}

/// Current bucket state, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLimitSnapshot {
    /// Tokens available right now, after refill.
    pub available_tokens: f64,
    /// Bucket capacity.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_rate: f64,
}

/// Shared token bucket. A disabled limiter admits every call immediately.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Option<Mutex<Bucket>>,
}

impl RateLimiter {
    /// Creates a full bucket.
    ///
    /// `requests_per_second` must be positive and finite, `burst_limit`
    /// at least one; [`ApiConfig::validate`] enforces both.
    pub fn new(requests_per_second: f64, burst_limit: u32) -> Self {
        let capacity = f64::from(burst_limit);
        Self {
            bucket: Some(Mutex::new(Bucket {
                tokens: capacity,
                capacity,
                refill_rate: requests_per_second,
                last_refill: Instant::now(),
            })),
        }
    }

    /// A limiter that never waits.
    pub fn disabled() -> Self {
        Self { bucket: None }
    }

    /// Builds the limiter described by a client configuration.
    pub fn from_config(config: &ApiConfig) -> Self {
        if config.enable_rate_limiting {
            Self::new(config.requests_per_second, config.burst_limit)
        } else {
            Self::disabled()
        }
    }

    /// Whether admission control is active.
    pub fn is_enabled(&self) -> bool {
        self.bucket.is_some()
    }

    /// Waits until a token is available and takes it.
    ///
    /// Returns the total time spent waiting. Dropping the future while it
    /// sleeps takes no token.
    pub async fn acquire(&self) -> Duration {
        let Some(bucket) = &self.bucket else {
            return Duration::ZERO;
        };
        let started = Instant::now();
        loop {
            let outcome = bucket.lock().try_take(Instant::now());
            match outcome {
                Ok(()) => return started.elapsed(),
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Bucket state after refill, `None` when disabled.
    pub fn snapshot(&self) -> Option<RateLimitSnapshot> {
        self.bucket.as_ref().map(|bucket| {
            let mut bucket = bucket.lock();
            bucket.refill(Instant::now());
            RateLimitSnapshot {
                available_tokens: bucket.tokens,
                capacity: bucket.capacity,
                refill_rate: bucket.refill_rate,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_admitted_immediately() {
        let limiter = RateLimiter::new(10.0, 5);
        let started = Instant::now();
        for _ in 0..5 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(limiter.snapshot().unwrap().available_tokens, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn call_after_burst_waits_one_interval() {
        let limiter = RateLimiter::new(10.0, 5);
        for _ in 0..5 {
            limiter.acquire().await;
        }
        let waited = limiter.acquire().await;
        assert!(waited >= Duration::from_millis(95), "waited {waited:?}");
        assert!(waited <= Duration::from_millis(130), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_refill_up_to_capacity() {
        let limiter = RateLimiter::new(2.0, 3);
        for _ in 0..3 {
            limiter.acquire().await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        let snapshot = limiter.snapshot().unwrap();
        assert_eq!(snapshot.available_tokens, 3.0);
        assert_eq!(snapshot.capacity, 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_are_spread_by_rate() {
        let limiter = Arc::new(RateLimiter::new(10.0, 2));
        let started = Instant::now();
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    started.elapsed()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        assert_eq!(finished[1], Duration::ZERO);
        // four calls beyond the burst need at least four refill intervals
        assert!(finished[5] >= Duration::from_millis(395), "{finished:?}");
    }

    #[tokio::test]
    async fn disabled_limiter_never_waits() {
        let limiter = RateLimiter::disabled();
        for _ in 0..1000 {
            assert_eq!(limiter.acquire().await, Duration::ZERO);
        }
        assert!(limiter.snapshot().is_none());
        assert!(!limiter.is_enabled());
    }
}
