//! Retry decisions and exponential backoff.
//!
//! A [`RetryPolicy`] answers one question after every failed attempt:
//! try again (and after how long) or give up. It holds no per-call state;
//! the executor tracks the attempt counter itself.
//!
//! The delay before retry `n` (`n = 0` for the first retry) is
//! `base_delay * 2^n`. With jitter enabled the delay is drawn uniformly from
//! `[0.75, 1.25]` times that value. A `Retry-After` hint on a 429 response
//! replaces the computed delay.

use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::rnd::Rnd;

/// Total width of the jitter band relative to the delay (±25 %).
const JITTER_FACTOR: f64 = 0.5;

const EXPONENTIAL_FACTOR: f64 = 2.0;

/// Outcome of [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then attempt again.
    Retry(Duration),
    /// Surface the error.
    GiveUp,
}

/// Bounded exponential backoff with optional jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    jitter: bool,
    rnd: Rnd,
}

impl RetryPolicy {
    /// Creates a policy with jitter enabled.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            jitter: true,
            rnd: Rnd::default(),
        }
    }

    /// Builds the policy described by a client configuration.
    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay).with_jitter(config.retry_jitter)
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_rnd(mut self, rnd: Rnd) -> Self {
        self.rnd = rnd;
        self
    }

    /// Retries allowed after the initial attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Initial attempt plus every retry.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Unjittered delay before retry `retry`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = EXPONENTIAL_FACTOR.powi(i32::try_from(retry).unwrap_or(i32::MAX));
        secs_to_duration_saturating(self.base_delay.as_secs_f64() * factor)
    }

    /// Delay before retry `retry`, jittered when enabled.
    pub fn delay(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        if self.jitter {
            apply_jitter(delay, &self.rnd)
        } else {
            delay
        }
    }

    /// Decides what to do after `error` ended attempt number `retry + 1`.
    pub fn decide(&self, retry: u32, error: &ApiError) -> RetryDecision {
        if !error.is_retryable() || retry >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        match error.retry_after() {
            Some(hint) => RetryDecision::Retry(hint),
            None => RetryDecision::Retry(self.delay(retry)),
        }
    }
}

fn apply_jitter(delay: Duration, rnd: &Rnd) -> Duration {
    let secs = delay.as_secs_f64();
    let offset = (secs * JITTER_FACTOR) / 2.0;
    let random = (secs * JITTER_FACTOR).mul_add(rnd.next_f64(), -offset);
    secs_to_duration_saturating(secs + random)
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
