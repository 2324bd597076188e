//! Retry policy and backoff calculation.

use std::time::Duration;

use rand::Rng;

/// Retry policy configuration for broker calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first (default: 5).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 100ms).
    pub base_delay: Duration,
    /// Upper bound on any single delay (default: 30s).
    pub max_delay: Duration,
    /// Growth factor between retries (default: 2.0).
    pub multiplier: f64,
    /// Jitter factor for randomization (default: 0.2 = ±20%).
    pub jitter_factor: f64,
    /// Deadline for a single attempt (default: 10s).
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.2,
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// More attempts with shorter delays.
    #[must_use]
    pub const fn aggressive() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(10),
            multiplier: 1.5,
            jitter_factor: 0.1,
            call_timeout: Duration::from_secs(5),
        }
    }

    /// Fewer attempts with longer delays.
    #[must_use]
    pub const fn conservative() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 3.0,
            jitter_factor: 0.3,
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Single attempt, no retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Calculator for exponential backoff with jitter.
///
/// Yields at most `max_attempts - 1` delays: one before each retry.
#[derive(Debug)]
pub struct ExponentialBackoff {
    retries_taken: u32,
    max_retries: u32,
    base_ms: u64,
    max_ms: u64,
    multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    /// Create a calculator from a policy.
    #[must_use]
    pub const fn new(policy: &RetryPolicy) -> Self {
        Self {
            retries_taken: 0,
            max_retries: policy.max_attempts.saturating_sub(1),
            base_ms: policy.base_delay.as_millis() as u64,
            max_ms: policy.max_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            jitter_factor: policy.jitter_factor,
        }
    }

    /// Delay before the next retry, `None` once retries are used up.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        self.next_backoff_with_hint(None)
    }

    /// Like [`Self::next_backoff`], but never shorter than a server hint.
    pub fn next_backoff_with_hint(&mut self, retry_after: Option<Duration>) -> Option<Duration> {
        if self.retries_taken >= self.max_retries {
            return None;
        }

        let base = self.base_backoff_ms();
        let jittered = self.apply_jitter(base).min(self.max_ms);
        let hinted = retry_after.map_or(0, |d| d.as_millis() as u64).min(self.max_ms);

        self.retries_taken += 1;

        Some(Duration::from_millis(jittered.max(hinted)))
    }

    /// Base delay without jitter: `base * multiplier^retry`, capped.
    fn base_backoff_ms(&self) -> u64 {
        let factor = self.multiplier.powi(self.retries_taken as i32);
        let backoff = (self.base_ms as f64 * factor) as u64;
        backoff.min(self.max_ms)
    }

    /// Uniform jitter in `[backoff * (1 - jitter), backoff * (1 + jitter)]`.
    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 || backoff_ms == 0 {
            return backoff_ms;
        }
        let spread = backoff_ms as f64 * self.jitter_factor;
        let min = (backoff_ms as f64 - spread).max(0.0);
        let max = backoff_ms as f64 + spread;
        rand::rng().random_range(min..=max) as u64
    }

    /// Retries handed out so far.
    #[must_use]
    pub const fn retries_taken(&self) -> u32 {
        self.retries_taken
    }

    /// Check if more retries are available.
    #[must_use]
    pub const fn has_remaining(&self) -> bool {
        self.retries_taken < self.max_retries
    }
}
