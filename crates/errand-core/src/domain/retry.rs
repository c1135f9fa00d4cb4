//! Retry policy: decides whether and when a failed attempt runs again.

use std::time::Duration;

use rand::Rng;

use super::WorkError;

/// The next action after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Run the task again after `delay`.
    Retry { delay: Duration, reason: String },

    /// Stop; the task is permanently failed.
    GiveUp { reason: String },
}

/// Retry policy for failed attempts.
///
/// Delays grow exponentially: the ceiling for retry `n` (1-indexed) is
/// `min(max_delay, base_delay * multiplier^(n - 1))`. With `jitter` the actual
/// delay is drawn uniformly from `[0, ceiling]` so that workers failing
/// together do not retry together.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Ceiling of the first retry delay.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound of any single delay.
    pub max_delay: Duration,

    /// Full jitter on/off.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// 3 retries, 1s base, doubling, capped at 10 minutes, with jitter.
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(600),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Fixed-delay policy without jitter, mostly for tests.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
            jitter: false,
        }
    }

    /// Total attempts a task may get.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Upper bound of the delay before retry `retry` (1-indexed).
    pub fn ceiling(&self, retry: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay before retry `retry` (1-indexed), jitter applied.
    pub fn next_delay(&self, retry: u32) -> Duration {
        let ceiling = self.ceiling(retry);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let secs = rand::thread_rng().gen_range(0.0..=ceiling.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Decide what happens after attempt number `attempts` (1-indexed) failed.
    pub fn decide(&self, attempts: u32, error: &WorkError) -> Decision {
        if !error.is_retryable() {
            return Decision::GiveUp {
                reason: format!("not retryable after {attempts} attempt(s): {error}"),
            };
        }
        if attempts >= self.max_attempts() {
            return Decision::GiveUp {
                reason: format!("max attempts reached: {attempts}/{}", self.max_attempts()),
            };
        }
        let delay = self.next_delay(attempts);
        Decision::Retry {
            delay,
            reason: format!(
                "retry {}/{} after {:?}",
                attempts,
                self.max_retries,
                delay
            ),
        }
    }
}
