//! Retry policy as a pure function of (attempt, error) -> decision.
//!
//! Nothing here sleeps or touches the network. The fetcher asks the policy
//! what to do after each failed attempt and performs the wait itself.

use std::time::Duration;

use kennel_core::{RetryConfig, UpstreamError};
use rand::Rng;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then try again.
    Retry { delay: Duration },
    /// Stop and report the last error.
    GiveUp,
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            jitter: config.jitter,
        }
    }

    /// Un-jittered delay after the given 1-based attempt:
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Decide whether to retry after `attempt` (1-based) failed with `error`.
    ///
    /// A server-supplied `Retry-After` raises the delay to at least that
    /// value, still bounded by `max_delay`.
    pub fn decide(&self, attempt: u32, error: &UpstreamError) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let mut delay = self.backoff(attempt);
        if let Some(hint) = error.retry_after() {
            delay = delay.max(hint).min(self.max_delay);
        }
        RetryDecision::Retry { delay }
    }

    /// Apply jitter to a decided delay if the policy asks for it.
    pub fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter {
            equal_jitter(delay)
        } else {
            delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Uniformly random delay in `[delay / 2, delay]`.
pub fn equal_jitter(delay: Duration) -> Duration {
    let full = delay.as_millis() as u64;
    if full < 2 {
        return delay;
    }
    let ms = rand::rng().random_range(full - full / 2..=full);
    Duration::from_millis(ms)
}
