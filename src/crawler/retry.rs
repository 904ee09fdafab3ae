//! Retry policy for transient fetch failures

use crate::config::CrawlerConfig;
use rand::Rng;
use std::time::Duration;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue the URL once the delay has passed
    Retry { after: Duration },
    /// Retries are exhausted; record the URL as failed
    GiveUp,
}

/// Exponential backoff with jitter for transient failures
///
/// Retry `n` (0-based) waits `min(cap, base * 2^n + U[0, base * 2^(n-1)])`.
/// The jitter never exceeds half of the exponential term, so successive
/// delays never shrink.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_retries,
            base,
            cap,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_cap_ms),
        )
    }

    /// Decides whether a URL that already used `retries_used` retries gets another
    pub fn decide(&self, retries_used: u32) -> RetryDecision {
        if retries_used < self.max_retries {
            RetryDecision::Retry {
                after: self.delay_for(retries_used),
            }
        } else {
            RetryDecision::GiveUp
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponential = self.exponential(retry);
        let jitter_ceiling = exponential / 2;

        let jitter = if jitter_ceiling.is_zero() {
            Duration::ZERO
        } else {
            let millis = jitter_ceiling.as_millis().min(u64::MAX as u128) as u64;
            Duration::from_millis(rand::rng().random_range(0..=millis))
        };

        exponential.saturating_add(jitter).min(self.cap)
    }

    fn exponential(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor)
    }
}
