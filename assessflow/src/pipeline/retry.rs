//! Retry backoff for component attempts.
//!
//! Before retry `i` (0-based) a component waits `base * 2^i` plus a small
//! jitter, capped at the descriptor's maximum delay.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Adds a random 0..=10% of the delay
    #[default]
    Small,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Retry behavior of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Base delay between retries.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Small,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Total number of invocations allowed.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns true if another attempt may follow `attempts_made` attempts.
    #[must_use]
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts()
    }

    /// Calculates the wait before retry `retry` (0-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = duration_ms(self.base_delay);
        let max = duration_ms(self.max_delay);

        let delay = match self.backoff {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(retry)),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry) + 1),
            BackoffStrategy::Constant => base,
        }
        .min(max);

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Small => {
                let spread = delay / 10;
                if spread == 0 {
                    delay
                } else {
                    delay + rand::thread_rng().gen_range(0..=spread)
                }
            }
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered.min(max))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(base_ms: u64) -> RetryPolicy {
        RetryPolicy::new()
            .with_base_delay(Duration::from_millis(base_ms))
            .with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff, BackoffStrategy::Exponential);
        assert_eq!(policy.jitter, JitterStrategy::Small);
    }

    #[test]
    fn test_allows_retry() {
        let policy = RetryPolicy::new().with_max_retries(2);
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));

        let none = RetryPolicy::new().with_max_retries(0);
        assert!(!none.allows_retry(1));
    }

    #[test]
    fn test_exponential_delay() {
        let policy = no_jitter(100);
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_linear_and_constant_delay() {
        let linear = no_jitter(100).with_backoff(BackoffStrategy::Linear);
        assert_eq!(linear.delay_for(2), Duration::from_millis(300));

        let constant = no_jitter(100).with_backoff(BackoffStrategy::Constant);
        assert_eq!(constant.delay_for(5), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let policy = no_jitter(1000).with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
        assert_eq!(policy.delay_for(200), Duration::from_secs(5));
    }

    #[test]
    fn test_small_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::new().with_base_delay(Duration::from_millis(1000));
        for _ in 0..50 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(1000))
            .with_max_delay(Duration::from_millis(1000));
        for _ in 0..50 {
            assert!(policy.delay_for(3) <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_full_jitter_bounded() {
        let policy = no_jitter(100)
            .with_backoff(BackoffStrategy::Constant)
            .with_jitter(JitterStrategy::Full);
        assert!((0..20).all(|_| policy.delay_for(0) <= Duration::from_millis(100)));
    }

    #[test]
    fn test_strategy_serde_names() {
        let json = serde_json::to_string(&JitterStrategy::Small).unwrap();
        assert_eq!(json, r#""small""#);
        let parsed: BackoffStrategy = serde_json::from_str(r#""linear""#).unwrap();
        assert_eq!(parsed, BackoffStrategy::Linear);
    }
}
