//! Retry policy for failed deliveries.

use chrono::Duration;

use crate::config::QueueConfig;

/// Exponential backoff with a ceiling, no jitter.
///
/// `delay(n) = min(base * 2^n, cap)` where `n` is the retry count the
/// message had *before* the failing attempt, so the first failure waits `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after which a message is permanently failed
    pub max_retry_attempts: u32,
    /// Base delay in minutes
    pub base_delay_minutes: u64,
    /// Maximum delay in minutes
    pub delay_cap_minutes: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            base_delay_minutes: 5,
            delay_cap_minutes: 120, // 2 hours
        }
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_retry_attempts: config.max_retry_attempts,
            base_delay_minutes: config.retry_base_delay_minutes,
            delay_cap_minutes: config.retry_delay_cap_minutes,
        }
    }
}

impl RetryPolicy {
    /// Backoff in minutes for a message that had `retry_count` failures so far.
    pub fn delay_minutes(&self, retry_count: u32) -> u64 {
        let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        self.base_delay_minutes
            .saturating_mul(factor)
            .min(self.delay_cap_minutes)
    }

    pub fn delay(&self, retry_count: u32) -> Duration {
        // chrono::Duration is bounded by i64 milliseconds
        let max_minutes = (i64::MAX / 1000 / 60) as u64;
        Duration::minutes(self.delay_minutes(retry_count).min(max_minutes) as i64)
    }

    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retry_attempts
    }
}
