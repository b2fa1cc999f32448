//! Retry policy: per-category retry limits and exponential backoff.

use crate::classify::ErrorCategory;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Built-in retry limits.
///
/// Permission, validation and filesystem failures are never retried: the first
/// two need an operator, and filesystem contention is absorbed by the warning
/// downgrade filter before it could reach this policy.
pub fn default_max_retries(category: ErrorCategory) -> u32 {
    match category {
        ErrorCategory::Network => 3,
        ErrorCategory::ApiOperation => 2,
        ErrorCategory::TransferOperation => 1,
        ErrorCategory::Unknown => 1,
        ErrorCategory::Permission | ErrorCategory::Validation | ErrorCategory::Filesystem => 0,
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    overrides: HashMap<ErrorCategory, u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            overrides: HashMap::new(),
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            overrides: HashMap::new(),
        }
    }

    /// Replace the retry limit for one category.
    pub fn with_max_retries(mut self, category: ErrorCategory, max: u32) -> Self {
        self.overrides.insert(category, max);
        self
    }

    pub fn max_retries(&self, category: ErrorCategory) -> u32 {
        self.overrides
            .get(&category)
            .copied()
            .unwrap_or_else(|| default_max_retries(category))
    }

    /// Decide whether another attempt is allowed.
    ///
    /// `retry_count` is the number of failures recorded so far for the entity,
    /// including the one being decided on. A category with limit `n` therefore
    /// terminates on its `n`-th consecutive failure, and a limit of zero
    /// terminates on the first.
    pub fn should_retry(&self, category: ErrorCategory, retry_count: u32) -> bool {
        retry_count < self.max_retries(category)
    }

    /// Backoff before the next attempt: `min(base * 2^retry_count, cap)`.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(ErrorCategory::Network), 3);
        assert_eq!(policy.max_retries(ErrorCategory::ApiOperation), 2);
        assert_eq!(policy.max_retries(ErrorCategory::TransferOperation), 1);
        assert_eq!(policy.max_retries(ErrorCategory::Unknown), 1);
        assert_eq!(policy.max_retries(ErrorCategory::Permission), 0);
        assert_eq!(policy.max_retries(ErrorCategory::Validation), 0);
        assert_eq!(policy.max_retries(ErrorCategory::Filesystem), 0);
    }

    #[test]
    fn test_network_allows_two_retries_then_stops_on_third_failure() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(ErrorCategory::Network, 1));
        assert!(policy.should_retry(ErrorCategory::Network, 2));
        assert!(!policy.should_retry(ErrorCategory::Network, 3));
        assert!(!policy.should_retry(ErrorCategory::Network, 4));
    }

    #[test]
    fn test_permission_never_retries() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(ErrorCategory::Permission, 0));
        assert!(!policy.should_retry(ErrorCategory::Permission, 1));
    }

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(40), Duration::from_secs(8));
    }

    #[test]
    fn test_zero_base_delay() {
        let policy = RetryPolicy::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.delay(3), Duration::ZERO);
    }

    #[test]
    fn test_override_limit() {
        let policy = RetryPolicy::default().with_max_retries(ErrorCategory::Permission, 2);
        assert!(policy.should_retry(ErrorCategory::Permission, 1));
        assert!(!policy.should_retry(ErrorCategory::Permission, 2));
    }
}
