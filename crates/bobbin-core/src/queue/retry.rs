//! Retry policy: how often a failed job runs again, and after how long.

use std::time::Duration;

/// Exponential backoff bounded by `max_attempts`.
///
/// Reschedule loops are bounded here too: a job that keeps rescheduling itself
/// goes through the queue like any other push.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    pub multiplier: f64,

    /// Total runs allowed, the first one included.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// delay = base_delay * multiplier^(attempts - 1)
    ///
    /// With the defaults: 2s, 4s, 8s, 16s, ...
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_has_reasonable_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.max_attempts, 5);
    }

    #[rstest]
    #[case(0, 2)]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(5, 32)]
    fn exponential_backoff(#[case] attempts: u32, #[case] secs: u64) {
        assert_eq!(RetryPolicy::default().next_delay(attempts), Duration::from_secs(secs));
    }

    #[test]
    fn huge_attempt_counts_saturate() {
        assert_eq!(RetryPolicy::default().next_delay(u32::MAX), Duration::MAX);
    }
}
