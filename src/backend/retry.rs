//! Retry policy for outbound dispatch.
//!
//! Classification happens first (see [`crate::error::ErrorKind`]); this
//! module only answers "how long until the next attempt". Delay is
//! exponential in the attempt index from a fixed base, capped, unless the
//! failing response carried an explicit retry-after directive, which takes
//! precedence.

use std::time::Duration;

/// Retry policy knobs for one logical dispatch call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed beyond the first attempt
    pub max_retries: u32,
    /// Base delay for the exponential schedule
    pub base_delay: Duration,
    /// Cap on the exponential schedule (the server directive is not capped)
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the failed attempt with index `attempt`
    /// (zero-based).
    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(secs) = retry_after_secs {
            return Duration::from_secs(secs);
        }
        let exponential =
            self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(i32::MAX as u32) as i32);
        Duration::from_secs_f64(exponential.min(self.max_delay.as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_schedule() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        };
        assert_eq!(policy.delay_for(0, None), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1, None), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2, None), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3, None), Duration::from_millis(800));
    }

    #[test]
    fn test_schedule_capped_at_max_delay() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for(10, None), Duration::from_secs(5));
    }

    #[test]
    fn test_directive_overrides_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0, Some(7)), Duration::from_secs(7));
        // The directive wins even when the schedule would be shorter
        assert_eq!(policy.delay_for(0, Some(0)), Duration::ZERO);
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
    }
}
