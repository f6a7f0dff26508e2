//! Rate limiter (C9): exponential backoff guarding repeated policy-validation
//! failures. This is distinct from the KDF's own inherent unlock cost; it
//! protects the cheap policy-check gate from being hammered locally.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    failure_count: u32,
    last_failure: Option<Instant>,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(30))
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            failure_count: 0,
            last_failure: None,
            base_delay,
            max_delay,
        }
    }

    /// Checks whether the caller is currently rate-limited, without
    /// recording a new failure. Call this before attempting the guarded
    /// operation.
    #[must_use]
    pub fn check(&self) -> Option<Duration> {
        let last = self.last_failure?;
        if self.failure_count == 0 {
            return None;
        }
        let required_wait = self.backoff_for(self.failure_count);
        let elapsed = last.elapsed();
        if elapsed >= required_wait {
            None
        } else {
            Some(required_wait - elapsed)
        }
    }

    /// Records a failure, extending the backoff window.
    pub fn record_failure(&mut self) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(Instant::now());
    }

    /// Resets state after a success.
    pub fn reset(&mut self) {
        self.failure_count = 0;
        self.last_failure = None;
    }

    fn backoff_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(10);
        let scaled = self.base_delay.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
        scaled.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_backoff_before_any_failure() {
        let limiter = RateLimiter::default();
        assert!(limiter.check().is_none());
    }

    #[test]
    fn records_and_reports_backoff_after_failure() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), Duration::from_secs(600));
        limiter.record_failure();
        assert!(limiter.check().is_some());
    }

    #[test]
    fn reset_clears_backoff() {
        let mut limiter = RateLimiter::new(Duration::from_secs(60), Duration::from_secs(600));
        limiter.record_failure();
        limiter.reset();
        assert!(limiter.check().is_none());
    }

    #[test]
    fn backoff_grows_with_repeated_failures_up_to_ceiling() {
        let mut limiter = RateLimiter::new(Duration::from_millis(1), Duration::from_millis(5));
        for _ in 0..20 {
            limiter.record_failure();
        }
        assert_eq!(limiter.backoff_for(limiter.failure_count), Duration::from_millis(5));
    }
}
