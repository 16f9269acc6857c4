//! Retry decisions for source fetches.
//!
//! The policy is a pure function of (attempt number, failure kind): it never
//! sleeps or calls anything itself. With the defaults a fetch is attempted at
//! most 3 times, waiting 1s then 2s between attempts:
//!
//! | Failure | Decision |
//! |---------|----------|
//! | `RateLimited`, `TransientNetwork` | retry after `initial * 2^(attempt-1)` until `max_attempts` |
//! | `AuthFailure` | give up immediately |
//! | `Permanent` | give up immediately |

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::FailureKind;

/// Outcome of [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then make the next attempt.
    RetryAfter(Duration),
    /// Stop; the source is skipped.
    Exhausted,
}

/// Exponential backoff with a fixed attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what to do after `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
        if !kind.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        // Exponent capped so a misconfigured ceiling cannot overflow.
        let exponent = attempt.saturating_sub(1).min(16);
        RetryDecision::RetryAfter(self.initial_backoff * 2u32.pow(exponent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_back_off_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, FailureKind::TransientNetwork),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            policy.decide(2, FailureKind::RateLimited),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(
            policy.decide(3, FailureKind::TransientNetwork),
            RetryDecision::Exhausted
        );
    }

    #[test]
    fn longer_ceiling_keeps_doubling() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        assert_eq!(
            policy.decide(3, FailureKind::RateLimited),
            RetryDecision::RetryAfter(Duration::from_secs(4))
        );
        assert_eq!(
            policy.decide(4, FailureKind::RateLimited),
            RetryDecision::RetryAfter(Duration::from_secs(8))
        );
        assert_eq!(policy.decide(5, FailureKind::RateLimited), RetryDecision::Exhausted);
    }

    #[test]
    fn auth_and_permanent_are_never_retried() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(1, FailureKind::AuthFailure), RetryDecision::Exhausted);
        assert_eq!(policy.decide(1, FailureKind::Permanent), RetryDecision::Exhausted);
    }

    #[test]
    fn zero_attempt_ceiling_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(
            policy.decide(1, FailureKind::TransientNetwork),
            RetryDecision::Exhausted
        );
    }
}
