//! Lockout policy for repeated failed attempts
//!
//! - 1-2 consecutive failures: no lockout (allow typos)
//! - 3+ consecutive failures: locked for the configured timeout period
//!
//! Every further failure after the threshold re-arms the lockout, so a
//! guesser waits out a full period per attempt.

use std::time::Duration;

use crate::{FAILURE_THRESHOLD, MILLIS_PER_MINUTE};

/// Lockout policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures tolerated before lockout applies
    pub threshold: u32,
    /// Lockout length in minutes (0 disables lockout)
    pub timeout_minutes: u64,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: FAILURE_THRESHOLD,
            timeout_minutes: 1,
        }
    }
}

impl LockoutPolicy {
    /// Policy with the standard threshold and a given timeout
    pub fn with_timeout(timeout_minutes: u64) -> Self {
        Self {
            timeout_minutes,
            ..Default::default()
        }
    }

    /// Whether the given failure count triggers a lockout
    pub fn is_locked(&self, failed_attempts: u32) -> bool {
        failed_attempts > self.threshold && self.timeout_minutes > 0
    }

    /// Lockout length for the given failure count, `None` below the threshold
    pub fn lockout_duration(&self, failed_attempts: u32) -> Option<Duration> {
        if !self.is_locked(failed_attempts) {
            return None;
        }
        Some(Duration::from_millis(
            self.timeout_minutes.saturating_mul(MILLIS_PER_MINUTE),
        ))
    }

    /// Absolute deadline (epoch ms) for a lockout starting at `now`
    pub fn lock_until(&self, now: u64, failed_attempts: u32) -> Option<u64> {
        self.lockout_duration(failed_attempts)
            .map(|d| now.saturating_add(d.as_millis() as u64))
    }

    /// Attempts left before the next failure locks
    pub fn attempts_remaining(&self, failed_attempts: u32) -> u32 {
        (self.threshold + 1).saturating_sub(failed_attempts)
    }

    /// Human-readable remaining lockout for a deadline
    pub fn describe_remaining(lock_until: u64, now: u64) -> String {
        let secs = lock_until.saturating_sub(now).div_ceil(1_000);
        if secs < 60 {
            format!("Locked for {} seconds", secs)
        } else if secs < 3600 {
            format!("Locked for {} minutes", secs.div_ceil(60))
        } else {
            format!("Locked for {} hours", secs.div_ceil(3600))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_lockout_below_threshold() {
        let policy = LockoutPolicy::default();
        assert!(policy.lockout_duration(0).is_none());
        assert!(policy.lockout_duration(1).is_none());
        assert!(policy.lockout_duration(2).is_none());
    }

    #[test]
    fn test_lockout_on_third_failure() {
        let policy = LockoutPolicy::with_timeout(1);
        assert_eq!(policy.lockout_duration(3), Some(Duration::from_secs(60)));
        assert_eq!(policy.lock_until(1_000, 3), Some(61_000));
    }

    #[test]
    fn test_lockout_rearms_after_threshold() {
        let policy = LockoutPolicy::with_timeout(2);
        assert_eq!(policy.lock_until(0, 4), Some(120_000));
        assert_eq!(policy.lock_until(0, 10), Some(120_000));
    }

    #[test]
    fn test_zero_timeout_disables_lockout() {
        let policy = LockoutPolicy::with_timeout(0);
        assert!(!policy.is_locked(3));
        assert!(policy.lock_until(0, 100).is_none());
    }

    #[test]
    fn test_attempts_remaining() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.attempts_remaining(0), 3);
        assert_eq!(policy.attempts_remaining(2), 1);
        assert_eq!(policy.attempts_remaining(5), 0);
    }

    #[test]
    fn test_describe_remaining() {
        assert_eq!(LockoutPolicy::describe_remaining(30_000, 0), "Locked for 30 seconds");
        assert_eq!(LockoutPolicy::describe_remaining(60_000, 0), "Locked for 1 minutes");
        assert_eq!(LockoutPolicy::describe_remaining(7_200_000, 0), "Locked for 2 hours");
    }
}
