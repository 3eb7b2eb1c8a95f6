//! Bounded retries for host readiness.
//!
//! Players create their media element some time after the "start" event.
//! The session never waits for it: it probes once per host tick through a
//! [`Retry`] and gives up after the last attempt, leaving the item inactive.

use log::debug;
use std::time::Duration;

/// Host tick the retries are paced for.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(100);
/// 20 ticks of 100 ms: the media element gets two seconds to appear.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// How often the host is expected to call back. Informational: the
    /// caller owns the pacing.
    pub check_interval: Duration,
    pub max_attempts: u32,
}

impl ReadinessPolicy {
    /// Give up after roughly `timeout`, checking every `check_interval`.
    pub fn within(timeout: Duration, check_interval: Duration) -> Self {
        let step = check_interval.as_millis().max(1);
        let attempts = (timeout.as_millis() / step).max(1) as u32;
        Self {
            check_interval,
            max_attempts: attempts,
        }
    }

    /// Check once.
    pub fn immediate() -> Self {
        Self {
            check_interval: Duration::ZERO,
            max_attempts: 1,
        }
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Result of one probe.
#[derive(Debug, PartialEq)]
pub enum Attempt<T> {
    Ready(T),
    /// Not yet; try again on the next tick.
    Pending,
    /// The last attempt failed.
    GaveUp,
}

/// Attempt counter for a probe that is retried from the host's event loop.
#[derive(Debug, Clone)]
pub struct Retry {
    policy: ReadinessPolicy,
    attempts: u32,
}

impl Retry {
    pub fn new(policy: ReadinessPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> ReadinessPolicy {
        self.policy
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts.max(1)
    }

    /// Run `probe` once, unless the attempts are used up.
    pub fn attempt<T>(&mut self, probe: impl FnOnce() -> Option<T>) -> Attempt<T> {
        if self.is_exhausted() {
            return Attempt::GaveUp;
        }
        self.attempts += 1;
        match probe() {
            Some(value) => Attempt::Ready(value),
            None if self.is_exhausted() => {
                debug!("gave up after {} attempts", self.attempts);
                Attempt::GaveUp
            }
            None => Attempt::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempts(n: u32) -> ReadinessPolicy {
        ReadinessPolicy {
            check_interval: Duration::from_millis(100),
            max_attempts: n,
        }
    }

    #[test]
    fn test_ready_on_third_attempt() {
        let mut retry = Retry::new(attempts(5));
        let mut calls = 0;
        let mut probe = || {
            calls += 1;
            (calls == 3).then_some("media")
        };
        assert_eq!(retry.attempt(&mut probe), Attempt::Pending);
        assert_eq!(retry.attempt(&mut probe), Attempt::Pending);
        assert_eq!(retry.attempt(&mut probe), Attempt::Ready("media"));
        assert_eq!(retry.attempts(), 3);
    }

    #[test]
    fn test_gives_up_and_stops_probing() {
        let mut retry = Retry::new(attempts(2));
        let mut calls = 0;
        let mut probe = || -> Option<()> {
            calls += 1;
            None
        };
        assert_eq!(retry.attempt(&mut probe), Attempt::Pending);
        assert_eq!(retry.attempt(&mut probe), Attempt::GaveUp);
        assert_eq!(retry.attempt(&mut probe), Attempt::GaveUp);
        assert!(retry.is_exhausted());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_zero_attempts_still_probes_once() {
        let mut retry = Retry::new(attempts(0));
        assert_eq!(retry.attempt(|| Some(7)), Attempt::Ready(7));
    }

    #[test]
    fn test_policies() {
        let default = ReadinessPolicy::default();
        assert_eq!(default.max_attempts, 20);
        assert_eq!(default.check_interval, Duration::from_millis(100));

        let api = ReadinessPolicy::within(Duration::from_secs(10), Duration::from_millis(500));
        assert_eq!(api.max_attempts, 20);
        assert_eq!(ReadinessPolicy::immediate().max_attempts, 1);
    }
}
