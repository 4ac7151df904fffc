use cardrender_common::config::{secs, RetrySettings};
use std::time::Duration;
use tokio::time::Instant;

/// Stand-in for "never" when a deadline would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + duration`, saturating to a point decades away instead of
/// overflowing.
pub fn instant_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Reconnect backoff policy.
///
/// After `n` consecutive failures the next connect attempt waits
/// `min(max_delay, delay + base^n)` seconds. The delay grows with `n` and
/// never exceeds `max_delay`.
///
/// # Default Configuration
///
/// - `base`: 2
/// - `delay`: 5 seconds
/// - `max_delay`: 60 seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Exponential base
    pub base: f64,
    /// Floor added to every delay, in seconds
    pub delay: f64,
    /// Ceiling, in seconds
    pub max_delay: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            base: settings.base,
            delay: settings.delay,
            max_delay: settings.max_delay,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = self.base.powi(failures.min(i32::MAX as u32) as i32);
        secs((self.delay + exp).min(self.max_delay))
    }
}

/// Connection attempt bookkeeping shared by every request of one client.
///
/// Only mutated while holding the connector lock.
#[derive(Debug, Default, Clone)]
pub struct ConnectionAttemptState {
    /// Failures since the client was created
    pub total_failures: u64,
    /// Consecutive failures, reset by a successful connect
    pub failures: u32,
    /// No new attempt may start before this instant
    pub retry_next: Option<Instant>,
}

impl ConnectionAttemptState {
    /// Records a failed attempt at `now` and returns the backoff applied.
    pub fn record_failure(&mut self, now: Instant, policy: &RetryPolicy) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.total_failures = self.total_failures.saturating_add(1);
        let backoff = policy.delay(self.failures);
        self.retry_next = Some(instant_after(now, backoff));
        backoff
    }

    /// Records a successful connect and returns the failure streak it ended.
    pub fn record_success(&mut self) -> u32 {
        let previous = self.failures;
        self.failures = 0;
        self.retry_next = None;
        previous
    }

    /// How long a new attempt must still wait at `now`, if at all.
    pub fn wait_at(&self, now: Instant) -> Option<Instant> {
        self.retry_next.filter(|next| *next > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base, 2.0);
        assert_eq!(policy.delay, 5.0);
        assert_eq!(policy.max_delay, 60.0);
    }

    #[test]
    fn test_delay_formula() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(6));
        assert_eq!(policy.delay(1), Duration::from_secs(7));
        assert_eq!(policy.delay(2), Duration::from_secs(9));
        assert_eq!(policy.delay(3), Duration::from_secs(13));
        assert_eq!(policy.delay(5), Duration::from_secs(37));
        assert_eq!(policy.delay(6), Duration::from_secs(60));
    }

    #[test]
    fn test_delay_is_non_decreasing_and_bounded() {
        let policy = RetryPolicy {
            base: 1.7,
            delay: 0.25,
            max_delay: 45.0,
        };
        let mut previous = Duration::ZERO;
        for n in 0..200 {
            let delay = policy.delay(n);
            assert!(delay >= previous, "delay({}) decreased", n);
            assert!(delay <= Duration::from_secs(45), "delay({}) above ceiling", n);
            previous = delay;
        }
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(45));
    }

    #[test]
    fn test_base_one_is_constant() {
        let policy = RetryPolicy {
            base: 1.0,
            delay: 0.5,
            max_delay: 60.0,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(1500));
        assert_eq!(policy.delay(40), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_state_transitions() {
        let policy = RetryPolicy {
            base: 2.0,
            delay: 0.0,
            max_delay: 60.0,
        };
        let mut state = ConnectionAttemptState::default();
        let now = Instant::now();

        assert!(state.wait_at(now).is_none());

        assert_eq!(state.record_failure(now, &policy), Duration::from_secs(2));
        assert_eq!(state.record_failure(now, &policy), Duration::from_secs(4));
        assert_eq!(state.failures, 2);
        assert_eq!(state.total_failures, 2);
        assert_eq!(state.wait_at(now), Some(now + Duration::from_secs(4)));
        assert!(state.wait_at(now + Duration::from_secs(4)).is_none());

        assert_eq!(state.record_success(), 2);
        assert_eq!(state.failures, 0);
        assert_eq!(state.total_failures, 2);
        assert!(state.retry_next.is_none());
    }

    #[test]
    fn test_instant_after_saturates() {
        let now = Instant::now();
        assert_eq!(instant_after(now, Duration::from_secs(3)), now + Duration::from_secs(3));
        assert_eq!(instant_after(now, Duration::MAX), now + FAR_FUTURE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_max_delay_does_not_overflow() {
        let policy = RetryPolicy {
            base: 10.0,
            delay: 1e30,
            max_delay: 1e30,
        };
        let mut state = ConnectionAttemptState::default();
        let now = Instant::now();

        assert_eq!(state.record_failure(now, &policy), Duration::MAX);
        assert_eq!(state.wait_at(now), Some(now + FAR_FUTURE));
    }
}
