use std::time::Duration;

/// Trait for defining reconnection backoff policies
///
/// Implement this trait to control how the connection manager schedules
/// reconnection attempts after a transport failure.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - The reconnection attempt number (0-indexed)
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&self, attempt: usize) -> Option<Duration>;

    /// Check if another reconnection attempt should be scheduled
    fn should_reconnect(&self, attempt: usize) -> bool;
}

/// Exponential backoff reconnection policy
///
/// Delays grow geometrically: `base × growth_factor^attempt`, capped at
/// `cap`. The attempt counter is owned by the connection manager and reset
/// to zero on every successful open, so the first delay after any healthy
/// connection is always `base`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    growth_factor: f64,
    cap: Duration,
    max_attempts: Option<usize>,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff policy
    ///
    /// # Arguments
    /// * `base` - Delay before the first reconnect
    /// * `growth_factor` - Multiplier applied per attempt (must be ≥ 1.0)
    /// * `cap` - Upper bound on any single delay
    /// * `max_attempts` - Maximum number of attempts (None = unlimited)
    pub fn new(
        base: Duration,
        growth_factor: f64,
        cap: Duration,
        max_attempts: Option<usize>,
    ) -> Self {
        Self {
            base,
            growth_factor: growth_factor.max(1.0),
            cap,
            max_attempts,
        }
    }
}

impl Default for ExponentialBackoff {
    /// 2s base, 1.5 growth, 30s cap, 5 attempts
    fn default() -> Self {
        Self::new(
            Duration::from_millis(2000),
            1.5,
            Duration::from_millis(30_000),
            Some(5),
        )
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }

        let exponent = attempt.min(u16::MAX as usize) as i32;
        let millis = self.base.as_millis() as f64 * self.growth_factor.powi(exponent);
        let millis = millis.min(self.cap.as_millis() as f64);
        Some(Duration::from_millis(millis as u64))
    }

    fn should_reconnect(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

/// Fixed delay reconnection policy
///
/// Always waits the same amount of time between reconnection attempts.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    /// Create a new fixed delay policy
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if !self.should_reconnect(attempt) {
            return None;
        }
        Some(self.delay)
    }

    fn should_reconnect(&self, attempt: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

/// Never reconnect policy
///
/// The first transport failure is terminal.
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: usize) -> Option<Duration> {
        None
    }

    fn should_reconnect(&self, _attempt: usize) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_starts_at_base() {
        let policy = ExponentialBackoff::default();
        assert_eq!(
            policy.next_delay(0),
            Some(Duration::from_millis(2000)),
            "attempt 0 must use the base delay"
        );
    }

    #[test]
    fn default_policy_grows_by_factor() {
        let policy = ExponentialBackoff::default();
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(3000)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(4500)));
    }

    #[test]
    fn delays_are_monotonically_non_decreasing() {
        let policy = ExponentialBackoff::new(
            Duration::from_millis(2000),
            1.5,
            Duration::from_millis(30_000),
            None,
        );

        let mut previous = Duration::ZERO;
        for attempt in 0..=10 {
            let delay = policy.next_delay(attempt).unwrap();
            assert!(
                delay >= previous,
                "delay shrank at attempt {attempt}: {delay:?} < {previous:?}"
            );
            previous = delay;
        }
    }

    #[test]
    fn delay_is_capped() {
        let policy = ExponentialBackoff::new(
            Duration::from_millis(2000),
            1.5,
            Duration::from_millis(30_000),
            None,
        );

        // 2000 × 1.5^10 ≈ 115k ms, well past the cap
        assert_eq!(policy.next_delay(10), Some(Duration::from_millis(30_000)));
        assert_eq!(policy.next_delay(50), Some(Duration::from_millis(30_000)));
    }

    #[test]
    fn stops_after_max_attempts() {
        let policy = ExponentialBackoff::default();

        for attempt in 0..5 {
            assert!(policy.next_delay(attempt).is_some());
        }
        assert!(policy.next_delay(5).is_none(), "attempt cap is 5");
        assert!(!policy.should_reconnect(5));
    }

    #[test]
    fn fixed_delay_is_constant() {
        let policy = FixedDelay::new(Duration::from_millis(750), None);
        for attempt in 0..20 {
            assert_eq!(policy.next_delay(attempt), Some(Duration::from_millis(750)));
        }
    }

    #[test]
    fn fixed_delay_honors_max_attempts() {
        let policy = FixedDelay::new(Duration::from_millis(10), Some(3));
        assert!(policy.next_delay(2).is_some());
        assert!(policy.next_delay(3).is_none());
    }

    #[test]
    fn never_reconnect_always_refuses() {
        let policy = NeverReconnect;
        for attempt in 0..10 {
            assert!(policy.next_delay(attempt).is_none());
            assert!(!policy.should_reconnect(attempt));
        }
    }
}
