//! Reconnect backoff policy for account supervisors.
//!
//! Exponential growth from a base delay up to a hard cap, with full ±jitter
//! so a fleet of supervisors reconnecting after a shared outage does not
//! thundering-herd the remote endpoint. A connected period longer than the
//! stability window resets the attempt counter, so transient flaps never
//! accumulate into permanent maximum backoff.

use std::time::Duration;

use rand::Rng;

/// Backoff configuration for one supervisor's reconnect loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// First retry delay.
    pub base: Duration,
    /// Upper bound on any retry delay (before jitter).
    pub cap: Duration,
    /// Multiplier applied per failed attempt.
    pub factor: u32,
    /// Jitter fraction applied symmetrically (0.25 = ±25%).
    pub jitter: f64,
    /// Connected duration after which the attempt counter resets.
    pub stability_window: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            factor: 2,
            jitter: 0.25,
            stability_window: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Deterministic delay for the given attempt (0-based), before jitter.
    ///
    /// Monotonically non-decreasing in `attempt` and always `<= cap`.
    #[must_use]
    pub fn raw_delay_for(&self, attempt: u32) -> Duration {
        let factor = self.factor.max(1);
        let mut delay = self.base;
        for _ in 0..attempt {
            match delay.checked_mul(factor) {
                Some(d) if d < self.cap => delay = d,
                _ => return self.cap,
            }
        }
        delay.min(self.cap)
    }

    /// Delay for the given attempt with jitter applied.
    ///
    /// Jitter is symmetric around the raw delay and clamped to the cap, so
    /// the result never exceeds `cap * (1 + jitter)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.raw_delay_for(attempt);
        if self.jitter <= 0.0 {
            return raw;
        }
        let spread = raw.as_secs_f64() * self.jitter;
        let offset = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((raw.as_secs_f64() + offset).max(0.0))
    }

    /// Whether a connected period was long enough to reset the attempt
    /// counter back to the base delay.
    #[must_use]
    pub fn is_stable(&self, connected_for: Duration) -> bool {
        connected_for >= self.stability_window
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_attempt_uses_base_delay() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.raw_delay_for(0), Duration::from_secs(1));
    }

    #[test]
    fn delays_double_until_the_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.raw_delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.raw_delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.raw_delay_for(5), Duration::from_secs(32));
        assert_eq!(policy.raw_delay_for(6), Duration::from_secs(60));
        assert_eq!(policy.raw_delay_for(100), Duration::from_secs(60));
    }

    #[test]
    fn stability_window_gates_reset() {
        let policy = ReconnectPolicy::default();
        assert!(!policy.is_stable(Duration::from_secs(29)));
        assert!(policy.is_stable(Duration::from_secs(30)));
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = ReconnectPolicy {
            jitter: 0.0,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(3), policy.raw_delay_for(3));
    }

    proptest! {
        #[test]
        fn raw_delay_is_monotonic_and_capped(a in 0u32..64, b in 0u32..64) {
            let policy = ReconnectPolicy::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(policy.raw_delay_for(lo) <= policy.raw_delay_for(hi));
            prop_assert!(policy.raw_delay_for(hi) <= policy.cap);
        }

        #[test]
        fn jittered_delay_is_bounded(attempt in 0u32..64) {
            let policy = ReconnectPolicy::default();
            let raw = policy.raw_delay_for(attempt).as_secs_f64();
            let jittered = policy.delay_for(attempt).as_secs_f64();
            prop_assert!(jittered >= raw * (1.0 - policy.jitter) - f64::EPSILON);
            prop_assert!(jittered <= raw * (1.0 + policy.jitter) + f64::EPSILON);
        }
    }
}
