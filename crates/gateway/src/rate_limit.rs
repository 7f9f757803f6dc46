//! Minimum-interval gate for weight emission.
//!
//! One cell per period: the first check passes, every check until the
//! period has elapsed is refused.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter as GovLimiter};

type DirectLimiter =
    GovLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

#[derive(Debug, Clone)]
pub struct EmissionGate {
    limiter: Arc<DirectLimiter>,
    period: Duration,
}

impl EmissionGate {
    /// Allow one emission per `period` (clamped to at least one second).
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_secs(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_hour(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);

        Self {
            limiter: Arc::new(GovLimiter::direct(quota)),
            period,
        }
    }

    pub fn from_secs(min_interval_secs: u64) -> Self {
        Self::new(Duration::from_secs(min_interval_secs))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Take the slot if it is free. Returns true if acquired.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_emission_within_period_is_refused() {
        let gate = EmissionGate::from_secs(1200);
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert!(!gate.try_acquire());
    }

    #[test]
    fn clones_share_the_slot() {
        let gate = EmissionGate::from_secs(60);
        let other = gate.clone();
        assert!(other.try_acquire());
        assert!(!gate.try_acquire());
    }

    #[test]
    fn zero_period_is_clamped() {
        assert_eq!(EmissionGate::from_secs(0).period(), Duration::from_secs(1));
    }
}
