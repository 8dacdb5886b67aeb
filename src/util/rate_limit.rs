//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Max move/fire requests per second from one peer
pub const INTENT_RATE_LIMIT: u32 = 60;

/// Per-peer rate limiter for gameplay intents
#[derive(Clone)]
pub struct PeerRateLimiter {
    intent_limiter: Arc<Limiter>,
}

impl PeerRateLimiter {
    pub fn new() -> Self {
        Self::with_rate(INTENT_RATE_LIMIT)
    }

    pub fn with_rate(requests_per_second: u32) -> Self {
        Self {
            intent_limiter: create_limiter(requests_per_second),
        }
    }

    /// Check if an intent is allowed (returns true if allowed)
    pub fn check_intent(&self) -> bool {
        self.intent_limiter.check().is_ok()
    }
}

impl Default for PeerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PeerRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRateLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_beyond_quota_is_refused() {
        let limiter = PeerRateLimiter::with_rate(5);
        let allowed = (0..20).filter(|_| limiter.check_intent()).count();
        assert_eq!(allowed, 5);
    }

    #[test]
    fn clones_share_the_budget() {
        let limiter = PeerRateLimiter::with_rate(1);
        let clone = limiter.clone();
        assert!(limiter.check_intent());
        assert!(!clone.check_intent());
    }
}
