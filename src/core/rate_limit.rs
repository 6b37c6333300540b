use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Outbound request throttle shared by every call an adapter makes.
#[derive(Clone)]
pub struct ApiRateLimiter {
    limiter: Arc<DirectRateLimiter>,
}

impl ApiRateLimiter {
    pub fn per_minute(requests: u32) -> Self {
        let n = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        Self::from_quota(Quota::per_minute(n))
    }

    pub fn per_second(requests: u32) -> Self {
        let n = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        Self::from_quota(Quota::per_second(n))
    }

    fn from_quota(quota: Quota) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Waits until one more request fits the quota.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}
