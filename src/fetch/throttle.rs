//! Request throttling for page fetchers
//!
//! Token bucket built on governor. Scrolling fast through a long list can
//! fire page requests back to back; the throttle spaces them out.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Token bucket shared by all requests of one fetcher
#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<DirectLimiter>,
    per_second: NonZeroU32,
}

impl Throttle {
    /// Allow `requests_per_second` requests, bursting up to the same amount.
    /// Zero is treated as one.
    pub fn per_second(requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            per_second,
        }
    }

    /// Configured rate
    pub fn rate(&self) -> u32 {
        self.per_second.get()
    }

    /// Wait until a request may be sent
    pub async fn acquire(&self) {
        if !self.try_acquire() {
            debug!(per_second = self.rate(), "Throttling page request");
            self.limiter.until_ready().await;
        }
    }

    /// Take a permit without waiting
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("per_second", &self.per_second)
            .finish()
    }
}
