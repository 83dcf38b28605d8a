//! Rate limiter trait for abstracting limiter implementations.

use std::sync::Arc;
use std::time::Duration;

use super::counter::RateLimitConfig;

/// Trait for rate limiter implementations.
///
/// [`Throttle`](super::Throttle) works against this trait rather than the
/// concrete [`RateLimiter`](super::RateLimiter), so hosts can substitute
/// their own store.
pub trait RateLimiterBackend: Send + Sync {
    /// Decide whether a request for `key` may proceed, counting it if so.
    fn is_allowed(&self, key: &str, config: &RateLimitConfig) -> bool;

    /// Time left until `key`'s window resets.
    fn reset_time(&self, key: &str) -> Duration;
}

impl<T: RateLimiterBackend + ?Sized> RateLimiterBackend for Arc<T> {
    fn is_allowed(&self, key: &str, config: &RateLimitConfig) -> bool {
        (**self).is_allowed(key, config)
    }

    fn reset_time(&self, key: &str) -> Duration {
        (**self).reset_time(key)
    }
}
