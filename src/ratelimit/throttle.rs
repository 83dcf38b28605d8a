//! Call-site wrapper that turns rejections into errors.

use std::sync::Arc;
use tracing::{debug, instrument};

use super::backend::RateLimiterBackend;
use super::counter::RateLimitConfig;
use super::key::RateLimitKey;
use super::rules::ActionRules;
use crate::error::{LimiterError, Result};

/// Guards actions behind named quotas.
///
/// A rejected check yields [`LimiterError::RateLimitExceeded`], whose message
/// tells the user how many seconds to wait.
pub struct Throttle<B: RateLimiterBackend> {
    backend: Arc<B>,
    rules: ActionRules,
}

impl<B: RateLimiterBackend> Throttle<B> {
    /// Create a throttle over `backend` using `rules`.
    pub fn new(backend: Arc<B>, rules: ActionRules) -> Self {
        Self { backend, rules }
    }

    /// Check `action` for `subject` against its configured quota.
    #[instrument(skip(self))]
    pub fn check(&self, action: &str, subject: &str) -> Result<()> {
        let config = self
            .rules
            .get(action)
            .copied()
            .ok_or_else(|| LimiterError::UnknownAction(action.to_string()))?;

        self.check_with(&RateLimitKey::new(action, subject), &config)
    }

    /// Check an action shared by all callers against its configured quota.
    pub fn check_global(&self, action: &str) -> Result<()> {
        let config = self
            .rules
            .get(action)
            .copied()
            .ok_or_else(|| LimiterError::UnknownAction(action.to_string()))?;

        self.check_with(&RateLimitKey::global(action), &config)
    }

    /// Check `key` against an inline quota.
    pub fn check_with(&self, key: &RateLimitKey, config: &RateLimitConfig) -> Result<()> {
        let key = key.to_string_key();

        if self.backend.is_allowed(&key, config) {
            return Ok(());
        }

        let retry_after = self.backend.reset_time(&key);
        debug!(
            key = %key,
            retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
            "Request throttled"
        );
        Err(LimiterError::RateLimitExceeded { key, retry_after })
    }

    /// The rules this throttle consults.
    pub fn rules(&self) -> &ActionRules {
        &self.rules
    }

    /// The backend this throttle counts against.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::RateLimiter;
    use tokio_test::{assert_err, assert_ok};

    fn setup() -> (Arc<ManualClock>, Throttle<RateLimiter>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));
        let rules = ActionRules::empty()
            .with_rule("search", RateLimitConfig::per_millis(2, 10_000).unwrap());
        (clock, Throttle::new(limiter, rules))
    }

    #[test]
    fn test_check_within_quota() {
        let (_clock, throttle) = setup();

        assert_ok!(throttle.check("search", "user123"));
        assert_ok!(throttle.check("search", "user123"));
        assert_eq!(throttle.backend().tracked_keys(), 1);
    }

    #[test]
    fn test_check_over_quota_reports_wait() {
        let (clock, throttle) = setup();

        throttle.check("search", "user123").unwrap();
        throttle.check("search", "user123").unwrap();
        clock.advance_ms(2500);

        let err = assert_err!(throttle.check("search", "user123"));
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "Rate limit exceeded. Try again in 8 seconds.");
        match err {
            LimiterError::RateLimitExceeded { key, retry_after } => {
                assert_eq!(key, "search:user123");
                assert_eq!(retry_after.as_millis(), 7500);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sub_millisecond_wait_reports_one_second() {
        let (clock, throttle) = setup();
        let config = RateLimitConfig::per_millis(1, 1000).unwrap();
        let key = RateLimitKey::new("search", "user123");

        assert_ok!(throttle.check_with(&key, &config));
        clock.advance(std::time::Duration::from_micros(999_500));

        let err = assert_err!(throttle.check_with(&key, &config));
        assert_eq!(err.to_string(), "Rate limit exceeded. Try again in 1 seconds.");
        assert_eq!(throttle.backend().reset_time_ms("search:user123"), 1);
    }

    #[test]
    fn test_subjects_are_independent() {
        let (_clock, throttle) = setup();

        throttle.check("search", "a").unwrap();
        throttle.check("search", "a").unwrap();
        assert_err!(throttle.check("search", "a"));
        assert_ok!(throttle.check("search", "b"));
    }

    #[test]
    fn test_global_key_is_shared() {
        let (_clock, throttle) = setup();

        assert_ok!(throttle.check_global("search"));
        assert_ok!(throttle.check_global("search"));
        assert_err!(throttle.check_global("search"));
        // Per-subject keys are counted separately from the global key
        assert_ok!(throttle.check("search", "a"));
    }

    #[test]
    fn test_unknown_action() {
        let (_clock, throttle) = setup();

        let err = assert_err!(throttle.check("upload", "user1"));
        assert!(matches!(err, LimiterError::UnknownAction(ref a) if a == "upload"));
        assert!(!err.is_recoverable());
        assert_eq!(throttle.backend().tracked_keys(), 0);
    }

    #[test]
    fn test_inline_quota() {
        let (clock, throttle) = setup();
        let config = RateLimitConfig::per_millis(1, 1000).unwrap();
        let key = RateLimitKey::new("export", "user1");

        assert_ok!(throttle.check_with(&key, &config));
        assert_err!(throttle.check_with(&key, &config));
        clock.advance_ms(1000);
        assert_ok!(throttle.check_with(&key, &config));
    }
}
