//! End-to-end behaviour of the fixed-window limiter through the public API.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use csibiza_limiter::error::LimiterError;
use csibiza_limiter::ratelimit::{
    rules, ActionRules, LimiterOptions, ManualClock, RateLimitConfig, RateLimiter, Throttle,
};

fn manual_limiter() -> (Arc<ManualClock>, RateLimiter) {
    let clock = Arc::new(ManualClock::new());
    let limiter = RateLimiter::with_clock(clock.clone());
    (clock, limiter)
}

#[test]
fn first_m_requests_admitted_then_rejected() {
    let (_clock, limiter) = manual_limiter();

    for max in [1u32, 2, 5, 17] {
        let config = RateLimitConfig::per_millis(max, 10_000).unwrap();
        let key = format!("search:user{}", max);

        for _ in 0..max {
            assert!(limiter.is_allowed(&key, &config));
        }
        assert!(!limiter.is_allowed(&key, &config));
    }
}

#[test]
fn documented_scenario() {
    let (clock, limiter) = manual_limiter();
    let config = RateLimitConfig::per_millis(3, 1000).unwrap();

    assert!(limiter.is_allowed("x", &config));
    let reset = limiter.reset_time_ms("x");
    assert!(reset <= 1000 && reset > 990);

    clock.advance_ms(10);
    assert!(limiter.is_allowed("x", &config));
    clock.advance_ms(10);
    assert!(limiter.is_allowed("x", &config));
    clock.advance_ms(10);
    assert!(!limiter.is_allowed("x", &config));

    clock.advance_ms(1020);
    assert!(limiter.is_allowed("x", &config));
    assert_eq!(limiter.remaining("x", &config), 2);
}

#[test]
fn clear_all_resets_every_key() {
    let (_clock, limiter) = manual_limiter();
    let config = RateLimitConfig::per_millis(1, 60_000).unwrap();
    let keys = ["search:a", "upload:a", "message:b"];

    for key in keys {
        assert!(limiter.is_allowed(key, &config));
        assert!(!limiter.is_allowed(key, &config));
    }

    limiter.clear_all();
    for key in keys {
        assert_eq!(limiter.reset_time_ms(key), 0);
        assert!(limiter.is_allowed(key, &config));
    }
}

#[test]
fn throttle_with_default_presets() {
    let clock = Arc::new(ManualClock::new());
    let limiter = Arc::new(RateLimiter::with_clock(clock.clone()));
    let throttle = Throttle::new(limiter.clone(), ActionRules::default());

    for _ in 0..5 {
        throttle.check(rules::AUTH, "user42").unwrap();
    }

    clock.advance(Duration::from_secs(60));
    let err = throttle.check(rules::AUTH, "user42").unwrap_err();
    assert_eq!(err.to_string(), "Rate limit exceeded. Try again in 240 seconds.");
    assert_eq!(err.retry_after(), Some(Duration::from_secs(240)));

    clock.advance(Duration::from_secs(240));
    assert!(throttle.check(rules::AUTH, "user42").is_ok());
}

#[test]
fn throttle_rules_from_yaml() {
    let yaml = r#"
actions:
  search:
    max_requests: 2
    window_ms: 1500
"#;
    let rules = ActionRules::default().merge(ActionRules::from_yaml(yaml).unwrap());
    let clock = Arc::new(ManualClock::new());
    let throttle = Throttle::new(Arc::new(RateLimiter::with_clock(clock.clone())), rules);

    throttle.check("search", "u").unwrap();
    throttle.check("search", "u").unwrap();
    clock.advance_ms(499);
    match throttle.check("search", "u") {
        Err(LimiterError::RateLimitExceeded { retry_after, .. }) => {
            assert_eq!(retry_after, Duration::from_millis(1001));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(
        throttle.check("search", "u").unwrap_err().to_string(),
        "Rate limit exceeded. Try again in 2 seconds."
    );
}

#[test]
fn bounded_limiter_never_exceeds_max_keys() {
    let clock = Arc::new(ManualClock::new());
    let limiter = RateLimiter::with_options(LimiterOptions { max_keys: Some(100) }, clock.clone());
    let config = RateLimitConfig::per_millis(3, 5000).unwrap();

    for i in 0..1000 {
        assert!(limiter.is_allowed(&format!("search:user{}", i), &config));
        assert!(limiter.tracked_keys() <= 100);
        clock.advance_ms(1);
    }
    assert_eq!(limiter.tracked_keys(), 100);
}

#[test]
fn concurrent_callers_never_exceed_quota() {
    let limiter = Arc::new(RateLimiter::new());
    let config = RateLimitConfig::per_millis(100, 60_000).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = limiter.clone();
            thread::spawn(move || {
                (0..50)
                    .filter(|_| limiter.is_allowed("message:shared", &config))
                    .count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 100);
}
