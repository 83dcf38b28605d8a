//! Core rate limiter implementation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::counter::{RateLimitConfig, RequestRecord};

/// Tuning knobs for a [`RateLimiter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterOptions {
    /// Upper bound on tracked keys. `None` leaves the map unbounded.
    pub max_keys: Option<usize>,
}

/// Fixed-window request limiter keyed by opaque strings.
///
/// Each key owns one [`RequestRecord`]. The first request opens a window of
/// the configured length; requests inside the window are counted until the
/// quota is reached, after which they are rejected until the window closes.
/// A burst at the end of one window followed by a burst at the start of the
/// next is admitted in full.
///
/// This struct is thread-safe and can be shared across tasks. It is not a
/// security boundary: state lives in this process only.
pub struct RateLimiter {
    /// Request records indexed by key
    records: Mutex<HashMap<String, RequestRecord>>,
    clock: Arc<dyn Clock>,
    options: LimiterOptions,
}

impl RateLimiter {
    /// Create an unbounded rate limiter on the system clock.
    pub fn new() -> Self {
        Self::with_options(LimiterOptions::default(), Arc::new(SystemClock))
    }

    /// Create an unbounded rate limiter reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_options(LimiterOptions::default(), clock)
    }

    /// Create a rate limiter with explicit options.
    pub fn with_options(options: LimiterOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
            options,
        }
    }

    /// Decide whether a request for `key` may proceed under `config`.
    ///
    /// Admitted requests are counted; a rejection leaves the record as is.
    pub fn is_allowed(&self, key: &str, config: &RateLimitConfig) -> bool {
        let now = self.clock.now();
        let mut records = self.records.lock();

        if let Some(record) = records.get_mut(key) {
            if record.is_expired(now) {
                debug!(key = %key, "Window elapsed, opening a new one");
                *record = RequestRecord::open(now, config.window());
                return true;
            }

            if record.count < config.max_requests() {
                record.count += 1;
                trace!(
                    key = %key,
                    count = record.count,
                    limit = config.max_requests(),
                    "Request admitted"
                );
                return true;
            }

            debug!(
                key = %key,
                count = record.count,
                limit = config.max_requests(),
                "Rate limit exceeded"
            );
            return false;
        }

        if let Some(max_keys) = self.options.max_keys {
            make_room(&mut records, now, max_keys);
        }

        trace!(
            key = %key,
            window_ms = config.window_ms(),
            "Creating new request record"
        );
        records.insert(key.to_string(), RequestRecord::open(now, config.window()));
        true
    }

    /// Time left until `key`'s window resets, zero if unknown or elapsed.
    pub fn reset_time(&self, key: &str) -> Duration {
        let now = self.clock.now();
        let records = self.records.lock();
        records
            .get(key)
            .map(|r| r.time_until_reset(now))
            .unwrap_or(Duration::ZERO)
    }

    /// [`reset_time`](Self::reset_time) in milliseconds, rounded up.
    ///
    /// Only an unknown or elapsed window reports zero.
    pub fn reset_time_ms(&self, key: &str) -> u64 {
        let millis = self.reset_time(key).as_nanos().div_ceil(1_000_000);
        u64::try_from(millis).unwrap_or(u64::MAX)
    }

    /// Requests still admissible for `key` in its current window.
    pub fn remaining(&self, key: &str, config: &RateLimitConfig) -> u32 {
        let now = self.clock.now();
        let records = self.records.lock();
        match records.get(key) {
            Some(record) if !record.is_expired(now) => {
                config.max_requests().saturating_sub(record.count)
            }
            _ => config.max_requests(),
        }
    }

    /// Forget `key`; its next request opens a fresh window.
    pub fn clear(&self, key: &str) {
        if self.records.lock().remove(key).is_some() {
            debug!(key = %key, "Cleared request record");
        }
    }

    /// Forget every key.
    pub fn clear_all(&self) {
        let mut records = self.records.lock();
        debug!(count = records.len(), "Clearing all request records");
        records.clear();
    }

    /// Number of keys currently tracked, expired or not.
    pub fn tracked_keys(&self) -> usize {
        self.records.lock().len()
    }

    /// Drop every record whose window has closed.
    ///
    /// An expired record behaves exactly like an absent one, so this never
    /// changes a decision. Returns the number of records removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        before - records.len()
    }

    /// The options this limiter was built with.
    pub fn options(&self) -> LimiterOptions {
        self.options
    }
}

/// Shrink `records` below `max_keys` before a new key is inserted.
///
/// Expired records go first; if that is not enough, the records closest to
/// their reset are evicted.
fn make_room(records: &mut HashMap<String, RequestRecord>, now: Instant, max_keys: usize) {
    if records.len() < max_keys {
        return;
    }

    let before = records.len();
    records.retain(|_, r| !r.is_expired(now));
    if records.len() < before {
        debug!(removed = before - records.len(), "Swept expired records at capacity");
    }

    while records.len() >= max_keys {
        let Some(key) = records
            .iter()
            .min_by_key(|(_, r)| r.reset_at)
            .map(|(k, _)| k.clone())
        else {
            break;
        };

        records.remove(&key);
        debug!(key = %key, max_keys = max_keys, "Evicted record at capacity");
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterBackend for RateLimiter {
    fn is_allowed(&self, key: &str, config: &RateLimitConfig) -> bool {
        RateLimiter::is_allowed(self, key, config)
    }

    fn reset_time(&self, key: &str) -> Duration {
        RateLimiter::reset_time(self, key)
    }
}
