//! Quota configuration and per-key request records.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::{LimiterError, Result};

/// A request quota: at most `max_requests` per fixed window.
///
/// Construction validates both fields, so a quota in hand always has a
/// non-zero request count and a window of a whole, non-zero number of
/// milliseconds that fits in a `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRateLimitConfig", into = "RawRateLimitConfig")]
pub struct RateLimitConfig {
    max_requests: u32,
    window_ms: u64,
}

impl RateLimitConfig {
    /// Create a quota from a window duration.
    ///
    /// The window must be a whole number of milliseconds, at least one and
    /// at most `u64::MAX`.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        if window.subsec_nanos() % 1_000_000 != 0 {
            return Err(LimiterError::InvalidConfig(format!(
                "window {:?} is not a whole number of milliseconds",
                window
            )));
        }
        let window_ms = u64::try_from(window.as_millis()).map_err(|_| {
            LimiterError::InvalidConfig(format!("window {:?} is too long", window))
        })?;
        Self::per_millis(max_requests, window_ms)
    }

    /// Create a quota with the window given in milliseconds.
    pub fn per_millis(max_requests: u32, window_ms: u64) -> Result<Self> {
        if max_requests == 0 {
            return Err(LimiterError::InvalidConfig(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if window_ms == 0 {
            return Err(LimiterError::InvalidConfig(
                "window must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window_ms,
        })
    }

    /// Maximum admitted requests per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of the window.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Length of the window in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}

/// Wire shape of a quota as it appears in rule files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawRateLimitConfig {
    max_requests: u32,
    window_ms: u64,
}

impl TryFrom<RawRateLimitConfig> for RateLimitConfig {
    type Error = LimiterError;

    fn try_from(raw: RawRateLimitConfig) -> Result<Self> {
        RateLimitConfig::per_millis(raw.max_requests, raw.window_ms)
    }
}

impl From<RateLimitConfig> for RawRateLimitConfig {
    fn from(config: RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window_ms: config.window_ms,
        }
    }
}

/// Requests seen for one key in its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRecord {
    /// Admitted requests in this window
    pub count: u32,
    /// When the window closes
    pub reset_at: Instant,
}

impl RequestRecord {
    /// Open a new window at `now` with one admitted request.
    ///
    /// A window reaching past the furthest representable instant is
    /// shortened until it fits.
    pub fn open(now: Instant, window: Duration) -> Self {
        let mut window = window;
        let reset_at = loop {
            if let Some(at) = now.checked_add(window) {
                break at;
            }
            window /= 2;
        };
        Self { count: 1, reset_at }
    }

    /// Whether the window has closed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_at
    }

    /// Time left in the window, zero once it has closed.
    pub fn time_until_reset(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }
}
