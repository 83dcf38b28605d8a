//! Error types for the limiter crate.

use std::time::Duration;
use thiserror::Error;

/// Main error type for limiter operations.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A quota that fails validation (zero requests or zero window)
    #[error("Invalid rate limit: {0}")]
    InvalidConfig(String),

    /// No rule is configured for the requested action
    #[error("No rate limit rule for action '{0}'")]
    UnknownAction(String),

    /// The request was rejected; the caller may retry after `retry_after`.
    #[error("Rate limit exceeded. Try again in {} seconds.", retry_after_secs(.retry_after))]
    RateLimitExceeded { key: String, retry_after: Duration },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LimiterError {
    /// Whether the caller can recover by waiting and retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LimiterError::RateLimitExceeded { .. })
    }

    /// Time to wait before retrying, for rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LimiterError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Whole seconds until retry, rounded up so any wait reports at least one.
pub fn retry_after_secs(retry_after: &Duration) -> u64 {
    let secs = retry_after.as_nanos().div_ceil(1_000_000_000);
    u64::try_from(secs).unwrap_or(u64::MAX)
}

impl From<config::ConfigError> for LimiterError {
    fn from(err: config::ConfigError) -> Self {
        LimiterError::Config(err.to_string())
    }
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
