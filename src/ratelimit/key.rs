//! Key generation for throttled actions.

use crate::error::{LimiterError, Result};

/// A key that identifies the scope being throttled.
///
/// Keys are composed of an action and an optional subject (usually a user
/// id), rendered as `action:subject`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The throttled action, e.g. `search`
    pub action: String,
    /// Who is performing it, if the limit is per caller
    pub subject: Option<String>,
}

impl RateLimitKey {
    /// Create a per-subject key for an action.
    pub fn new(action: &str, subject: &str) -> Self {
        Self {
            action: action.to_string(),
            subject: Some(subject.to_string()),
        }
    }

    /// Create a key shared by every caller of an action.
    pub fn global(action: &str) -> Self {
        Self {
            action: action.to_string(),
            subject: None,
        }
    }

    /// Parse a rendered key back into its parts.
    ///
    /// The first `:` separates action from subject; subjects may contain
    /// further colons.
    pub fn parse(key: &str) -> Result<Self> {
        let (action, subject) = match key.split_once(':') {
            Some((action, subject)) => (action, Some(subject)),
            None => (key, None),
        };

        if action.is_empty() {
            return Err(LimiterError::InvalidConfig(format!(
                "rate limit key '{}' has an empty action",
                key
            )));
        }

        Ok(Self {
            action: action.to_string(),
            subject: subject.map(str::to_string),
        })
    }

    /// Render the key as the string stored by the limiter.
    pub fn to_string_key(&self) -> String {
        match &self.subject {
            Some(subject) => format!("{}:{}", self.action, subject),
            None => self.action.clone(),
        }
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
