//! Named quota rules per action.
//!
//! Call sites refer to quotas by action name (`search`, `upload`, ...)
//! instead of repeating limits inline. Rules load from YAML:
//!
//! ```yaml
//! actions:
//!   search:
//!     max_requests: 30
//!     window_ms: 60000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::counter::RateLimitConfig;
use crate::error::{LimiterError, Result};

/// Action name for marketplace search.
pub const SEARCH: &str = "search";
/// Action name for file and photo uploads.
pub const UPLOAD: &str = "upload";
/// Action name for sending messages.
pub const MESSAGE: &str = "message";
/// Action name for sign-in and password reset attempts.
pub const AUTH: &str = "auth";

/// A set of quotas keyed by action name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRules {
    /// Map of action name to its quota
    #[serde(default)]
    pub actions: BTreeMap<String, RateLimitConfig>,
}

impl Default for ActionRules {
    fn default() -> Self {
        let mut rules = Self::empty();
        for (action, max_requests, window_ms) in [
            (SEARCH, 30, 60_000),
            (UPLOAD, 10, 60_000),
            (MESSAGE, 20, 60_000),
            (AUTH, 5, 300_000),
        ] {
            if let Ok(config) = RateLimitConfig::per_millis(max_requests, window_ms) {
                rules.actions.insert(action.to_string(), config);
            }
        }
        rules
    }
}

impl ActionRules {
    /// Create a rule set with no actions.
    pub fn empty() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: ActionRules = serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse rate limit rules: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check that every action name can be used as a key prefix.
    pub fn validate(&self) -> Result<()> {
        for action in self.actions.keys() {
            if action.is_empty() {
                return Err(LimiterError::InvalidConfig(
                    "action names must not be empty".to_string(),
                ));
            }
            if action.contains(':') {
                return Err(LimiterError::InvalidConfig(format!(
                    "action '{}' must not contain ':'",
                    action
                )));
            }
        }
        Ok(())
    }

    /// Add or replace the quota for an action.
    pub fn with_rule(mut self, action: &str, config: RateLimitConfig) -> Self {
        self.actions.insert(action.to_string(), config);
        self
    }

    /// Quota configured for an action.
    pub fn get(&self, action: &str) -> Option<&RateLimitConfig> {
        self.actions.get(action)
    }

    /// Overlay `other` on top of these rules; its actions win.
    pub fn merge(mut self, other: ActionRules) -> Self {
        self.actions.extend(other.actions);
        self
    }
}
