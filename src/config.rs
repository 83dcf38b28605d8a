//! Configuration management for the limiter.
//!
//! Settings come from an optional YAML file, overlaid with `CSIBIZA_`
//! environment variables (`CSIBIZA_LIMITER__MAX_KEYS=5000`).

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LimiterError, Result};
use crate::ratelimit::{ActionRules, LimiterOptions};

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "CSIBIZA";

/// Main configuration for the limiter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Limiter store configuration
    #[serde(default)]
    pub limiter: LimiterSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Path to an action rules file layered over the built-in presets
    #[serde(default)]
    pub rules_path: Option<String>,
}

/// Limiter store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Maximum number of tracked keys; unbounded when absent
    #[serde(default)]
    pub max_keys: Option<usize>,

    /// Interval between sweeps of expired records, 0 disables sweeping
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            max_keys: None,
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60_000
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl AppConfig {
    /// Load configuration from a file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::build(Some(path))
    }

    /// Load configuration from environment overrides only.
    pub fn from_env() -> Result<Self> {
        Self::build(None)
    }

    /// Load configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn build(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let config: AppConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.max_keys == Some(0) {
            return Err(LimiterError::Config(
                "limiter.max_keys must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Options for constructing a [`RateLimiter`](crate::ratelimit::RateLimiter).
    pub fn limiter_options(&self) -> LimiterOptions {
        LimiterOptions {
            max_keys: self.limiter.max_keys,
        }
    }

    /// Sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.limiter.sweep_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Built-in presets, overlaid with the rules file if one is configured.
    pub fn load_rules(&self) -> Result<ActionRules> {
        let defaults = ActionRules::default();
        match &self.rules_path {
            Some(path) => Ok(defaults.merge(ActionRules::from_file(path)?)),
            None => Ok(defaults),
        }
    }
}
