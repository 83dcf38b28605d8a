use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use csibiza_limiter::config::{AppConfig, LogFormat};
use csibiza_limiter::error::LimiterError;
use csibiza_limiter::ratelimit::{
    spawn_sweeper, ActionRules, RateLimitKey, RateLimiter, SystemClock, Throttle,
};

#[derive(Parser, Debug)]
#[command(name = "csibiza-limiter")]
#[command(about = "Inspect and exercise CS Ibiza request limits", version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log filter, overrides the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format, overrides the configured format
    #[arg(long, global = true, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse and validate a rules file, then list its actions
    Validate {
        /// Rules file (YAML)
        #[arg(short, long)]
        rules: String,
    },
    /// Send a burst of requests through a fresh limiter and print each decision
    Replay {
        /// Action to throttle
        #[arg(short, long)]
        action: String,

        /// Caller identity; omit for a key shared by all callers
        #[arg(short, long)]
        subject: Option<String>,

        /// Number of requests to send
        #[arg(short = 'n', long, default_value_t = 10)]
        requests: u32,

        /// Delay between requests in milliseconds
        #[arg(short, long, default_value_t = 0)]
        interval_ms: u64,

        /// Rules file layered over the built-in presets
        #[arg(short, long)]
        rules: Option<String>,

        /// Print decisions as JSON lines
        #[arg(long)]
        json: bool,
    },
}

/// One replayed request and its outcome.
#[derive(Debug, Serialize)]
struct Decision {
    request: u32,
    key: String,
    allowed: bool,
    reset_ms: u64,
    message: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => AppConfig::from_env().context("failed to load configuration")?,
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    init_tracing(&config);
    info!(version = env!("CARGO_PKG_VERSION"), "csibiza-limiter starting");

    match cli.command {
        Command::Validate { rules } => validate(&rules),
        Command::Replay {
            action,
            subject,
            requests,
            interval_ms,
            rules,
            json,
        } => {
            if let Some(path) = rules {
                config.rules_path = Some(path);
            }
            replay(&config, &action, subject.as_deref(), requests, interval_ms, json).await
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    match s.to_ascii_lowercase().as_str() {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format '{}', expected text or json", other)),
    }
}

fn validate(path: &str) -> anyhow::Result<()> {
    let rules = ActionRules::from_file(path)
        .with_context(|| format!("invalid rules file {}", path))?;

    println!("{}: {} action(s)", path, rules.actions.len());
    for (action, limit) in &rules.actions {
        println!(
            "  {:<12} {} request(s) per {} ms",
            action,
            limit.max_requests(),
            limit.window_ms()
        );
    }
    Ok(())
}

async fn replay(
    config: &AppConfig,
    action: &str,
    subject: Option<&str>,
    requests: u32,
    interval_ms: u64,
    json: bool,
) -> anyhow::Result<()> {
    let rules = config.load_rules()?;
    let limiter = Arc::new(RateLimiter::with_options(
        config.limiter_options(),
        Arc::new(SystemClock),
    ));
    let sweeper = config
        .sweep_interval()
        .map(|interval| spawn_sweeper(limiter.clone(), interval));
    let throttle = Throttle::new(limiter.clone(), rules);

    let key = match subject {
        Some(subject) => RateLimitKey::new(action, subject),
        None => RateLimitKey::global(action),
    };
    info!(key = %key, requests = requests, interval_ms = interval_ms, "Replaying requests");

    let mut admitted = 0;
    for request in 1..=requests {
        let decision = decide(&throttle, action, subject, request)?;
        if decision.allowed {
            admitted += 1;
        }
        println!("{}", format_decision(&decision, json)?);

        if interval_ms > 0 && request < requests {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }

    info!(admitted = admitted, rejected = requests - admitted, "Replay finished");

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }
    Ok(())
}

/// Send one request through `throttle` and record the outcome.
///
/// Rejections become decisions; any other error aborts the replay.
fn decide(
    throttle: &Throttle<RateLimiter>,
    action: &str,
    subject: Option<&str>,
    request: u32,
) -> anyhow::Result<Decision> {
    let (key, outcome) = match subject {
        Some(subject) => (RateLimitKey::new(action, subject), throttle.check(action, subject)),
        None => (RateLimitKey::global(action), throttle.check_global(action)),
    };

    let (allowed, message) = match outcome {
        Ok(()) => (true, None),
        Err(err @ LimiterError::RateLimitExceeded { .. }) => (false, Some(err.to_string())),
        Err(err) => return Err(err.into()),
    };

    let key = key.to_string_key();
    Ok(Decision {
        request,
        reset_ms: throttle.backend().reset_time_ms(&key),
        key,
        allowed,
        message,
    })
}

fn format_decision(decision: &Decision, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string(decision)?);
    }

    let verdict = if decision.allowed { "allowed" } else { "rejected" };
    let line = match &decision.message {
        Some(message) => format!(
            "#{:<4} {:<24} {:<8} reset in {} ms ({})",
            decision.request, decision.key, verdict, decision.reset_ms, message
        ),
        None => format!(
            "#{:<4} {:<24} {:<8} reset in {} ms",
            decision.request, decision.key, verdict, decision.reset_ms
        ),
    };
    Ok(line)
}
