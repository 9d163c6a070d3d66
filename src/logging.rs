//! Structured logging setup.
//!
//! `tracing` events everywhere in the crate carry structured fields
//! (`request_id`, `endpoint`, `stage`, ...). This module installs the global
//! subscriber: an `EnvFilter`, then a JSON (production) or pretty
//! (development) formatter, optionally behind a non-blocking writer.
//!
//! ## Environment Variables
//!
//! | variable | values | default |
//! |---|---|---|
//! | `AUTOROUTE_LOG_LEVEL` | `trace`..`error` | `info` |
//! | `AUTOROUTE_LOG_FORMAT` | `json`, `pretty` | `json` |
//! | `AUTOROUTE_LOG_ASYNC` | `true`/`false` | `false` |
//! | `AUTOROUTE_LOG_TARGET_FILTER` | extra `EnvFilter` directives, comma separated | none |
//! | `AUTOROUTE_LOG_INCLUDE_LOCATION` | `true`/`false` | `false` |
//!
//! `RUST_LOG`, when set, takes precedence over `AUTOROUTE_LOG_LEVEL`.

use anyhow::{Context, Result};
use std::env;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    /// Write through a `tracing-appender` non-blocking buffer
    pub async_logging: bool,
    pub target_filter: Option<String>,
    pub include_location: bool,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("AUTOROUTE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: LogFormat::parse(
                &env::var("AUTOROUTE_LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
            ),
            async_logging: env_flag("AUTOROUTE_LOG_ASYNC", false),
            target_filter: env::var("AUTOROUTE_LOG_TARGET_FILTER").ok(),
            include_location: env_flag("AUTOROUTE_LOG_INCLUDE_LOCATION", false),
        }
    }

    /// Verbose, human-readable settings for local runs
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            async_logging: false,
            target_filter: None,
            include_location: true,
        }
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));
        // Client disconnects are reported by may_minihttp at info/debug
        if let Ok(directive) = "may_minihttp=warn".parse() {
            filter = filter.add_directive(directive);
        }
        if let Some(targets) = &self.target_filter {
            for directive in targets.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                match directive.parse() {
                    Ok(d) => filter = filter.add_directive(d),
                    Err(_) => eprintln!("Warning: invalid log filter directive: {directive}"),
                }
            }
        }
        filter
    }
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    if config.async_logging {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        let fmt_layer = match config.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(writer)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(writer)
                .boxed(),
        };
        registry
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize async logging")?;
        // Lives for the rest of the process; dropping it would stop the writer
        std::mem::forget(guard);
    } else {
        let fmt_layer = match config.format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .boxed(),
        };
        registry
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize logging")?;
    }
    Ok(())
}
