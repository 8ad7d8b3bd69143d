//! Logging System
//!
//! Structured logging using the `tracing` crate. The engine reports transient
//! failures, retries and cleanup problems through `tracing` events; this
//! module only decides where those events go.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{ConfigError, ConfigResult};

/// Environment variable holding a full filter directive, e.g. `txguard=debug`.
pub const LOG_ENV: &str = "TXGUARD_LOG";

/// Environment variable overriding the output format.
pub const LOG_FORMAT_ENV: &str = "TXGUARD_LOG_FORMAT";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Enable colored output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        parse_format(&self.format)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

fn parse_format(format: &str) -> ConfigResult<Format> {
    match format {
        "text" => Ok(Format::Text),
        "json" => Ok(Format::Json),
        other => Err(ConfigError::Invalid(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            other
        ))),
    }
}

/// Initialize the logging system
///
/// Priority order (highest to lowest):
/// 1. Environment variables (`TXGUARD_LOG`, `TXGUARD_LOG_FORMAT`)
/// 2. Configuration
/// 3. Defaults
///
/// Logs go to stderr so the REPL's stdout stays clean.
pub fn init_logging(config: Option<&LoggingConfig>) -> ConfigResult<()> {
    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let use_color = config.map(|c| c.color).unwrap_or(true);

    let base_subscriber = Registry::default().with(filter);

    let result = match format {
        Format::Json => base_subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        Format::Text => base_subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| ConfigError::Invalid(format!("Failed to install logger: {}", e)))
}

/// Build environment filter from config or environment variables
fn build_env_filter(config: Option<&LoggingConfig>) -> ConfigResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    filter_from_config(config)
}

fn filter_from_config(config: Option<&LoggingConfig>) -> ConfigResult<EnvFilter> {
    let level = config.map(|c| c.level.as_str()).unwrap_or("info");

    if level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::try_new(level)
        .map_err(|e| ConfigError::Invalid(format!("Invalid log level {}: {}", level, e)))?;

    if let Some(config) = config {
        for (module, module_level) in &config.modules {
            let directive = format!("{}={}", module, module_level);
            filter = filter.add_directive(
                directive
                    .parse()
                    .map_err(|e| ConfigError::Invalid(format!("Invalid log directive: {}", e)))?,
            );
        }
    }

    Ok(filter)
}

/// Determine output format from config or environment
fn determine_format(config: Option<&LoggingConfig>) -> ConfigResult<Format> {
    if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
        if let Ok(format) = parse_format(&format) {
            return Ok(format);
        }
    }

    parse_format(config.map(|c| c.format.as_str()).unwrap_or("text"))
}
