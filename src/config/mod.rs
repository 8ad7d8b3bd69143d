//! Configuration System
//!
//! Process-wide settings, loaded once at startup and immutable afterwards.
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. Optional TOML file
//! 3. Environment variables (`TXGUARD_TRANSACTION__RETRY_COUNT=5`, ...)

mod error;
mod millis;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;
use crate::transaction::IsolationLevel;

pub use error::{ConfigError, ConfigResult};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TXGUARD";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Transaction engine defaults
    #[serde(default)]
    pub transaction: TxConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transaction engine defaults.
///
/// Unset values fall back to the hard defaults in
/// [`crate::transaction::options`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxConfig {
    /// Timeout applied when a call does not set one
    #[serde(default, rename = "default_timeout_ms", with = "millis")]
    pub default_timeout: Option<Duration>,

    /// Transient-failure retry budget
    #[serde(default)]
    pub retry_count: Option<u32>,

    /// Forced retry cycles per call; only for exercising retry safety in tests
    #[serde(default)]
    pub test_retries: u32,

    /// Isolation level used when unspecified
    #[serde(default)]
    pub default_isolation_level: Option<IsolationLevel>,

    /// Base delay between transient retries, multiplied by the retry number
    #[serde(default, rename = "retry_backoff_ms", with = "millis")]
    pub retry_backoff: Option<Duration>,
}

/// Backoff used when the configuration leaves it unset.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(20);

impl TxConfig {
    /// Effective base backoff.
    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff.unwrap_or(DEFAULT_RETRY_BACKOFF)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid(
                "transaction.default_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load from defaults, an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`AppConfig::load`] but reads environment variables from
    /// `vars` instead of the process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        vars: Option<HashMap<String, String>>,
    ) -> ConfigResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(vars),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document directly.
    pub fn from_toml(source: &str) -> ConfigResult<Self> {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML, e.g. to print a starter configuration file.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.transaction.validate()?;
        self.logging.validate()
    }
}
