//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or rendering configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Layered source could not be read or deserialized.
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    /// The configuration file given explicitly does not exist.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Values were read but are not usable.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Rendering to TOML failed.
    #[error("could not render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}
