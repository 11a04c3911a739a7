//! Error types for configuration access.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur reading, writing, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render {path}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("budget key `{0}` is missing or not a non-negative integer")]
    BudgetKey(String),
}
