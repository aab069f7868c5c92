//! Keel environment and user configuration
//!
//! Settings come from three layers, later overriding earlier:
//! 1. Built-in defaults (`~/.keel`, `~/keel`, host platform)
//! 2. User config file (`<home>/config.toml`)
//! 3. Environment variables (`KEEL_HOME`, `KEEL_PATH`, `KEEL_OS`,
//!    `KEEL_ARCH`)
//!
//! CLI flags sit above all of these and are handled by the caller.

pub mod env;
pub mod file;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

pub use env::Env;
pub use file::FileConfig;
