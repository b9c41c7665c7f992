//! Error types for configuration loading.

use thiserror::Error;

/// Errors that can occur while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("Config file not readable: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON.
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// No usable screen was configured.
    #[error("No valid screen configuration found")]
    NoScreens,
}
