//! Core error types

use thiserror::Error;

/// Core error type for Emberwatch
#[derive(Debug, Error)]
pub enum CoreError {
    /// Run file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Run file is not valid TOML for the expected schema
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Run file parsed but describes an unusable deployment
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
