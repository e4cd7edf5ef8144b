//! Core error types

use thiserror::Error;

/// Core error type for ClientHog
#[derive(Debug, Error)]
pub enum CoreError {
    /// The global log subscriber could not be installed
    #[error("Logging initialization failed: {0}")]
    Logging(String),

    /// Unrecognized log output format
    #[error("Unknown log format: {0} (expected \"text\" or \"json\")")]
    UnknownLogFormat(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
