//! Structured logging infrastructure for ClientHog.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{CoreError, CoreResult};

/// Default filter directive used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines with target and thread id.
    #[default]
    Text,
    /// One JSON object per line, for log aggregation.
    Json,
}

impl FromStr for LogFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(CoreError::UnknownLogFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the logging system with structured output.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
/// If not set, defaults to `info` level.
///
/// # Example
/// ```no_run
/// use clienthog_core::logging;
///
/// logging::init().expect("logging already initialized");
/// tracing::info!("Relay started");
/// ```
pub fn init() -> CoreResult<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_fmt::layer().with_target(true).with_thread_ids(true))
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))
}

/// Initialize the logging system with JSON output for production environments.
///
/// This format is suitable for log aggregation systems and structured log analysis.
/// Log level can be configured via the `RUST_LOG` environment variable.
pub fn init_json() -> CoreResult<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_fmt::layer().json().with_target(true).with_thread_ids(true))
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))
}

/// Initialize logging in the requested [`LogFormat`].
pub fn init_with_format(format: LogFormat) -> CoreResult<()> {
    match format {
        LogFormat::Text => init(),
        LogFormat::Json => init_json(),
    }
}
