//! Error types for ClientHog edge relay operations.
//!
//! Runtime failures have focused enums next to the component that raises
//! them; [`EdgeError`] covers invalid relay settings.

use std::num::ParseIntError;

use thiserror::Error;

pub use crate::dispatcher::DispatchError;
pub use crate::extractor::ExtractError;
pub use crate::ingest::IngestError;
pub use crate::transport::TransportError;

/// Errors raised while parsing relay settings.
#[derive(Debug, Error)]
pub enum EdgeError {
    /// Device identity is not a decimal integer
    #[error("Invalid device id {value:?}: {source}")]
    InvalidDeviceId {
        /// Rejected input
        value: String,
        /// Parse failure
        source: ParseIntError,
    },

    /// Unknown unmatched-frame policy name
    #[error("Unknown unmatched policy: {0} (expected \"drop\" or \"forward\")")]
    UnknownPolicy(String),

    /// Malformed entity extractor specification
    #[error("Invalid extractor specification: {0}")]
    InvalidExtractor(String),
}
