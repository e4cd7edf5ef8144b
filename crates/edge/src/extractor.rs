//! Pluggable mapping from a frame payload to the entity name it carries.
//!
//! Payload layouts differ per deployment, so the dispatcher only depends on
//! the [`EntityExtractor`] trait. [`ExtractorSpec`] selects one of the
//! built-in strategies from a configuration string.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::error::EdgeError;

/// Delimiter used by [`DelimitedExtractor`] when none is configured.
pub const DEFAULT_DELIMITER: &str = "|";

/// Errors raised while reading an entity name out of a payload.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Payload is not valid UTF-8 text
    #[error("Payload is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    /// Payload is not a JSON object
    #[error("Payload is not a JSON object: {0}")]
    NotJson(#[from] serde_json::Error),

    /// Entity field exists but is not a string
    #[error("Field {field:?} is not a string")]
    FieldNotString {
        /// Configured field name
        field: String,
    },
}

/// Strategy reading the entity name from a raw payload.
///
/// `Ok(None)` means the payload carries no entity; the dispatcher treats it
/// as unmatched.
pub trait EntityExtractor: Send + Sync + fmt::Debug {
    /// Extract the entity name from `payload`.
    fn extract(&self, payload: &[u8]) -> Result<Option<String>, ExtractError>;
}

/// Entity is the text before the first delimiter, trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedExtractor {
    delimiter: String,
}

impl DelimitedExtractor {
    /// Split on `delimiter`.
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }
}

impl Default for DelimitedExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl EntityExtractor for DelimitedExtractor {
    fn extract(&self, payload: &[u8]) -> Result<Option<String>, ExtractError> {
        // Only the head must be text; the rest is opaque frame data.
        let delimiter = self.delimiter.as_bytes();
        let end = if delimiter.is_empty() {
            None
        } else {
            payload
                .windows(delimiter.len())
                .position(|window| window == delimiter)
        };
        let head = match end {
            Some(end) => &payload[..end],
            None => payload,
        };
        let head = std::str::from_utf8(head)?.trim();
        Ok((!head.is_empty()).then(|| head.to_string()))
    }
}

/// Entity is a string field of a JSON object payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFieldExtractor {
    field: String,
}

impl JsonFieldExtractor {
    /// Read the entity from `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl EntityExtractor for JsonFieldExtractor {
    fn extract(&self, payload: &[u8]) -> Result<Option<String>, ExtractError> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(payload)?;
        match object.get(&self.field) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(name)) => Ok(Some(name.clone())),
            Some(_) => Err(ExtractError::FieldNotString {
                field: self.field.clone(),
            }),
        }
    }
}

/// Never finds an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoExtractor;

impl EntityExtractor for NoExtractor {
    fn extract(&self, _payload: &[u8]) -> Result<Option<String>, ExtractError> {
        Ok(None)
    }
}

/// Configured choice of built-in extractor.
///
/// Textual forms: `delimited:<delimiter>`, `json:<field>`, `none`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractorSpec {
    /// [`DelimitedExtractor`]
    Delimited(String),
    /// [`JsonFieldExtractor`]
    JsonField(String),
    /// [`NoExtractor`]
    None,
}

impl ExtractorSpec {
    /// Instantiate the selected extractor.
    pub fn build(&self) -> Arc<dyn EntityExtractor> {
        match self {
            ExtractorSpec::Delimited(d) => Arc::new(DelimitedExtractor::new(d.clone())),
            ExtractorSpec::JsonField(f) => Arc::new(JsonFieldExtractor::new(f.clone())),
            ExtractorSpec::None => Arc::new(NoExtractor),
        }
    }
}

impl Default for ExtractorSpec {
    fn default() -> Self {
        ExtractorSpec::Delimited(DEFAULT_DELIMITER.to_string())
    }
}

impl FromStr for ExtractorSpec {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (s, None),
        };
        match (kind.trim().to_ascii_lowercase().as_str(), arg) {
            ("none", None) => Ok(ExtractorSpec::None),
            ("delimited", None) => Ok(ExtractorSpec::default()),
            ("delimited", Some(d)) if !d.is_empty() => Ok(ExtractorSpec::Delimited(d.to_string())),
            ("json", Some(f)) if !f.trim().is_empty() => {
                Ok(ExtractorSpec::JsonField(f.trim().to_string()))
            }
            _ => Err(EdgeError::InvalidExtractor(s.to_string())),
        }
    }
}

impl fmt::Display for ExtractorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractorSpec::Delimited(d) => write!(f, "delimited:{d}"),
            ExtractorSpec::JsonField(field) => write!(f, "json:{field}"),
            ExtractorSpec::None => f.write_str("none"),
        }
    }
}
