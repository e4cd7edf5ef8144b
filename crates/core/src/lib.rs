//! Core functionality shared across the ClientHog edge relay.
//!
//! This crate provides logging initialization, clock helpers and the
//! error type used by both.

pub mod clock;
pub mod error;
pub mod logging;

pub use clock::current_timestamp_ms;
pub use error::{CoreError, CoreResult};
pub use logging::LogFormat;
