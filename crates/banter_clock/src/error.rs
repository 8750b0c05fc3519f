//! Error types for clock validation and parsing.

use thiserror::Error;

/// Result type for clock operations.
pub type ClockResult<T> = Result<T, ClockError>;

/// Errors produced by clock validation and parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// A clock entry has an empty device id.
    #[error("clock entry has an empty device id")]
    EmptyDeviceId,

    /// The serialized form could not be parsed.
    ///
    /// Negative or non-integer counters are rejected here rather than
    /// coerced.
    #[error("invalid clock serialization: {0}")]
    Parse(String),
}
