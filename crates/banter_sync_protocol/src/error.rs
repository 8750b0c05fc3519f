//! Error types for protocol state transitions.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced by protocol-level state transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A conflict was resolved twice; resolved states are terminal.
    #[error("conflict {0} is already resolved")]
    AlreadyResolved(String),

    /// A manual resolution was requested without a payload.
    #[error("manual resolution requires a payload")]
    MissingManualPayload,
}
