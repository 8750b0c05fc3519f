//! Error types for the sync engine.

use banter_sync_protocol::{ProtocolError, ResourceKind};
use thiserror::Error;
use uuid::Uuid;

/// Result type for sync engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur inside the sync engine.
///
/// Conflicts and stale writes are deliberately absent: a conflict is
/// persisted data and a stale write is dropped silently, so neither is
/// an error condition.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No device with this id.
    #[error("device {device_id} not found")]
    DeviceNotFound {
        /// The unknown device id.
        device_id: String,
    },

    /// No conflict with this id.
    #[error("conflict {conflict_id} not found")]
    ConflictNotFound {
        /// The unknown conflict id.
        conflict_id: Uuid,
    },

    /// No queued operation with this id.
    #[error("operation {operation_id} not found")]
    OperationNotFound {
        /// The unknown operation id.
        operation_id: Uuid,
    },

    /// The device is not owned by the caller or is inactive.
    #[error("device {device_id} is not authorized for this user")]
    Unauthorized {
        /// The rejected device id.
        device_id: String,
    },

    /// The request is malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A vector clock failed validation or parsing.
    #[error("invalid vector clock: {0}")]
    Clock(#[from] banter_clock::ClockError),

    /// No resource store is bound for this kind.
    #[error("no resource store bound for kind {kind}")]
    UnboundResourceKind {
        /// The unbound kind.
        kind: ResourceKind,
    },

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = SyncError::Unauthorized {
            device_id: "d1".into(),
        };
        assert_eq!(err.to_string(), "device d1 is not authorized for this user");

        let err = SyncError::UnboundResourceKind {
            kind: ResourceKind::Thread,
        };
        assert!(err.to_string().contains("thread"));
    }

    #[test]
    fn protocol_errors_become_validation() {
        let err: SyncError = ProtocolError::MissingManualPayload.into();
        assert!(matches!(err, SyncError::Validation(_)));
    }
}
