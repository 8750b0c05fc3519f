//! # Banter Sync Protocol
//!
//! Sync data model and wire types for Banter's multi-device sync core.
//!
//! This crate provides:
//! - `Device` identity, capabilities and sync settings
//! - `OfflineOperation` queue records and `SyncOperation` wire records
//! - `SyncConflict` with its resolution state machine
//! - `SyncState` causal bookkeeping records
//! - Request/response types for sync rounds and bulk sync
//! - Opaque sync tokens and payload checksums
//!
//! This is a pure data crate with no I/O operations. All types serialize
//! as camelCase JSON, matching the platform's HTTP API.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checksum;
mod conflict;
mod device;
mod error;
mod messages;
mod operation;
mod resource;
mod state;
mod token;

pub use checksum::payload_checksum;
pub use conflict::{ConflictStatus, ResolutionStrategy, SyncConflict};
pub use device::{
    Device, DeviceCapabilities, DevicePatch, DeviceType, RegisterDevice, SyncSettings,
    SyncSettingsPatch,
};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    BulkSyncReport, BulkSyncRequest, OperationError, ResolveConflictRequest, SyncRequest,
    SyncResponse,
};
pub use operation::{OfflineOperation, OperationKind, OperationStatus, SyncOperation};
pub use resource::ResourceKind;
pub use state::{SyncState, SyncStateStatus};
pub use token::SyncToken;
