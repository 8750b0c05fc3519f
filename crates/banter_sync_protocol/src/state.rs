//! Per-device causal bookkeeping records.

use crate::resource::ResourceKind;
use banter_clock::VectorClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a device's view of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStateStatus {
    /// Device and server agree.
    Synced,
    /// A write is awaiting reconciliation.
    Pending,
    /// A concurrent write is awaiting conflict resolution.
    Conflict,
    /// The last reconciliation attempt failed.
    Failed,
}

/// The stored causal state for one (device, resource) pair.
///
/// Upserted by the orchestrator after every accepted or conflicted
/// write; the causality gate compares incoming clocks against
/// `vector_clock`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Device this state belongs to.
    pub device_id: String,
    /// Resource kind.
    pub resource_kind: ResourceKind,
    /// Resource id.
    pub resource_id: String,
    /// Clock of the last accepted write.
    pub vector_clock: VectorClock,
    /// Checksum of the last accepted payload.
    pub checksum: String,
    /// Time of the last accepted write.
    pub last_synced_at: DateTime<Utc>,
    /// Current status.
    pub status: SyncStateStatus,
}

impl SyncState {
    /// Creates a fresh synced record.
    pub fn synced(
        device_id: impl Into<String>,
        resource_kind: ResourceKind,
        resource_id: impl Into<String>,
        vector_clock: VectorClock,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            resource_kind,
            resource_id: resource_id.into(),
            vector_clock,
            checksum: checksum.into(),
            last_synced_at: Utc::now(),
            status: SyncStateStatus::Synced,
        }
    }
}
