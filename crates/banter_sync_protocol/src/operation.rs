//! Offline queue records and wire operations.

use crate::resource::ResourceKind;
use banter_clock::VectorClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The kind of mutation an operation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Resource was created.
    Create,
    /// Resource was updated.
    Update,
    /// Resource was deleted (soft).
    Delete,
}

/// Lifecycle status of a queued operation.
///
/// `Synced` is terminal; `Failed` is terminal once the retry ceiling is
/// reached and requires an explicit retry to leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting to be reconciled.
    Pending,
    /// Reconciled successfully.
    Synced,
    /// Reconciliation failed.
    Failed,
    /// Parked behind an unresolved conflict.
    Conflict,
}

/// A locally made mutation buffered while the device is offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineOperation {
    /// Operation id.
    pub id: Uuid,
    /// Device that recorded the mutation.
    pub device_id: String,
    /// Mutation kind.
    pub kind: OperationKind,
    /// Resource kind.
    pub resource_kind: ResourceKind,
    /// Resource id.
    pub resource_id: String,
    /// Resource payload at mutation time.
    pub payload: Value,
    /// Vector clock at mutation time.
    pub vector_clock: VectorClock,
    /// Lifecycle status.
    pub status: OperationStatus,
    /// Failed reconciliation attempts so far.
    pub retry_count: u32,
    /// Message from the last failed attempt.
    pub last_error: Option<String>,
    /// Creation time on the device.
    pub created_at: DateTime<Utc>,
}

impl OfflineOperation {
    /// Creates a pending operation.
    pub fn new(
        device_id: impl Into<String>,
        kind: OperationKind,
        resource_kind: ResourceKind,
        resource_id: impl Into<String>,
        payload: Value,
        vector_clock: VectorClock,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            kind,
            resource_kind,
            resource_id: resource_id.into(),
            payload,
            vector_clock,
            status: OperationStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Creates a pending create operation.
    pub fn create(
        device_id: impl Into<String>,
        resource_kind: ResourceKind,
        resource_id: impl Into<String>,
        payload: Value,
        vector_clock: VectorClock,
    ) -> Self {
        Self::new(
            device_id,
            OperationKind::Create,
            resource_kind,
            resource_id,
            payload,
            vector_clock,
        )
    }

    /// Creates a pending update operation.
    pub fn update(
        device_id: impl Into<String>,
        resource_kind: ResourceKind,
        resource_id: impl Into<String>,
        payload: Value,
        vector_clock: VectorClock,
    ) -> Self {
        Self::new(
            device_id,
            OperationKind::Update,
            resource_kind,
            resource_id,
            payload,
            vector_clock,
        )
    }

    /// Creates a pending delete operation.
    pub fn delete(
        device_id: impl Into<String>,
        resource_kind: ResourceKind,
        resource_id: impl Into<String>,
        vector_clock: VectorClock,
    ) -> Self {
        Self::new(
            device_id,
            OperationKind::Delete,
            resource_kind,
            resource_id,
            Value::Null,
            vector_clock,
        )
    }

    /// Converts to the wire form.
    pub fn to_sync_operation(&self) -> SyncOperation {
        SyncOperation {
            id: self.id.to_string(),
            device_id: self.device_id.clone(),
            operation: self.kind,
            resource_kind: self.resource_kind,
            resource_id: self.resource_id.clone(),
            payload: self.payload.clone(),
            vector_clock: self.vector_clock.clone(),
            timestamp: self.created_at,
        }
    }
}

/// A sync operation as it crosses the wire.
///
/// Server-side changes are wrapped in this form when returned from a
/// sync round, and drained queue entries take this form on their way
/// through the causality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Operation id.
    pub id: String,
    /// Originating device.
    pub device_id: String,
    /// Mutation kind.
    pub operation: OperationKind,
    /// Resource kind.
    pub resource_kind: ResourceKind,
    /// Resource id.
    pub resource_id: String,
    /// Resource payload.
    pub payload: Value,
    /// Causal clock the mutation was made under.
    pub vector_clock: VectorClock,
    /// Mutation time.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_operations_start_pending() {
        let op = OfflineOperation::create(
            "d1",
            ResourceKind::Thread,
            "t1",
            json!({"title": "plans"}),
            VectorClock::for_device("d1"),
        );

        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.retry_count, 0);
        assert!(op.last_error.is_none());
    }

    #[test]
    fn delete_carries_null_payload() {
        let op = OfflineOperation::delete(
            "d1",
            ResourceKind::Notification,
            "n1",
            VectorClock::for_device("d1"),
        );
        assert_eq!(op.kind, OperationKind::Delete);
        assert!(op.payload.is_null());
    }

    #[test]
    fn wire_conversion_preserves_fields() {
        let op = OfflineOperation::update(
            "d1",
            ResourceKind::Thread,
            "t1",
            json!({"title": "updated"}),
            VectorClock::for_device("d1").increment("d1"),
        );

        let wire = op.to_sync_operation();
        assert_eq!(wire.id, op.id.to_string());
        assert_eq!(wire.device_id, "d1");
        assert_eq!(wire.operation, OperationKind::Update);
        assert_eq!(wire.resource_id, "t1");
        assert_eq!(wire.vector_clock, op.vector_clock);
    }

    #[test]
    fn wire_serialization_is_camel_case() {
        let op = OfflineOperation::create(
            "d1",
            ResourceKind::Thread,
            "t1",
            json!({}),
            VectorClock::for_device("d1"),
        );
        let json = serde_json::to_string(&op.to_sync_operation()).unwrap();
        assert!(json.contains("deviceId"));
        assert!(json.contains("resourceKind"));
        assert!(json.contains("vectorClock"));
    }
}
