//! Request and response types for sync rounds.

use crate::conflict::{ResolutionStrategy, SyncConflict};
use crate::operation::{OfflineOperation, SyncOperation};
use crate::resource::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default batch size for a sync round.
pub const DEFAULT_BATCH_SIZE: usize = 100;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// A client's request to start a sync round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Requesting device.
    pub device_id: String,
    /// Token from the previous round; absent or malformed means a full
    /// resync from epoch.
    #[serde(default)]
    pub last_sync_token: Option<String>,
    /// Resource kinds to include.
    pub resource_kinds: Vec<ResourceKind>,
    /// Maximum items returned this round.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Include archived (soft-deleted) resources.
    #[serde(default)]
    pub include_deleted: bool,
}

impl SyncRequest {
    /// Creates a request with defaults for the optional fields.
    pub fn new(device_id: impl Into<String>, resource_kinds: Vec<ResourceKind>) -> Self {
        Self {
            device_id: device_id.into(),
            last_sync_token: None,
            resource_kinds,
            batch_size: DEFAULT_BATCH_SIZE,
            include_deleted: false,
        }
    }

    /// Sets the resume token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.last_sync_token = Some(token.into());
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Includes archived resources in the response.
    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

/// The server's answer to a sync round.
///
/// Always structurally complete: callers learn of remaining work through
/// `has_more` and of contention through `conflicts`, never through a
/// partial-failure error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Changed resources, ascending by modification time.
    pub items: Vec<SyncOperation>,
    /// Conflicts surfaced during this round.
    pub conflicts: Vec<SyncConflict>,
    /// Token to present next round.
    pub next_sync_token: String,
    /// True when a further round would return more items.
    pub has_more: bool,
    /// Server time at response creation.
    pub server_time: DateTime<Utc>,
}

/// A batch of offline operations submitted for reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSyncRequest {
    /// Submitting device.
    pub device_id: String,
    /// Operations to reconcile, oldest first.
    pub operations: Vec<OfflineOperation>,
}

/// Per-operation failure inside a bulk sync.
///
/// Collected without aborting sibling operations; partial success is
/// expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationError {
    /// The failed operation.
    pub operation_id: Uuid,
    /// What went wrong.
    pub message: String,
}

/// Outcome of a bulk sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSyncReport {
    /// True when every operation reconciled without error.
    pub success: bool,
    /// Operations applied (or detected as idempotent replays).
    pub synced_items: usize,
    /// Conflicts recorded during the batch.
    pub conflicts: Vec<SyncConflict>,
    /// Per-operation failures.
    pub errors: Vec<OperationError>,
}

/// A request to resolve a recorded conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    /// Conflict to resolve.
    pub conflict_id: Uuid,
    /// Strategy to apply.
    pub resolution: ResolutionStrategy,
    /// Caller-supplied payload; required iff `resolution` is `Manual`.
    #[serde(default)]
    pub resolved_data: Option<Value>,
}

impl ResolveConflictRequest {
    /// Checks the payload requirement for manual resolutions.
    pub fn validate(&self) -> crate::ProtocolResult<()> {
        if self.resolution == ResolutionStrategy::Manual && self.resolved_data.is_none() {
            return Err(crate::ProtocolError::MissingManualPayload);
        }
        Ok(())
    }
}
