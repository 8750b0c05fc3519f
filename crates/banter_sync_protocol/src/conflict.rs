//! Conflict records and their resolution state machine.

use crate::error::{ProtocolError, ProtocolResult};
use crate::resource::ResourceKind;
use banter_clock::VectorClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Resolution state of a conflict.
///
/// `Resolved` and `AutoResolved` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Awaiting resolution.
    Unresolved,
    /// Resolved by an explicit request.
    Resolved,
    /// Resolved by a per-kind heuristic.
    AutoResolved,
}

/// How a conflict was (or should be) resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep the local version verbatim.
    LocalWins,
    /// Keep the remote version verbatim.
    RemoteWins,
    /// Merge the two versions with the kind-specific merge function.
    Merge,
    /// Use a caller-supplied payload.
    Manual,
}

/// Two causally concurrent writes to the same resource.
///
/// Both full versions are retained until resolution; conflicts are data,
/// never errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Conflict id.
    pub id: Uuid,
    /// Resource kind.
    pub resource_kind: ResourceKind,
    /// Resource id.
    pub resource_id: String,
    /// Device behind the local version.
    pub local_device_id: String,
    /// Device behind the remote version.
    pub remote_device_id: String,
    /// Local payload, verbatim.
    pub local_payload: Value,
    /// Remote payload, verbatim.
    pub remote_payload: Value,
    /// Local clock.
    pub local_clock: VectorClock,
    /// Remote clock.
    pub remote_clock: VectorClock,
    /// Resolution state.
    pub status: ConflictStatus,
    /// Strategy used, once resolved.
    pub strategy: Option<ResolutionStrategy>,
    /// The winning or merged payload, once resolved.
    pub resolved_payload: Option<Value>,
    /// Detection time.
    pub detected_at: DateTime<Utc>,
    /// Resolution time.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SyncConflict {
    /// Creates a new unresolved conflict retaining both versions.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resource_kind: ResourceKind,
        resource_id: impl Into<String>,
        local_device_id: impl Into<String>,
        remote_device_id: impl Into<String>,
        local_payload: Value,
        remote_payload: Value,
        local_clock: VectorClock,
        remote_clock: VectorClock,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_kind,
            resource_id: resource_id.into(),
            local_device_id: local_device_id.into(),
            remote_device_id: remote_device_id.into(),
            local_payload,
            remote_payload,
            local_clock,
            remote_clock,
            status: ConflictStatus::Unresolved,
            strategy: None,
            resolved_payload: None,
            detected_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Returns true once a terminal status is reached.
    pub fn is_resolved(&self) -> bool {
        self.status != ConflictStatus::Unresolved
    }

    /// Transitions to `Resolved` with the given strategy and outcome.
    ///
    /// Resolved states are terminal; resolving twice is an error.
    pub fn mark_resolved(
        &mut self,
        strategy: ResolutionStrategy,
        resolved_payload: Value,
    ) -> ProtocolResult<()> {
        self.transition(ConflictStatus::Resolved, strategy, resolved_payload)
    }

    /// Transitions to `AutoResolved` with the given strategy and outcome.
    pub fn mark_auto_resolved(
        &mut self,
        strategy: ResolutionStrategy,
        resolved_payload: Value,
    ) -> ProtocolResult<()> {
        self.transition(ConflictStatus::AutoResolved, strategy, resolved_payload)
    }

    fn transition(
        &mut self,
        status: ConflictStatus,
        strategy: ResolutionStrategy,
        resolved_payload: Value,
    ) -> ProtocolResult<()> {
        if self.is_resolved() {
            return Err(ProtocolError::AlreadyResolved(self.id.to_string()));
        }
        self.status = status;
        self.strategy = Some(strategy);
        self.resolved_payload = Some(resolved_payload);
        self.resolved_at = Some(Utc::now());
        Ok(())
    }

    /// The merged clock dominating both contending versions.
    ///
    /// Resolved values are written back under this clock so a late stale
    /// write from either device is rejected by the causality gate.
    pub fn merged_clock(&self) -> VectorClock {
        self.local_clock.merge(&self.remote_clock)
    }
}
