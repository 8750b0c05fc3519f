//! Conflict detection and resolution.

use crate::error::{SyncError, SyncResult};
use crate::store::{ConflictStore, DeviceStore, ResourceRecord, ResourceStores, SyncStateStore};
use banter_clock::{ClockOrdering, VectorClock};
use banter_sync_protocol::{
    payload_checksum, ResolutionStrategy, ResourceKind, SyncConflict, SyncState,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// The conflict resolver.
///
/// Detects causally concurrent writes, applies manual resolutions, and
/// runs the fixed per-kind auto-resolution heuristics. Conflicts are
/// persisted data; detection never fails a sync round.
pub struct ConflictResolver {
    conflicts: Arc<dyn ConflictStore>,
    devices: Arc<dyn DeviceStore>,
    resources: ResourceStores,
    sync_states: Arc<dyn SyncStateStore>,
}

impl ConflictResolver {
    /// Creates a resolver over its stores.
    pub fn new(
        conflicts: Arc<dyn ConflictStore>,
        devices: Arc<dyn DeviceStore>,
        resources: ResourceStores,
        sync_states: Arc<dyn SyncStateStore>,
    ) -> Self {
        Self {
            conflicts,
            devices,
            resources,
            sync_states,
        }
    }

    /// Records a conflict iff the two clocks are causally concurrent.
    ///
    /// Both full versions are retained verbatim. Returns `None` for any
    /// other ordering; causally ordered writes are not conflicts.
    #[allow(clippy::too_many_arguments)]
    pub fn detect_conflict(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        local_payload: Value,
        remote_payload: Value,
        local_clock: VectorClock,
        remote_clock: VectorClock,
        local_device_id: &str,
        remote_device_id: &str,
    ) -> SyncResult<Option<SyncConflict>> {
        if local_clock.compare(&remote_clock) != ClockOrdering::Concurrent {
            return Ok(None);
        }

        let conflict = SyncConflict::new(
            kind,
            resource_id,
            local_device_id,
            remote_device_id,
            local_payload,
            remote_payload,
            local_clock,
            remote_clock,
        );
        debug!(
            conflict_id = %conflict.id,
            %kind,
            resource_id,
            "recorded concurrent-write conflict"
        );
        self.conflicts.insert(conflict.clone())?;
        Ok(Some(conflict))
    }

    /// Records a conflict for two versions with identical causal
    /// history but differing payloads.
    ///
    /// Correct clients never produce this: an equal clock means an
    /// exact replay. When a buggy client diverges anyway, the write is
    /// parked as a conflict instead of silently overwriting.
    #[allow(clippy::too_many_arguments)]
    pub fn record_divergence(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        local_payload: Value,
        remote_payload: Value,
        clock: VectorClock,
        local_device_id: &str,
        remote_device_id: &str,
    ) -> SyncResult<SyncConflict> {
        let conflict = SyncConflict::new(
            kind,
            resource_id,
            local_device_id,
            remote_device_id,
            local_payload,
            remote_payload,
            clock.clone(),
            clock,
        );
        debug!(
            conflict_id = %conflict.id,
            %kind,
            resource_id,
            "recorded divergent replay as conflict"
        );
        self.conflicts.insert(conflict.clone())?;
        Ok(conflict)
    }

    /// Resolves a conflict with an explicit strategy.
    ///
    /// `LocalWins`/`RemoteWins` select a stored payload verbatim,
    /// `Merge` invokes the kind-specific merge function, and `Manual`
    /// requires `manual_payload`. The resolved value is written back
    /// under the merged clock, which dominates both contenders.
    pub fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        strategy: ResolutionStrategy,
        manual_payload: Option<Value>,
    ) -> SyncResult<SyncConflict> {
        let mut conflict = self
            .conflicts
            .get(conflict_id)?
            .ok_or(SyncError::ConflictNotFound { conflict_id })?;

        let resolved = match strategy {
            ResolutionStrategy::LocalWins => conflict.local_payload.clone(),
            ResolutionStrategy::RemoteWins => conflict.remote_payload.clone(),
            ResolutionStrategy::Merge => merge_payloads(
                conflict.resource_kind,
                &conflict.local_payload,
                &conflict.remote_payload,
            )
            .ok_or_else(|| {
                SyncError::Validation(format!(
                    "versions of {} {} cannot be merged automatically",
                    conflict.resource_kind, conflict.resource_id
                ))
            })?,
            ResolutionStrategy::Manual => manual_payload.ok_or_else(|| {
                SyncError::Validation("manual resolution requires a payload".to_string())
            })?,
        };

        conflict.mark_resolved(strategy, resolved)?;
        self.apply_resolution(&conflict)?;
        self.conflicts.update(conflict.clone())?;
        info!(conflict_id = %conflict.id, ?strategy, "resolved conflict");
        Ok(conflict)
    }

    /// Applies the fixed per-kind heuristic to every unresolved
    /// conflict on a resource.
    ///
    /// Conflicts the heuristic does not confidently match are left
    /// unresolved. Returns the conflicts that were auto-resolved.
    pub fn auto_resolve(
        &self,
        kind: ResourceKind,
        resource_id: &str,
    ) -> SyncResult<Vec<SyncConflict>> {
        let mut resolved = Vec::new();

        for mut conflict in self.conflicts.unresolved_for_resource(kind, resource_id)? {
            let outcome = match kind {
                ResourceKind::Thread => {
                    resolve_thread(&conflict.local_payload, &conflict.remote_payload)
                }
                ResourceKind::Notification => {
                    resolve_notification(&conflict.local_payload, &conflict.remote_payload)
                }
            };

            let Some((strategy, payload)) = outcome else {
                debug!(conflict_id = %conflict.id, "heuristic left conflict unresolved");
                continue;
            };

            conflict.mark_auto_resolved(strategy, payload)?;
            self.apply_resolution(&conflict)?;
            self.conflicts.update(conflict.clone())?;
            info!(conflict_id = %conflict.id, ?strategy, "auto-resolved conflict");
            resolved.push(conflict);
        }

        Ok(resolved)
    }

    /// Lists unresolved conflicts across all of a user's devices.
    pub fn get_unresolved(&self, user_id: &str) -> SyncResult<Vec<SyncConflict>> {
        let device_ids: Vec<String> = self
            .devices
            .list_for_user(user_id)?
            .into_iter()
            .map(|d| d.id)
            .collect();
        self.conflicts.unresolved_for_devices(&device_ids)
    }

    /// Writes a resolved payload back to the resource store and
    /// advances both devices' causal state.
    ///
    /// The write happens under the merged clock; if the stored record
    /// has already moved strictly past it, the resolution is kept as
    /// data but the stored value is left alone.
    fn apply_resolution(&self, conflict: &SyncConflict) -> SyncResult<()> {
        let Some(payload) = conflict.resolved_payload.clone() else {
            return Ok(());
        };
        let resolved_clock = conflict.merged_clock();
        let store = self.resources.get(conflict.resource_kind)?;
        let now = Utc::now();

        let current = store.get(&conflict.resource_id)?;
        let superseded = current
            .as_ref()
            .map(|record| record.vector_clock.compare(&resolved_clock) == ClockOrdering::After)
            .unwrap_or(false);

        if !superseded {
            let vector_clock = current
                .as_ref()
                .map(|record| record.vector_clock.merge(&resolved_clock))
                .unwrap_or_else(|| resolved_clock.clone());
            store.apply_update(ResourceRecord {
                id: conflict.resource_id.clone(),
                payload: payload.clone(),
                vector_clock,
                last_modified_by: conflict.local_device_id.clone(),
                updated_at: now,
                archived: current.map(|record| record.archived).unwrap_or(false),
            })?;
        }

        let checksum = payload_checksum(&payload);
        for device_id in [&conflict.local_device_id, &conflict.remote_device_id] {
            self.sync_states.upsert(SyncState::synced(
                device_id.clone(),
                conflict.resource_kind,
                conflict.resource_id.clone(),
                resolved_clock.clone(),
                checksum.clone(),
            ))?;
        }
        Ok(())
    }
}

/// Kind-specific merge of two concurrent versions.
///
/// Returns `None` when the versions cannot be merged confidently.
pub fn merge_payloads(kind: ResourceKind, local: &Value, remote: &Value) -> Option<Value> {
    match kind {
        ResourceKind::Thread => merge_thread_metadata(local, remote),
        ResourceKind::Notification => merge_notification(local, remote),
    }
}

/// Thread heuristic: archived preference, then metadata merge on
/// identical primary content, then newer modification time.
fn resolve_thread(local: &Value, remote: &Value) -> Option<(ResolutionStrategy, Value)> {
    if !local.is_object() || !remote.is_object() {
        return None;
    }

    let local_archived = bool_field(local, "archived");
    let remote_archived = bool_field(remote, "archived");
    if local_archived != remote_archived {
        // An archive decision beats concurrent edits.
        return Some(if local_archived {
            (ResolutionStrategy::LocalWins, local.clone())
        } else {
            (ResolutionStrategy::RemoteWins, remote.clone())
        });
    }

    if local.get("title") == remote.get("title")
        && local.get("participants") == remote.get("participants")
    {
        let merged = merge_thread_metadata(local, remote)?;
        return Some((ResolutionStrategy::Merge, merged));
    }

    let local_updated = time_field(local, "updatedAt")?;
    let remote_updated = time_field(remote, "updatedAt")?;
    // Ties go to local: the already-stored version stands.
    Some(if local_updated >= remote_updated {
        (ResolutionStrategy::LocalWins, local.clone())
    } else {
        (ResolutionStrategy::RemoteWins, remote.clone())
    })
}

/// Merges thread metadata: tag union, max activity timestamp, union of
/// read-status maps, max modification time. Primary content comes from
/// the local side (the caller has established it is identical).
fn merge_thread_metadata(local: &Value, remote: &Value) -> Option<Value> {
    let local_map = local.as_object()?;
    let remote_map = remote.as_object()?;
    let mut merged = local_map.clone();

    let mut tags: Vec<Value> = local_map
        .get("tags")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for tag in remote_map.get("tags").and_then(Value::as_array).into_iter().flatten() {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    merged.insert("tags".to_string(), Value::Array(tags));

    if let Some(at) = max_time(local, remote, "lastActivityAt") {
        merged.insert("lastActivityAt".to_string(), json!(at));
    }
    if let Some(at) = max_time(local, remote, "updatedAt") {
        merged.insert("updatedAt".to_string(), json!(at));
    }

    let mut read_state: Map<String, Value> = local_map
        .get("readState")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Some(remote_reads) = remote_map.get("readState").and_then(Value::as_object) {
        for (user_id, read) in remote_reads {
            let seen = read_state
                .get(user_id)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let merged_read = seen || read.as_bool().unwrap_or(false);
            read_state.insert(user_id.clone(), Value::Bool(merged_read));
        }
    }
    if !read_state.is_empty() {
        merged.insert("readState".to_string(), Value::Object(read_state));
    }

    Some(Value::Object(merged))
}

/// Notification heuristic: a read version beats an unread one;
/// otherwise merge with read flags OR'd and the earliest non-null read
/// timestamp retained.
fn resolve_notification(local: &Value, remote: &Value) -> Option<(ResolutionStrategy, Value)> {
    if !local.is_object() || !remote.is_object() {
        return None;
    }

    let local_read = bool_field(local, "read");
    let remote_read = bool_field(remote, "read");
    if local_read != remote_read {
        return Some(if local_read {
            (ResolutionStrategy::LocalWins, local.clone())
        } else {
            (ResolutionStrategy::RemoteWins, remote.clone())
        });
    }

    let merged = merge_notification(local, remote)?;
    Some((ResolutionStrategy::Merge, merged))
}

fn merge_notification(local: &Value, remote: &Value) -> Option<Value> {
    let local_map = local.as_object()?;
    remote.as_object()?;

    // Base on the later-updated side when both carry a timestamp.
    let base = match (time_field(local, "updatedAt"), time_field(remote, "updatedAt")) {
        (Some(l), Some(r)) if r > l => remote,
        _ => local,
    };
    let mut merged = base.as_object().unwrap_or(local_map).clone();

    let read = bool_field(local, "read") || bool_field(remote, "read");
    merged.insert("read".to_string(), Value::Bool(read));

    let read_at = match (time_field(local, "readAt"), time_field(remote, "readAt")) {
        (Some(l), Some(r)) => Some(l.min(r)),
        (Some(l), None) => Some(l),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    };
    if let Some(at) = read_at {
        merged.insert("readAt".to_string(), json!(at));
    }

    if let Some(at) = max_time(local, remote, "updatedAt") {
        merged.insert("updatedAt".to_string(), json!(at));
    }

    Some(Value::Object(merged))
}

fn bool_field(payload: &Value, key: &str) -> bool {
    payload.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn time_field(payload: &Value, key: &str) -> Option<DateTime<Utc>> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn max_time(local: &Value, remote: &Value, key: &str) -> Option<DateTime<Utc>> {
    match (time_field(local, key), time_field(remote, key)) {
        (Some(l), Some(r)) => Some(l.max(r)),
        (Some(l), None) => Some(l),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    }
}
