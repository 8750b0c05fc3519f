//! Store traits the engine persists through.
//!
//! The engine owns no storage of its own: devices, queued operations,
//! conflicts and causal state live behind these traits, and each
//! resource kind's documents live behind a `ResourceStore`. A
//! deployment binds them to the platform's relational store; the
//! in-memory implementations in [`crate::memory`] back the tests.

use crate::error::{SyncError, SyncResult};
use banter_clock::VectorClock;
use banter_sync_protocol::{
    Device, OfflineOperation, ResourceKind, SyncConflict, SyncState,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Persistence for registered devices.
pub trait DeviceStore: Send + Sync {
    /// Fetches a device by id.
    fn get(&self, device_id: &str) -> SyncResult<Option<Device>>;

    /// Fetches a user's device by fingerprint.
    fn find_by_fingerprint(&self, user_id: &str, fingerprint: &str)
        -> SyncResult<Option<Device>>;

    /// Lists all of a user's devices, active or not.
    fn list_for_user(&self, user_id: &str) -> SyncResult<Vec<Device>>;

    /// Lists every active device (for the inactivity sweep).
    fn list_active(&self) -> SyncResult<Vec<Device>>;

    /// Inserts or replaces a device record.
    fn upsert(&self, device: Device) -> SyncResult<()>;
}

/// Persistence for the offline operation queue.
pub trait OperationStore: Send + Sync {
    /// Fetches an operation by id.
    fn get(&self, operation_id: Uuid) -> SyncResult<Option<OfflineOperation>>;

    /// Appends an operation.
    fn append(&self, operation: OfflineOperation) -> SyncResult<()>;

    /// Lists a device's operations in creation order.
    fn list_for_device(&self, device_id: &str) -> SyncResult<Vec<OfflineOperation>>;

    /// Replaces an operation record.
    fn update(&self, operation: OfflineOperation) -> SyncResult<()>;

    /// Removes an operation; returns true if it existed.
    fn remove(&self, operation_id: Uuid) -> SyncResult<bool>;
}

/// Persistence for recorded conflicts.
pub trait ConflictStore: Send + Sync {
    /// Fetches a conflict by id.
    fn get(&self, conflict_id: Uuid) -> SyncResult<Option<SyncConflict>>;

    /// Inserts a new conflict.
    fn insert(&self, conflict: SyncConflict) -> SyncResult<()>;

    /// Replaces a conflict record.
    fn update(&self, conflict: SyncConflict) -> SyncResult<()>;

    /// Unresolved conflicts on one resource, oldest first.
    fn unresolved_for_resource(
        &self,
        kind: ResourceKind,
        resource_id: &str,
    ) -> SyncResult<Vec<SyncConflict>>;

    /// Unresolved conflicts involving any of the given devices,
    /// oldest first.
    fn unresolved_for_devices(&self, device_ids: &[String]) -> SyncResult<Vec<SyncConflict>>;
}

/// Persistence for per-(device, resource) causal state.
pub trait SyncStateStore: Send + Sync {
    /// Fetches the stored state for one (device, resource) pair.
    fn get(
        &self,
        device_id: &str,
        kind: ResourceKind,
        resource_id: &str,
    ) -> SyncResult<Option<SyncState>>;

    /// Inserts or replaces a state record.
    fn upsert(&self, state: SyncState) -> SyncResult<()>;
}

/// A resource document as the sync core sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Resource id.
    pub id: String,
    /// Current payload.
    pub payload: Value,
    /// Clock accumulated over accepted writes.
    pub vector_clock: VectorClock,
    /// Device behind the last accepted write.
    pub last_modified_by: String,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Soft-deletion flag.
    pub archived: bool,
}

/// Persistence for one resource kind's documents.
///
/// One implementation exists per kind; the surrounding feature modules
/// (threads, notifications) provide them.
pub trait ResourceStore: Send + Sync {
    /// The kind this store holds.
    fn kind(&self) -> ResourceKind;

    /// Fetches a record by id.
    fn get(&self, resource_id: &str) -> SyncResult<Option<ResourceRecord>>;

    /// Records modified strictly after `since`, ascending by
    /// modification time. Archived records are excluded unless
    /// `include_deleted`.
    fn changed_since(
        &self,
        since: DateTime<Utc>,
        include_deleted: bool,
    ) -> SyncResult<Vec<ResourceRecord>>;

    /// Applies a create, inserting the record.
    fn apply_create(&self, record: ResourceRecord) -> SyncResult<()>;

    /// Applies an update, replacing (or inserting) the record.
    fn apply_update(&self, record: ResourceRecord) -> SyncResult<()>;

    /// Applies a soft delete, marking the record archived.
    fn apply_delete(
        &self,
        resource_id: &str,
        clock: &VectorClock,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> SyncResult<()>;
}

/// The set of bound resource stores, keyed by kind.
///
/// Cloning is cheap; the stores themselves are shared.
#[derive(Clone, Default)]
pub struct ResourceStores {
    stores: HashMap<ResourceKind, Arc<dyn ResourceStore>>,
}

impl ResourceStores {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a store under its own kind.
    pub fn with_store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.stores.insert(store.kind(), store);
        self
    }

    /// Fetches the store for a kind.
    pub fn get(&self, kind: ResourceKind) -> SyncResult<&Arc<dyn ResourceStore>> {
        self.stores
            .get(&kind)
            .ok_or(SyncError::UnboundResourceKind { kind })
    }

    /// Returns true if a store is bound for the kind.
    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.stores.contains_key(&kind)
    }
}

impl std::fmt::Debug for ResourceStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStores")
            .field("kinds", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}
