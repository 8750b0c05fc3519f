//! In-memory store implementations.
//!
//! These back the engine's tests and let embedders run the full sync
//! core without a database. Each mirrors the corresponding trait's
//! contract exactly, including ordering guarantees.

use crate::error::SyncResult;
use crate::store::{
    ConflictStore, DeviceStore, OperationStore, ResourceRecord, ResourceStore, SyncStateStore,
};
use banter_clock::VectorClock;
use banter_sync_protocol::{
    Device, OfflineOperation, ResourceKind, SyncConflict, SyncState,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory device store.
#[derive(Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<HashMap<String, Device>>,
}

impl MemoryDeviceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn get(&self, device_id: &str) -> SyncResult<Option<Device>> {
        Ok(self.devices.read().get(device_id).cloned())
    }

    fn find_by_fingerprint(
        &self,
        user_id: &str,
        fingerprint: &str,
    ) -> SyncResult<Option<Device>> {
        Ok(self
            .devices
            .read()
            .values()
            .find(|d| d.user_id == user_id && d.fingerprint == fingerprint)
            .cloned())
    }

    fn list_for_user(&self, user_id: &str) -> SyncResult<Vec<Device>> {
        let mut devices: Vec<Device> = self
            .devices
            .read()
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        Ok(devices)
    }

    fn list_active(&self) -> SyncResult<Vec<Device>> {
        Ok(self
            .devices
            .read()
            .values()
            .filter(|d| d.active)
            .cloned()
            .collect())
    }

    fn upsert(&self, device: Device) -> SyncResult<()> {
        self.devices.write().insert(device.id.clone(), device);
        Ok(())
    }
}

/// In-memory operation store preserving append order.
#[derive(Default)]
pub struct MemoryOperationStore {
    operations: RwLock<Vec<OfflineOperation>>,
}

impl MemoryOperationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperationStore for MemoryOperationStore {
    fn get(&self, operation_id: Uuid) -> SyncResult<Option<OfflineOperation>> {
        Ok(self
            .operations
            .read()
            .iter()
            .find(|op| op.id == operation_id)
            .cloned())
    }

    fn append(&self, operation: OfflineOperation) -> SyncResult<()> {
        self.operations.write().push(operation);
        Ok(())
    }

    fn list_for_device(&self, device_id: &str) -> SyncResult<Vec<OfflineOperation>> {
        Ok(self
            .operations
            .read()
            .iter()
            .filter(|op| op.device_id == device_id)
            .cloned()
            .collect())
    }

    fn update(&self, operation: OfflineOperation) -> SyncResult<()> {
        let mut operations = self.operations.write();
        if let Some(slot) = operations.iter_mut().find(|op| op.id == operation.id) {
            *slot = operation;
        }
        Ok(())
    }

    fn remove(&self, operation_id: Uuid) -> SyncResult<bool> {
        let mut operations = self.operations.write();
        let before = operations.len();
        operations.retain(|op| op.id != operation_id);
        Ok(operations.len() < before)
    }
}

/// In-memory conflict store.
#[derive(Default)]
pub struct MemoryConflictStore {
    conflicts: RwLock<HashMap<Uuid, SyncConflict>>,
}

impl MemoryConflictStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_unresolved<F>(&self, filter: F) -> Vec<SyncConflict>
    where
        F: Fn(&SyncConflict) -> bool,
    {
        let mut conflicts: Vec<SyncConflict> = self
            .conflicts
            .read()
            .values()
            .filter(|c| !c.is_resolved() && filter(c))
            .cloned()
            .collect();
        conflicts.sort_by(|a, b| a.detected_at.cmp(&b.detected_at));
        conflicts
    }
}

impl ConflictStore for MemoryConflictStore {
    fn get(&self, conflict_id: Uuid) -> SyncResult<Option<SyncConflict>> {
        Ok(self.conflicts.read().get(&conflict_id).cloned())
    }

    fn insert(&self, conflict: SyncConflict) -> SyncResult<()> {
        self.conflicts.write().insert(conflict.id, conflict);
        Ok(())
    }

    fn update(&self, conflict: SyncConflict) -> SyncResult<()> {
        self.conflicts.write().insert(conflict.id, conflict);
        Ok(())
    }

    fn unresolved_for_resource(
        &self,
        kind: ResourceKind,
        resource_id: &str,
    ) -> SyncResult<Vec<SyncConflict>> {
        Ok(self.sorted_unresolved(|c| c.resource_kind == kind && c.resource_id == resource_id))
    }

    fn unresolved_for_devices(&self, device_ids: &[String]) -> SyncResult<Vec<SyncConflict>> {
        Ok(self.sorted_unresolved(|c| {
            device_ids.contains(&c.local_device_id) || device_ids.contains(&c.remote_device_id)
        }))
    }
}

/// In-memory sync state store.
#[derive(Default)]
pub struct MemorySyncStateStore {
    states: RwLock<HashMap<(String, ResourceKind, String), SyncState>>,
}

impl MemorySyncStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncStateStore for MemorySyncStateStore {
    fn get(
        &self,
        device_id: &str,
        kind: ResourceKind,
        resource_id: &str,
    ) -> SyncResult<Option<SyncState>> {
        let key = (device_id.to_string(), kind, resource_id.to_string());
        Ok(self.states.read().get(&key).cloned())
    }

    fn upsert(&self, state: SyncState) -> SyncResult<()> {
        let key = (
            state.device_id.clone(),
            state.resource_kind,
            state.resource_id.clone(),
        );
        self.states.write().insert(key, state);
        Ok(())
    }
}

/// In-memory resource store for one kind.
pub struct MemoryResourceStore {
    kind: ResourceKind,
    records: RwLock<HashMap<String, ResourceRecord>>,
}

impl MemoryResourceStore {
    /// Creates an empty store for the given kind.
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds a record directly, bypassing the sync path (fixtures).
    pub fn seed(&self, record: ResourceRecord) {
        self.records.write().insert(record.id.clone(), record);
    }
}

impl ResourceStore for MemoryResourceStore {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn get(&self, resource_id: &str) -> SyncResult<Option<ResourceRecord>> {
        Ok(self.records.read().get(resource_id).cloned())
    }

    fn changed_since(
        &self,
        since: DateTime<Utc>,
        include_deleted: bool,
    ) -> SyncResult<Vec<ResourceRecord>> {
        let mut records: Vec<ResourceRecord> = self
            .records
            .read()
            .values()
            .filter(|r| r.updated_at > since && (include_deleted || !r.archived))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(records)
    }

    fn apply_create(&self, record: ResourceRecord) -> SyncResult<()> {
        self.records.write().insert(record.id.clone(), record);
        Ok(())
    }

    fn apply_update(&self, record: ResourceRecord) -> SyncResult<()> {
        self.records.write().insert(record.id.clone(), record);
        Ok(())
    }

    fn apply_delete(
        &self,
        resource_id: &str,
        clock: &VectorClock,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> SyncResult<()> {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(resource_id) {
            record.archived = true;
            record.vector_clock = record.vector_clock.merge(clock);
            record.last_modified_by = device_id.to_string();
            record.updated_at = at;
        }
        Ok(())
    }
}
