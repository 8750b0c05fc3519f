//! Driving a sync round end to end.

use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::queue::OfflineQueue;
use crate::registry::DeviceRegistry;
use crate::resolver::ConflictResolver;
use crate::store::{ResourceRecord, ResourceStores, SyncStateStore};
use banter_clock::ClockOrdering;
use banter_sync_protocol::{
    payload_checksum, BulkSyncReport, BulkSyncRequest, OperationError, OperationKind,
    ResourceKind, SyncConflict, SyncOperation, SyncRequest, SyncResponse, SyncState, SyncToken,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// What the causality gate decided for one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// The mutation was applied and causal state advanced.
    Applied,
    /// The mutation was causally stale (or an exact replay) and was
    /// dropped silently.
    Stale,
    /// The mutation was concurrent with the stored state; a conflict
    /// was recorded and the mutation was not applied.
    Conflicted(SyncConflict),
}

/// Serializes sync sessions per device.
///
/// Two racing rounds for the same device must not interleave their
/// compare-then-apply sequences; rounds for different devices proceed
/// independently.
#[derive(Default)]
struct SessionLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    fn for_device(&self, device_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// The sync orchestrator.
///
/// Drives a bounded sync round: validate the device, fetch server-side
/// changes since the caller's cursor, drain the device's offline queue
/// through the causality gate, and hand back a paginated response with
/// a fresh cursor.
pub struct SyncOrchestrator {
    registry: DeviceRegistry,
    queue: OfflineQueue,
    resolver: ConflictResolver,
    resources: ResourceStores,
    sync_states: Arc<dyn SyncStateStore>,
    config: EngineConfig,
    sessions: SessionLocks,
}

impl SyncOrchestrator {
    /// Creates an orchestrator over its collaborators.
    pub fn new(
        registry: DeviceRegistry,
        queue: OfflineQueue,
        resolver: ConflictResolver,
        resources: ResourceStores,
        sync_states: Arc<dyn SyncStateStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            queue,
            resolver,
            resources,
            sync_states,
            config,
            sessions: SessionLocks::default(),
        }
    }

    /// The registry this orchestrator validates devices against.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The offline queue this orchestrator drains.
    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// The conflict resolver this orchestrator delegates to.
    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// Runs one interactive sync round for a device.
    ///
    /// A malformed or missing token falls back to a full resync from
    /// epoch; it is never an error. The response is always structurally
    /// complete; outstanding work is signalled through `has_more`.
    pub fn initiate_sync(&self, user_id: &str, request: SyncRequest) -> SyncResult<SyncResponse> {
        let lock = self.sessions.for_device(&request.device_id);
        let _session = lock.lock();

        if !self.registry.validate_access(&request.device_id, user_id)? {
            return Err(SyncError::Unauthorized {
                device_id: request.device_id.clone(),
            });
        }
        self.registry.touch(&request.device_id)?;
        let device = self.registry.get(&request.device_id, user_id)?;

        let since = request
            .last_sync_token
            .as_deref()
            .and_then(SyncToken::decode)
            .filter(|token| token.device_id == request.device_id)
            .map(|token| token.issued_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let batch_size = self.config.clamp_batch_size(request.batch_size);

        let mut items: Vec<SyncOperation> = Vec::new();
        let mut seen_kinds: Vec<ResourceKind> = Vec::new();
        for &kind in &request.resource_kinds {
            if seen_kinds.contains(&kind) || !device.settings.syncs_kind(kind) {
                continue;
            }
            seen_kinds.push(kind);

            let store = self.resources.get(kind)?;
            for record in store.changed_since(since, request.include_deleted)? {
                items.push(record_as_operation(kind, record));
            }
        }

        items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        items.truncate(batch_size);
        let has_more = items.len() == batch_size;

        // Reconcile this device's own offline writes in the same round.
        self.queue.optimize(&request.device_id)?;
        for operation in self.queue.dequeue_pending(&request.device_id, usize::MAX)? {
            match self.process_operation(&request.device_id, &operation.to_sync_operation()) {
                Ok(OperationOutcome::Applied) | Ok(OperationOutcome::Stale) => {
                    self.queue.mark_synced(operation.id)?;
                }
                Ok(OperationOutcome::Conflicted(_)) => {
                    self.queue.mark_conflicted(operation.id)?;
                }
                Err(err) => {
                    self.queue.mark_failed(operation.id, &err.to_string())?;
                }
            }
        }

        let now = Utc::now();
        // With a full batch the cursor stops at the last returned item,
        // so the remainder is picked up by the next round.
        let cursor_at = if has_more {
            items.last().map(|item| item.timestamp).unwrap_or(now)
        } else {
            now
        };
        let next_sync_token = SyncToken::issue(&request.device_id, cursor_at).encode();

        debug!(
            device_id = %request.device_id,
            items = items.len(),
            has_more,
            "completed sync round"
        );
        Ok(SyncResponse {
            items,
            conflicts: Vec::new(),
            next_sync_token,
            has_more,
            server_time: now,
        })
    }

    /// Reconciles a batch of offline operations.
    ///
    /// Per-operation failures are collected without aborting siblings;
    /// partial success is expected. Touched resources are auto-resolved
    /// after the batch.
    pub fn process_bulk(
        &self,
        user_id: &str,
        request: BulkSyncRequest,
    ) -> SyncResult<BulkSyncReport> {
        let lock = self.sessions.for_device(&request.device_id);
        let _session = lock.lock();

        if !self.registry.validate_access(&request.device_id, user_id)? {
            return Err(SyncError::Unauthorized {
                device_id: request.device_id.clone(),
            });
        }
        self.registry.touch(&request.device_id)?;

        let mut synced_items = 0;
        let mut conflicts: Vec<SyncConflict> = Vec::new();
        let mut errors: Vec<OperationError> = Vec::new();
        let mut touched: Vec<(ResourceKind, String)> = Vec::new();

        for operation in &request.operations {
            let key = (operation.resource_kind, operation.resource_id.clone());
            match self.process_operation(&request.device_id, &operation.to_sync_operation()) {
                Ok(OperationOutcome::Applied) | Ok(OperationOutcome::Stale) => {
                    synced_items += 1;
                    if !touched.contains(&key) {
                        touched.push(key);
                    }
                }
                Ok(OperationOutcome::Conflicted(conflict)) => {
                    conflicts.push(conflict);
                    if !touched.contains(&key) {
                        touched.push(key);
                    }
                }
                Err(err) => {
                    errors.push(OperationError {
                        operation_id: operation.id,
                        message: err.to_string(),
                    });
                }
            }
        }

        for (kind, resource_id) in touched {
            for resolved in self.resolver.auto_resolve(kind, &resource_id)? {
                if let Some(slot) = conflicts.iter_mut().find(|c| c.id == resolved.id) {
                    *slot = resolved;
                }
            }
        }

        debug!(
            device_id = %request.device_id,
            synced_items,
            conflicts = conflicts.len(),
            errors = errors.len(),
            "completed bulk sync"
        );
        Ok(BulkSyncReport {
            success: errors.is_empty(),
            synced_items,
            conflicts,
            errors,
        })
    }

    /// The causality gate for one mutation.
    ///
    /// Compares the operation's clock against the resource's stored
    /// causal state: stale writes are dropped silently, concurrent
    /// writes become recorded conflicts, and newer writes are applied
    /// with the causal state advanced atomically behind the session
    /// lock.
    pub fn process_operation(
        &self,
        device_id: &str,
        operation: &SyncOperation,
    ) -> SyncResult<OperationOutcome> {
        operation.vector_clock.validate()?;

        let store = self.resources.get(operation.resource_kind)?;
        let Some(record) = store.get(&operation.resource_id)? else {
            return self.apply(device_id, operation, None);
        };

        match operation.vector_clock.compare(&record.vector_clock) {
            ClockOrdering::Before => {
                trace!(
                    resource_id = %operation.resource_id,
                    "dropped causally stale operation"
                );
                Ok(OperationOutcome::Stale)
            }
            ClockOrdering::After => self.apply(device_id, operation, Some(record)),
            ClockOrdering::Equal => self.gate_replay(device_id, operation, record),
            ClockOrdering::Concurrent => {
                // The stored version is the local side; the incoming
                // operation is the remote contender.
                let conflict = self.resolver.detect_conflict(
                    operation.resource_kind,
                    &operation.resource_id,
                    record.payload.clone(),
                    operation.payload.clone(),
                    record.vector_clock.clone(),
                    operation.vector_clock.clone(),
                    &record.last_modified_by,
                    &operation.device_id,
                )?;

                let mut state = SyncState::synced(
                    device_id,
                    operation.resource_kind,
                    operation.resource_id.clone(),
                    operation.vector_clock.clone(),
                    payload_checksum(&operation.payload),
                );
                state.status = banter_sync_protocol::SyncStateStatus::Conflict;
                self.sync_states.upsert(state)?;

                match conflict {
                    Some(conflict) => Ok(OperationOutcome::Conflicted(conflict)),
                    // The re-check inside detect_conflict cannot
                    // disagree with the comparison above.
                    None => Ok(OperationOutcome::Stale),
                }
            }
        }
    }

    /// Policy for an equal clock: an identical payload is an idempotent
    /// replay and is dropped; a differing payload is a client bug and
    /// is parked as a conflict rather than silently re-applied.
    fn gate_replay(
        &self,
        device_id: &str,
        operation: &SyncOperation,
        record: ResourceRecord,
    ) -> SyncResult<OperationOutcome> {
        let is_replay = match operation.operation {
            OperationKind::Delete => record.archived,
            _ => payload_checksum(&operation.payload) == payload_checksum(&record.payload),
        };

        if is_replay {
            self.sync_states.upsert(SyncState::synced(
                device_id,
                operation.resource_kind,
                operation.resource_id.clone(),
                record.vector_clock,
                payload_checksum(&record.payload),
            ))?;
            return Ok(OperationOutcome::Stale);
        }

        let conflict = self.resolver.record_divergence(
            operation.resource_kind,
            &operation.resource_id,
            record.payload.clone(),
            operation.payload.clone(),
            operation.vector_clock.clone(),
            &record.last_modified_by,
            &operation.device_id,
        )?;
        Ok(OperationOutcome::Conflicted(conflict))
    }

    /// Applies an accepted mutation and advances causal state.
    fn apply(
        &self,
        device_id: &str,
        operation: &SyncOperation,
        existing: Option<ResourceRecord>,
    ) -> SyncResult<OperationOutcome> {
        let store = self.resources.get(operation.resource_kind)?;
        let now = Utc::now();
        let new_clock = existing
            .as_ref()
            .map(|record| record.vector_clock.merge(&operation.vector_clock))
            .unwrap_or_else(|| operation.vector_clock.clone());

        match operation.operation {
            OperationKind::Create => store.apply_create(ResourceRecord {
                id: operation.resource_id.clone(),
                payload: operation.payload.clone(),
                vector_clock: new_clock.clone(),
                last_modified_by: operation.device_id.clone(),
                updated_at: now,
                archived: false,
            })?,
            OperationKind::Update => store.apply_update(ResourceRecord {
                id: operation.resource_id.clone(),
                payload: operation.payload.clone(),
                vector_clock: new_clock.clone(),
                last_modified_by: operation.device_id.clone(),
                updated_at: now,
                archived: existing.map(|record| record.archived).unwrap_or(false),
            })?,
            OperationKind::Delete => store.apply_delete(
                &operation.resource_id,
                &operation.vector_clock,
                &operation.device_id,
                now,
            )?,
        }

        self.sync_states.upsert(SyncState::synced(
            device_id,
            operation.resource_kind,
            operation.resource_id.clone(),
            new_clock,
            payload_checksum(&operation.payload),
        ))?;
        Ok(OperationOutcome::Applied)
    }
}

/// Wraps a changed resource as a candidate operation for the response.
fn record_as_operation(kind: ResourceKind, record: ResourceRecord) -> SyncOperation {
    SyncOperation {
        id: Uuid::new_v4().to_string(),
        device_id: record.last_modified_by,
        operation: if record.archived {
            OperationKind::Delete
        } else {
            OperationKind::Update
        },
        resource_kind: kind,
        resource_id: record.id,
        payload: record.payload,
        vector_clock: record.vector_clock,
        timestamp: record.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        MemoryConflictStore, MemoryDeviceStore, MemoryOperationStore, MemoryResourceStore,
        MemorySyncStateStore,
    };
    use crate::store::{ResourceStore as _, SyncStateStore as _};
    use banter_clock::VectorClock;
    use banter_sync_protocol::{
        ConflictStatus, DeviceCapabilities, DeviceType, OfflineOperation, RegisterDevice,
    };
    use chrono::Duration;
    use serde_json::json;

    struct Fixture {
        orchestrator: SyncOrchestrator,
        threads: Arc<MemoryResourceStore>,
        sync_states: Arc<MemorySyncStateStore>,
    }

    fn fixture() -> Fixture {
        fixture_with_kinds(&[ResourceKind::Thread, ResourceKind::Notification])
    }

    fn fixture_with_kinds(kinds: &[ResourceKind]) -> Fixture {
        let devices = Arc::new(MemoryDeviceStore::new());
        let operations = Arc::new(MemoryOperationStore::new());
        let conflicts = Arc::new(MemoryConflictStore::new());
        let sync_states = Arc::new(MemorySyncStateStore::new());
        let threads = Arc::new(MemoryResourceStore::new(ResourceKind::Thread));

        let mut resources = ResourceStores::new();
        for &kind in kinds {
            let store: Arc<dyn crate::store::ResourceStore> = match kind {
                ResourceKind::Thread => threads.clone(),
                ResourceKind::Notification => Arc::new(MemoryResourceStore::new(kind)),
            };
            resources = resources.with_store(store);
        }

        let config = EngineConfig::default();
        let registry = DeviceRegistry::new(devices.clone(), config.clone());
        let queue = OfflineQueue::new(operations, config.clone());
        let resolver = ConflictResolver::new(
            conflicts,
            devices,
            resources.clone(),
            sync_states.clone(),
        );

        Fixture {
            orchestrator: SyncOrchestrator::new(
                registry,
                queue,
                resolver,
                resources,
                sync_states.clone(),
                config,
            ),
            threads,
            sync_states,
        }
    }

    fn register(fixture: &Fixture, user_id: &str, fingerprint: &str) -> String {
        fixture
            .orchestrator
            .registry()
            .register(
                user_id,
                RegisterDevice {
                    fingerprint: fingerprint.to_string(),
                    device_name: fingerprint.to_string(),
                    device_type: DeviceType::Mobile,
                    platform: "test".to_string(),
                    user_agent: "test".to_string(),
                    push_token: None,
                    capabilities: DeviceCapabilities::default(),
                },
            )
            .unwrap()
            .id
    }

    fn seed_thread(fixture: &Fixture, id: &str, title: &str, at: DateTime<Utc>) {
        fixture.threads.seed(ResourceRecord {
            id: id.to_string(),
            payload: json!({"title": title}),
            vector_clock: VectorClock::for_device("seed"),
            last_modified_by: "seed".to_string(),
            updated_at: at,
            archived: false,
        });
    }

    #[test]
    fn sync_requires_an_authorized_device() {
        let fixture = fixture();
        let device = register(&fixture, "u1", "fp-1");

        let err = fixture
            .orchestrator
            .initiate_sync("u2", SyncRequest::new(&device, vec![ResourceKind::Thread]))
            .unwrap_err();
        assert!(matches!(err, SyncError::Unauthorized { .. }));

        let err = fixture
            .orchestrator
            .initiate_sync("u1", SyncRequest::new("missing", vec![ResourceKind::Thread]))
            .unwrap_err();
        assert!(matches!(err, SyncError::Unauthorized { .. }));
    }

    #[test]
    fn garbage_token_means_full_resync() {
        let fixture = fixture();
        let device = register(&fixture, "u1", "fp-1");
        seed_thread(&fixture, "t1", "old", Utc::now() - Duration::days(300));

        let response = fixture
            .orchestrator
            .initiate_sync(
                "u1",
                SyncRequest::new(&device, vec![ResourceKind::Thread])
                    .with_token("complete garbage %%%"),
            )
            .unwrap();

        // Decoding never raises; the round covers everything from epoch.
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].resource_id, "t1");
    }

    #[test]
    fn items_are_sorted_paginated_and_resumable() {
        let fixture = fixture();
        let device = register(&fixture, "u1", "fp-1");
        let base = Utc::now() - Duration::minutes(10);
        seed_thread(&fixture, "t2", "second", base + Duration::minutes(2));
        seed_thread(&fixture, "t1", "first", base + Duration::minutes(1));
        seed_thread(&fixture, "t3", "third", base + Duration::minutes(3));

        let first = fixture
            .orchestrator
            .initiate_sync(
                "u1",
                SyncRequest::new(&device, vec![ResourceKind::Thread]).with_batch_size(2),
            )
            .unwrap();

        assert!(first.has_more);
        assert_eq!(
            first
                .items
                .iter()
                .map(|item| item.resource_id.as_str())
                .collect::<Vec<_>>(),
            vec!["t1", "t2"]
        );

        let second = fixture
            .orchestrator
            .initiate_sync(
                "u1",
                SyncRequest::new(&device, vec![ResourceKind::Thread])
                    .with_token(first.next_sync_token)
                    .with_batch_size(2),
            )
            .unwrap();

        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].resource_id, "t3");
        assert!(!second.has_more);
    }

    #[test]
    fn archived_items_are_deletes_and_gated_by_flag() {
        let fixture = fixture();
        let device = register(&fixture, "u1", "fp-1");
        let base = Utc::now() - Duration::minutes(5);
        seed_thread(&fixture, "t1", "alive", base);
        fixture.threads.seed(ResourceRecord {
            id: "t2".to_string(),
            payload: json!({"title": "gone"}),
            vector_clock: VectorClock::for_device("seed"),
            last_modified_by: "seed".to_string(),
            updated_at: base,
            archived: true,
        });

        let without = fixture
            .orchestrator
            .initiate_sync("u1", SyncRequest::new(&device, vec![ResourceKind::Thread]))
            .unwrap();
        assert_eq!(without.items.len(), 1);

        let with = fixture
            .orchestrator
            .initiate_sync(
                "u1",
                SyncRequest::new(&device, vec![ResourceKind::Thread]).with_deleted(),
            )
            .unwrap();
        assert_eq!(with.items.len(), 2);
        let deleted = with
            .items
            .iter()
            .find(|item| item.resource_id == "t2")
            .unwrap();
        assert_eq!(deleted.operation, OperationKind::Delete);
    }

    #[test]
    fn disabled_resource_toggles_exclude_a_kind() {
        let fixture = fixture();
        let device = register(&fixture, "u1", "fp-1");
        seed_thread(&fixture, "t1", "hidden", Utc::now() - Duration::minutes(1));

        fixture
            .orchestrator
            .registry()
            .update(
                &device,
                "u1",
                banter_sync_protocol::DevicePatch {
                    settings: Some(banter_sync_protocol::SyncSettingsPatch {
                        sync_threads: Some(false),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .unwrap();

        let response = fixture
            .orchestrator
            .initiate_sync("u1", SyncRequest::new(&device, vec![ResourceKind::Thread]))
            .unwrap();
        assert!(response.items.is_empty());
    }

    #[test]
    fn sync_round_drains_the_offline_queue() {
        let fixture = fixture();
        let device = register(&fixture, "u1", "fp-1");

        fixture
            .orchestrator
            .queue()
            .enqueue(OfflineOperation::create(
                &device,
                ResourceKind::Thread,
                "t1",
                json!({"title": "written offline"}),
                VectorClock::for_device(&device),
            ))
            .unwrap();

        fixture
            .orchestrator
            .initiate_sync("u1", SyncRequest::new(&device, vec![ResourceKind::Thread]))
            .unwrap();

        // The offline create landed in the resource store.
        let record = fixture.threads.get("t1").unwrap().unwrap();
        assert_eq!(record.payload, json!({"title": "written offline"}));

        let stats = fixture.orchestrator.queue().stats(&device).unwrap();
        assert_eq!(stats.synced, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn replaying_an_operation_is_idempotent() {
        let fixture = fixture();
        let device = register(&fixture, "u1", "fp-1");

        let operation = OfflineOperation::create(
            &device,
            ResourceKind::Thread,
            "t1",
            json!({"title": "once"}),
            VectorClock::for_device(&device),
        )
        .to_sync_operation();

        let first = fixture
            .orchestrator
            .process_operation(&device, &operation)
            .unwrap();
        assert_eq!(first, OperationOutcome::Applied);

        let second = fixture
            .orchestrator
            .process_operation(&device, &operation)
            .unwrap();
        assert_eq!(second, OperationOutcome::Stale);

        let record = fixture.threads.get("t1").unwrap().unwrap();
        assert_eq!(record.payload, json!({"title": "once"}));
        assert_eq!(record.vector_clock, VectorClock::for_device(&device));
    }

    #[test]
    fn stale_writes_are_dropped_silently() {
        let fixture = fixture();
        let device = register(&fixture, "u1", "fp-1");

        let v1 = VectorClock::for_device(&device);
        let v2 = v1.increment(&device);

        let newer = SyncOperation {
            id: "op-new".to_string(),
            device_id: device.clone(),
            operation: OperationKind::Update,
            resource_kind: ResourceKind::Thread,
            resource_id: "t1".to_string(),
            payload: json!({"title": "v2"}),
            vector_clock: v2,
            timestamp: Utc::now(),
        };
        let older = SyncOperation {
            id: "op-old".to_string(),
            payload: json!({"title": "v1"}),
            vector_clock: v1,
            ..newer.clone()
        };

        fixture
            .orchestrator
            .process_operation(&device, &newer)
            .unwrap();
        let outcome = fixture
            .orchestrator
            .process_operation(&device, &older)
            .unwrap();

        assert_eq!(outcome, OperationOutcome::Stale);
        let record = fixture.threads.get("t1").unwrap().unwrap();
        assert_eq!(record.payload, json!({"title": "v2"}));
    }

    #[test]
    fn equal_clock_with_divergent_payload_becomes_a_conflict() {
        let fixture = fixture();
        let device = register(&fixture, "u1", "fp-1");

        let clock = VectorClock::for_device(&device);
        let original = SyncOperation {
            id: "op-1".to_string(),
            device_id: device.clone(),
            operation: OperationKind::Update,
            resource_kind: ResourceKind::Thread,
            resource_id: "t1".to_string(),
            payload: json!({"title": "one"}),
            vector_clock: clock.clone(),
            timestamp: Utc::now(),
        };
        let divergent = SyncOperation {
            payload: json!({"title": "two"}),
            ..original.clone()
        };

        fixture
            .orchestrator
            .process_operation(&device, &original)
            .unwrap();
        let outcome = fixture
            .orchestrator
            .process_operation(&device, &divergent)
            .unwrap();

        let OperationOutcome::Conflicted(conflict) = outcome else {
            panic!("divergent replay must be parked as a conflict");
        };
        assert_eq!(conflict.local_payload, json!({"title": "one"}));
        assert_eq!(conflict.remote_payload, json!({"title": "two"}));

        // The stored value is untouched.
        let record = fixture.threads.get("t1").unwrap().unwrap();
        assert_eq!(record.payload, json!({"title": "one"}));
    }

    #[test]
    fn bulk_sync_reports_partial_failure() {
        // Bind only threads so notification operations fail.
        let fixture = fixture_with_kinds(&[ResourceKind::Thread]);
        let device = register(&fixture, "u1", "fp-1");

        let good = OfflineOperation::create(
            &device,
            ResourceKind::Thread,
            "t1",
            json!({"title": "fine"}),
            VectorClock::for_device(&device),
        );
        let bad = OfflineOperation::create(
            &device,
            ResourceKind::Notification,
            "n1",
            json!({"title": "no store"}),
            VectorClock::for_device(&device),
        );
        let bad_id = bad.id;

        let report = fixture
            .orchestrator
            .process_bulk(
                "u1",
                BulkSyncRequest {
                    device_id: device.clone(),
                    operations: vec![good, bad],
                },
            )
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.synced_items, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].operation_id, bad_id);

        // The sibling operation still landed.
        assert!(fixture.threads.get("t1").unwrap().is_some());
    }

    #[test]
    fn bulk_sync_auto_resolves_touched_resources() {
        let fixture = fixture();
        let device_a = register(&fixture, "u1", "fp-a");
        let device_b = register(&fixture, "u1", "fp-b");

        // Device A's version is already stored.
        fixture
            .orchestrator
            .process_operation(
                &device_a,
                &OfflineOperation::create(
                    &device_a,
                    ResourceKind::Thread,
                    "t1",
                    json!({"title": "plans", "tags": ["work"]}),
                    VectorClock::for_device(&device_a),
                )
                .to_sync_operation(),
            )
            .unwrap();

        // Device B pushes a concurrent edit that only adds a tag.
        let report = fixture
            .orchestrator
            .process_bulk(
                "u1",
                BulkSyncRequest {
                    device_id: device_b.clone(),
                    operations: vec![OfflineOperation::update(
                        &device_b,
                        ResourceKind::Thread,
                        "t1",
                        json!({"title": "plans", "tags": ["travel"]}),
                        VectorClock::for_device(&device_b),
                    )],
                },
            )
            .unwrap();

        assert!(report.success);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].status, ConflictStatus::AutoResolved);

        let record = fixture.threads.get("t1").unwrap().unwrap();
        let tags = record.payload["tags"].as_array().unwrap();
        assert!(tags.contains(&json!("work")));
        assert!(tags.contains(&json!("travel")));
    }

    #[test]
    fn conflicted_write_updates_causal_bookkeeping() {
        let fixture = fixture();
        let device_a = register(&fixture, "u1", "fp-a");
        let device_b = register(&fixture, "u1", "fp-b");

        fixture
            .orchestrator
            .process_operation(
                &device_a,
                &OfflineOperation::create(
                    &device_a,
                    ResourceKind::Thread,
                    "t1",
                    json!({"title": "a"}),
                    VectorClock::for_device(&device_a),
                )
                .to_sync_operation(),
            )
            .unwrap();

        let outcome = fixture
            .orchestrator
            .process_operation(
                &device_b,
                &OfflineOperation::update(
                    &device_b,
                    ResourceKind::Thread,
                    "t1",
                    json!({"title": "b"}),
                    VectorClock::for_device(&device_b),
                )
                .to_sync_operation(),
            )
            .unwrap();

        assert!(matches!(outcome, OperationOutcome::Conflicted(_)));

        let state = fixture
            .sync_states
            .get(&device_b, ResourceKind::Thread, "t1")
            .unwrap()
            .unwrap();
        assert_eq!(state.status, banter_sync_protocol::SyncStateStatus::Conflict);
    }
}
