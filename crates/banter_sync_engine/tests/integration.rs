//! Integration tests for the full sync core.

use banter_clock::VectorClock;
use banter_sync_engine::{
    ConflictResolver, DeviceRegistry, EngineConfig, MemoryConflictStore, MemoryDeviceStore,
    MemoryOperationStore, MemoryResourceStore, MemorySyncStateStore, OfflineQueue, ResourceStore,
    ResourceStores, SyncOrchestrator,
};
use banter_sync_protocol::{
    ConflictStatus, DeviceCapabilities, DeviceType, OfflineOperation, RegisterDevice,
    ResolutionStrategy, ResourceKind, SyncRequest,
};
use serde_json::json;
use std::sync::Arc;

struct Engine {
    orchestrator: SyncOrchestrator,
    threads: Arc<MemoryResourceStore>,
}

fn build_engine() -> Engine {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let devices = Arc::new(MemoryDeviceStore::new());
    let operations = Arc::new(MemoryOperationStore::new());
    let conflicts = Arc::new(MemoryConflictStore::new());
    let sync_states = Arc::new(MemorySyncStateStore::new());
    let threads = Arc::new(MemoryResourceStore::new(ResourceKind::Thread));
    let notifications = Arc::new(MemoryResourceStore::new(ResourceKind::Notification));

    let resources = ResourceStores::new()
        .with_store(threads.clone() as Arc<dyn banter_sync_engine::ResourceStore>)
        .with_store(notifications);

    let config = EngineConfig::default();
    let registry = DeviceRegistry::new(devices.clone(), config.clone());
    let queue = OfflineQueue::new(operations, config.clone());
    let resolver = ConflictResolver::new(conflicts, devices, resources.clone(), sync_states.clone());

    Engine {
        orchestrator: SyncOrchestrator::new(
            registry,
            queue,
            resolver,
            resources,
            sync_states,
            config,
        ),
        threads,
    }
}

fn register(engine: &Engine, user_id: &str, name: &str) -> String {
    engine
        .orchestrator
        .registry()
        .register(
            user_id,
            RegisterDevice {
                fingerprint: format!("fp-{name}"),
                device_name: name.to_string(),
                device_type: DeviceType::Mobile,
                platform: "test".to_string(),
                user_agent: "banter-test/1.0".to_string(),
                push_token: None,
                capabilities: DeviceCapabilities::default(),
            },
        )
        .unwrap()
        .id
}

#[test]
fn offline_create_reaches_other_devices() {
    let engine = build_engine();
    let phone = register(&engine, "u1", "phone");
    let laptop = register(&engine, "u1", "laptop");

    // The phone writes a thread while offline, then syncs.
    engine
        .orchestrator
        .queue()
        .enqueue(OfflineOperation::create(
            &phone,
            ResourceKind::Thread,
            "t1",
            json!({"title": "weekend plans"}),
            VectorClock::for_device(&phone),
        ))
        .unwrap();
    engine
        .orchestrator
        .initiate_sync("u1", SyncRequest::new(&phone, vec![ResourceKind::Thread]))
        .unwrap();

    // The laptop's next round sees the new thread.
    let response = engine
        .orchestrator
        .initiate_sync("u1", SyncRequest::new(&laptop, vec![ResourceKind::Thread]))
        .unwrap();

    assert_eq!(response.items.len(), 1);
    assert_eq!(response.items[0].resource_id, "t1");
    assert_eq!(response.items[0].payload, json!({"title": "weekend plans"}));
    assert!(!response.has_more);
    assert!(response.conflicts.is_empty());
}

#[test]
fn concurrent_offline_writes_conflict_and_local_wins_restores_the_create() {
    let engine = build_engine();
    let device_a = register(&engine, "u1", "a");
    let device_b = register(&engine, "u1", "b");

    // Device A creates thread T offline and syncs it up.
    engine
        .orchestrator
        .queue()
        .enqueue(OfflineOperation::create(
            &device_a,
            ResourceKind::Thread,
            "t1",
            json!({"title": "created on A"}),
            VectorClock::for_device(&device_a),
        ))
        .unwrap();
    engine
        .orchestrator
        .initiate_sync("u1", SyncRequest::new(&device_a, vec![ResourceKind::Thread]))
        .unwrap();

    // Device B updates T without ever having observed A's create; its
    // clock knows nothing of A.
    engine
        .orchestrator
        .queue()
        .enqueue(OfflineOperation::update(
            &device_b,
            ResourceKind::Thread,
            "t1",
            json!({"title": "renamed on B"}),
            VectorClock::for_device(&device_b),
        ))
        .unwrap();
    engine
        .orchestrator
        .initiate_sync("u1", SyncRequest::new(&device_b, vec![ResourceKind::Thread]))
        .unwrap();

    // The concurrent write is data, not an error.
    let unresolved = engine.orchestrator.resolver().get_unresolved("u1").unwrap();
    assert_eq!(unresolved.len(), 1);
    let conflict = &unresolved[0];
    assert_eq!(conflict.status, ConflictStatus::Unresolved);
    assert_eq!(conflict.local_payload, json!({"title": "created on A"}));
    assert_eq!(conflict.remote_payload, json!({"title": "renamed on B"}));

    // B's write did not clobber the stored value.
    let record = engine.threads.get("t1").unwrap().unwrap();
    assert_eq!(record.payload, json!({"title": "created on A"}));

    // Resolving with local-wins keeps device A's payload exactly.
    let resolved = engine
        .orchestrator
        .resolver()
        .resolve_conflict(conflict.id, ResolutionStrategy::LocalWins, None)
        .unwrap();
    assert_eq!(resolved.status, ConflictStatus::Resolved);

    let record = engine.threads.get("t1").unwrap().unwrap();
    assert_eq!(record.payload, json!({"title": "created on A"}));
    assert!(record.vector_clock.dominates(&conflict.local_clock));
    assert!(record.vector_clock.dominates(&conflict.remote_clock));

    assert!(engine
        .orchestrator
        .resolver()
        .get_unresolved("u1")
        .unwrap()
        .is_empty());
}

#[test]
fn late_stale_write_cannot_clobber_a_resolution() {
    let engine = build_engine();
    let device_a = register(&engine, "u1", "a");
    let device_b = register(&engine, "u1", "b");

    let create = OfflineOperation::create(
        &device_a,
        ResourceKind::Thread,
        "t1",
        json!({"title": "original"}),
        VectorClock::for_device(&device_a),
    );
    engine
        .orchestrator
        .process_operation(&device_a, &create.to_sync_operation())
        .unwrap();

    let concurrent = OfflineOperation::update(
        &device_b,
        ResourceKind::Thread,
        "t1",
        json!({"title": "concurrent edit"}),
        VectorClock::for_device(&device_b),
    );
    engine
        .orchestrator
        .process_operation(&device_b, &concurrent.to_sync_operation())
        .unwrap();

    let unresolved = engine.orchestrator.resolver().get_unresolved("u1").unwrap();
    engine
        .orchestrator
        .resolver()
        .resolve_conflict(unresolved[0].id, ResolutionStrategy::RemoteWins, None)
        .unwrap();

    // Replaying B's original (now causally stale) write is a no-op.
    let outcome = engine
        .orchestrator
        .process_operation(&device_b, &concurrent.to_sync_operation())
        .unwrap();
    assert_eq!(outcome, banter_sync_engine::OperationOutcome::Stale);

    let record = engine.threads.get("t1").unwrap().unwrap();
    assert_eq!(record.payload, json!({"title": "concurrent edit"}));
}

#[test]
fn queue_coalescing_runs_before_the_drain() {
    let engine = build_engine();
    let phone = register(&engine, "u1", "phone");

    let mut clock = VectorClock::for_device(&phone);
    for title in ["draft one", "draft two", "final"] {
        engine
            .orchestrator
            .queue()
            .enqueue(OfflineOperation::update(
                &phone,
                ResourceKind::Thread,
                "t1",
                json!({"title": title}),
                clock.clone(),
            ))
            .unwrap();
        clock = clock.increment(&phone);
    }

    engine
        .orchestrator
        .initiate_sync("u1", SyncRequest::new(&phone, vec![ResourceKind::Thread]))
        .unwrap();

    // Only the final update survived coalescing and was applied.
    let record = engine.threads.get("t1").unwrap().unwrap();
    assert_eq!(record.payload, json!({"title": "final"}));

    let stats = engine.orchestrator.queue().stats(&phone).unwrap();
    assert_eq!(stats.synced, 1);
    assert_eq!(stats.pending, 0);
}

#[test]
fn notification_read_state_auto_resolves_across_devices() {
    let engine = build_engine();
    let phone = register(&engine, "u1", "phone");
    let laptop = register(&engine, "u1", "laptop");

    // The phone stores the notification unread.
    engine
        .orchestrator
        .process_operation(
            &phone,
            &OfflineOperation::create(
                &phone,
                ResourceKind::Notification,
                "n1",
                json!({"title": "mention", "read": false}),
                VectorClock::for_device(&phone),
            )
            .to_sync_operation(),
        )
        .unwrap();

    // The laptop marks it read concurrently and bulk-syncs.
    let report = engine
        .orchestrator
        .process_bulk(
            "u1",
            banter_sync_protocol::BulkSyncRequest {
                device_id: laptop.clone(),
                operations: vec![OfflineOperation::update(
                    &laptop,
                    ResourceKind::Notification,
                    "n1",
                    json!({"title": "mention", "read": true, "readAt": "2026-08-05T08:00:00Z"}),
                    VectorClock::for_device(&laptop),
                )],
            },
        )
        .unwrap();

    assert!(report.success);
    assert_eq!(report.conflicts.len(), 1);
    // The read version wins without human input.
    assert_eq!(report.conflicts[0].status, ConflictStatus::AutoResolved);
    assert_eq!(
        report.conflicts[0].resolved_payload.as_ref().unwrap()["read"],
        json!(true)
    );
}
