//! # Banter Sync Engine
//!
//! The multi-device offline synchronization core of the Banter
//! messaging platform.
//!
//! This crate provides:
//! - `DeviceRegistry` for device identity and access validation
//! - `OfflineQueue` for durable per-device operation buffering
//! - `ConflictResolver` for concurrent-write detection and resolution
//! - `SyncOrchestrator` for driving a sync round end to end
//! - Store traits plus in-memory implementations for tests and embedders
//!
//! ## Architecture
//!
//! A sync round is request-driven and bounded: validate the device,
//! fetch server-side changes since the caller's cursor, drain the
//! device's own offline queue, and gate every mutation through a
//! vector-clock comparison against the stored causal state.
//!
//! ## Key invariants
//!
//! - Stale (causally earlier) writes are dropped silently
//! - Concurrent writes become persisted conflicts, never errors
//! - Replaying an operation is idempotent
//! - Sessions for the same device are serialized; other devices proceed
//!   independently

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod memory;
mod orchestrator;
mod queue;
mod registry;
mod resolver;
mod store;

pub use config::EngineConfig;
pub use error::{SyncError, SyncResult};
pub use memory::{
    MemoryConflictStore, MemoryDeviceStore, MemoryOperationStore, MemoryResourceStore,
    MemorySyncStateStore,
};
pub use orchestrator::{OperationOutcome, SyncOrchestrator};
pub use queue::{OfflineQueue, QueueStats};
pub use registry::DeviceRegistry;
pub use resolver::ConflictResolver;
pub use store::{
    ConflictStore, DeviceStore, OperationStore, ResourceRecord, ResourceStore, ResourceStores,
    SyncStateStore,
};
