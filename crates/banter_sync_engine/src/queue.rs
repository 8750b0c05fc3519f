//! Durable per-device offline operation queue.

use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::OperationStore;
use banter_sync_protocol::{OfflineOperation, OperationKind, OperationStatus};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Counts of a device's queued operations per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Operations awaiting reconciliation.
    pub pending: usize,
    /// Operations reconciled successfully.
    pub synced: usize,
    /// Operations terminally failed.
    pub failed: usize,
    /// Operations parked behind a conflict.
    pub conflict: usize,
}

/// The offline operation queue.
///
/// Buffers locally made mutations per device until a sync round drains
/// them. Status transitions and the retry ceiling live here; the
/// causality decisions do not.
pub struct OfflineQueue {
    store: Arc<dyn OperationStore>,
    config: EngineConfig,
}

impl OfflineQueue {
    /// Creates a queue over an operation store.
    pub fn new(store: Arc<dyn OperationStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Appends an operation with status pending.
    pub fn enqueue(&self, operation: OfflineOperation) -> SyncResult<Uuid> {
        let id = operation.id;
        self.store.append(operation)?;
        Ok(id)
    }

    /// Appends a batch of operations, preserving order.
    pub fn enqueue_bulk(&self, operations: Vec<OfflineOperation>) -> SyncResult<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(operations.len());
        for operation in operations {
            ids.push(self.enqueue(operation)?);
        }
        Ok(ids)
    }

    /// Returns up to `limit` pending operations, oldest first.
    pub fn dequeue_pending(
        &self,
        device_id: &str,
        limit: usize,
    ) -> SyncResult<Vec<OfflineOperation>> {
        let mut pending: Vec<OfflineOperation> = self
            .store
            .list_for_device(device_id)?
            .into_iter()
            .filter(|op| op.status == OperationStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit);
        Ok(pending)
    }

    /// Marks an operation reconciled. Terminal.
    pub fn mark_synced(&self, operation_id: Uuid) -> SyncResult<()> {
        let mut operation = self.require(operation_id)?;
        operation.status = OperationStatus::Synced;
        operation.last_error = None;
        self.store.update(operation)
    }

    /// Records a failed reconciliation attempt.
    ///
    /// Below the retry ceiling the operation stays pending and will be
    /// picked up by the next round; at the ceiling it becomes terminally
    /// failed and needs an explicit [`retry_failed`](Self::retry_failed).
    pub fn mark_failed(&self, operation_id: Uuid, error: &str) -> SyncResult<()> {
        let mut operation = self.require(operation_id)?;
        operation.retry_count += 1;
        operation.last_error = Some(error.to_string());
        operation.status = if operation.retry_count >= self.config.retry_limit {
            OperationStatus::Failed
        } else {
            OperationStatus::Pending
        };
        self.store.update(operation)
    }

    /// Parks an operation behind an unresolved conflict.
    pub fn mark_conflicted(&self, operation_id: Uuid) -> SyncResult<()> {
        let mut operation = self.require(operation_id)?;
        operation.status = OperationStatus::Conflict;
        self.store.update(operation)
    }

    /// Resets a device's terminally failed operations to pending with a
    /// fresh retry budget. Returns the number reset.
    pub fn retry_failed(&self, device_id: &str) -> SyncResult<usize> {
        let mut reset = 0;
        for mut operation in self.store.list_for_device(device_id)? {
            if operation.status == OperationStatus::Failed {
                operation.status = OperationStatus::Pending;
                operation.retry_count = 0;
                operation.last_error = None;
                self.store.update(operation)?;
                reset += 1;
            }
        }
        Ok(reset)
    }

    /// Garbage-collects synced operations older than the retention
    /// window. Returns the number removed. `None` uses the configured
    /// retention.
    pub fn clear_synced(&self, device_id: &str, older_than_days: Option<i64>) -> SyncResult<usize> {
        let days = older_than_days.unwrap_or(self.config.synced_retention_days);
        let cutoff = Utc::now() - Duration::days(days);

        let mut removed = 0;
        for operation in self.store.list_for_device(device_id)? {
            if operation.status == OperationStatus::Synced && operation.created_at < cutoff {
                if self.store.remove(operation.id)? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Counts a device's operations per status.
    pub fn stats(&self, device_id: &str) -> SyncResult<QueueStats> {
        let mut stats = QueueStats::default();
        for operation in self.store.list_for_device(device_id)? {
            match operation.status {
                OperationStatus::Pending => stats.pending += 1,
                OperationStatus::Synced => stats.synced += 1,
                OperationStatus::Failed => stats.failed += 1,
                OperationStatus::Conflict => stats.conflict += 1,
            }
        }
        Ok(stats)
    }

    /// Coalesces a device's pending operations.
    ///
    /// Operations are grouped per (kind, resource id) and scanned in
    /// creation order, collapsing against the previous survivor:
    /// update then update drops the earlier, create then delete drops
    /// both, update then delete drops the update. Groups never interact,
    /// so operations on different resources are never reordered, and a
    /// second pass finds nothing left to collapse.
    ///
    /// Returns the number of operations removed.
    pub fn optimize(&self, device_id: &str) -> SyncResult<usize> {
        let pending = self.dequeue_pending(device_id, usize::MAX)?;

        let mut groups: HashMap<_, Vec<OfflineOperation>> = HashMap::new();
        for operation in pending {
            groups
                .entry((operation.resource_kind, operation.resource_id.clone()))
                .or_default()
                .push(operation);
        }

        let mut removed = 0;
        for (_, group) in groups {
            let mut survivors: Vec<OfflineOperation> = Vec::with_capacity(group.len());

            for operation in group {
                let mut incoming = Some(operation);
                while let Some(op) = incoming.take() {
                    let Some(previous) = survivors.last() else {
                        survivors.push(op);
                        break;
                    };
                    match (previous.kind, op.kind) {
                        // The newer update or the delete supersedes the
                        // previous update; re-compare against the new tail.
                        (OperationKind::Update, OperationKind::Update)
                        | (OperationKind::Update, OperationKind::Delete) => {
                            if let Some(dropped) = survivors.pop() {
                                self.store.remove(dropped.id)?;
                                removed += 1;
                            }
                            incoming = Some(op);
                        }
                        // The resource never existed as far as the server
                        // is concerned; both sides vanish.
                        (OperationKind::Create, OperationKind::Delete) => {
                            if let Some(dropped) = survivors.pop() {
                                self.store.remove(dropped.id)?;
                                removed += 1;
                            }
                            self.store.remove(op.id)?;
                            removed += 1;
                        }
                        _ => survivors.push(op),
                    }
                }
            }
        }

        if removed > 0 {
            debug!(device_id, removed, "coalesced offline queue");
        }
        Ok(removed)
    }

    fn require(&self, operation_id: Uuid) -> SyncResult<OfflineOperation> {
        self.store
            .get(operation_id)?
            .ok_or(SyncError::OperationNotFound { operation_id })
    }
}
