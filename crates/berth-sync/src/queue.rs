// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offline mutation queue.
//!
//! Mutations issued while the shared store is unreachable are queued in the
//! client-local state file and replayed in enqueue-time order once
//! connectivity returns. Replay is at-least-once: an operation is removed
//! only after its remote write succeeded, so a crash in between replays it.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use berth_core::BerthError;
use berth_core::types::{OperationKind, QueuedOperation, SyncRecord};
use berth_device::StateStore;

/// Which side keeps its row after a replay conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictWinner {
    Local,
    Remote,
}

/// Last-write-wins on epoch-millisecond timestamps. Ties favor the local
/// side, so a device never loses its own write to an equally-old remote one.
pub fn resolve_conflict(local_ms: i64, remote_ms: i64) -> ConflictWinner {
    if local_ms >= remote_ms {
        ConflictWinner::Local
    } else {
        ConflictWinner::Remote
    }
}

/// What a [`OfflineQueue::drain`] pass accomplished.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Operations processed and removed from the queue.
    pub processed: usize,
    /// Operations whose replay failed; they stay queued for the next pass.
    pub remaining: usize,
}

/// FIFO queue of pending mutations, persisted in the local state file.
///
/// Every method rewrites the whole persisted queue; queues stay small (the
/// cap is a few hundred to a few thousand entries) and the state file is
/// private to this process.
#[derive(Clone)]
pub struct OfflineQueue {
    state: Arc<StateStore>,
    max_len: usize,
}

impl OfflineQueue {
    /// `max_len` is the enqueue cap; replay is unaffected by it.
    pub fn new(state: Arc<StateStore>, max_len: usize) -> Self {
        Self { state, max_len }
    }

    /// Append a mutation, assigning its id and enqueue timestamp.
    ///
    /// Fails with [`BerthError::QueueFull`] at the cap rather than growing
    /// without bound while the store is unreachable.
    pub async fn enqueue(
        &self,
        kind: OperationKind,
        record: SyncRecord,
    ) -> Result<QueuedOperation, BerthError> {
        let mut queue = self.state.offline_queue().await;
        if queue.len() >= self.max_len {
            return Err(BerthError::QueueFull {
                limit: self.max_len,
            });
        }

        let op = QueuedOperation {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            record,
            timestamp: Utc::now().timestamp_millis(),
        };
        queue.push(op.clone());
        self.state.save_offline_queue(&queue).await?;

        debug!(
            op_id = %op.id,
            kind = %op.kind,
            table = %op.record.table(),
            queued = queue.len(),
            "operation queued"
        );
        Ok(op)
    }

    /// Remove an operation by id. Removing an unknown id is a no-op.
    pub async fn dequeue(&self, id: &str) -> Result<(), BerthError> {
        let mut queue = self.state.offline_queue().await;
        let before = queue.len();
        queue.retain(|op| op.id != id);
        if queue.len() != before {
            self.state.save_offline_queue(&queue).await?;
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.offline_queue().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.offline_queue().await.is_empty()
    }

    /// Snapshot of the queue in replay order (ascending enqueue time).
    pub async fn sorted(&self) -> Vec<QueuedOperation> {
        let mut queue = self.state.offline_queue().await;
        queue.sort_by_key(|op| op.timestamp);
        queue
    }

    /// Replay the queue in enqueue-time order.
    ///
    /// `process_one` returning `true` removes the operation; `false` leaves
    /// it queued and moves on, so one stuck operation never blocks the rest.
    pub async fn drain<F, Fut>(&self, mut process_one: F) -> Result<DrainReport, BerthError>
    where
        F: FnMut(QueuedOperation) -> Fut,
        Fut: Future<Output = bool>,
    {
        let snapshot = self.sorted().await;
        let mut report = DrainReport::default();

        for op in snapshot {
            let op_id = op.id.clone();
            if process_one(op).await {
                self.dequeue(&op_id).await?;
                report.processed += 1;
            } else {
                debug!(op_id = %op_id, "operation replay failed, leaving queued");
                report.remaining += 1;
            }
        }

        Ok(report)
    }
}
