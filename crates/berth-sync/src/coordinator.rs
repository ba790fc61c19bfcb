// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciliation between the shared store and this device's replica.
//!
//! The coordinator keeps an in-memory replica of this device's synced rows,
//! applies change-feed events to it, and replays the offline queue against
//! the shared store. Everything is scoped to one device id: rows belonging
//! to other devices never enter the replica, and replayed writes carry the
//! owning device id down into the storage layer.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use berth_core::BerthError;
use berth_core::types::{
    ChangeEvent, OperationKind, QueuedOperation, SyncRecord, SyncTable, parse_timestamp,
};
use berth_storage::{Database, queries};

use crate::queue::{ConflictWinner, DrainReport, OfflineQueue, resolve_conflict};

/// Device-scoped view of the synced tables plus the replay machinery.
pub struct SyncCoordinator {
    db: Database,
    queue: OfflineQueue,
    device_id: String,
    replica: Mutex<Vec<SyncRecord>>,
}

impl SyncCoordinator {
    pub fn new(db: Database, queue: OfflineQueue, device_id: &str) -> Self {
        Self {
            db,
            queue,
            device_id: device_id.to_string(),
            replica: Mutex::new(Vec::new()),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Load one table's rows for this device from the shared store and
    /// replace that table's slice of the replica with them.
    ///
    /// Rows of other devices never appear, whatever the store holds.
    pub async fn fetch_all(&self, table: SyncTable) -> Result<Vec<SyncRecord>, BerthError> {
        let rows: Vec<SyncRecord> = queries::records::fetch_all(&self.db, &self.device_id)
            .await?
            .into_iter()
            .filter(|record| record.table() == table)
            .collect();

        let mut replica = self.replica.lock().await;
        replica.retain(|record| record.table() != table);
        replica.extend(rows.iter().cloned());

        debug!(%table, rows = rows.len(), "replica refreshed from store");
        Ok(rows)
    }

    /// Current replica contents for one table.
    pub async fn snapshot(&self, table: SyncTable) -> Vec<SyncRecord> {
        self.replica
            .lock()
            .await
            .iter()
            .filter(|record| record.table() == table)
            .cloned()
            .collect()
    }

    /// Fold one observed change into the replica.
    ///
    /// Inserts are idempotent under redelivery (a second event for the same
    /// id changes nothing); updates against an unknown row and deletes of an
    /// absent row are silent no-ops, tolerating out-of-order delivery. The
    /// change feed is process-wide, so events for other devices are skipped
    /// here rather than at the subscription.
    pub async fn apply_remote_change(&self, event: ChangeEvent) {
        if event.device_id() != self.device_id {
            return;
        }

        let mut replica = self.replica.lock().await;
        match event {
            ChangeEvent::Inserted(record) => {
                let exists = replica
                    .iter()
                    .any(|r| r.table() == record.table() && r.id() == record.id());
                if !exists {
                    replica.push(record);
                }
            }
            ChangeEvent::Updated(record) => {
                if let Some(slot) = replica
                    .iter_mut()
                    .find(|r| r.table() == record.table() && r.id() == record.id())
                {
                    *slot = record;
                }
            }
            ChangeEvent::Deleted { table, id, .. } => {
                replica.retain(|r| !(r.table() == table && r.id() == id));
            }
        }
    }

    /// Replay one queued operation against the shared store.
    ///
    /// `true` means the operation is spent and leaves the queue; that covers
    /// successful writes, but also updates dropped because the remote row is
    /// newer (last-write-wins) and deletes of rows already gone. `false`
    /// means the write failed and the operation stays queued for the next
    /// pass.
    pub async fn process_queue_entry(&self, op: &QueuedOperation) -> bool {
        let table = op.record.table();

        let result: Result<bool, BerthError> = async {
            match op.kind {
                OperationKind::Insert | OperationKind::Update => {
                    let remote =
                        queries::records::get_record(&self.db, table, op.record.id()).await?;

                    if op.kind == OperationKind::Update
                        && let Some(remote) = &remote
                    {
                        let winner = match parse_timestamp(remote.updated_at()) {
                            Some(remote_at) => {
                                resolve_conflict(op.timestamp, remote_at.timestamp_millis())
                            }
                            // An unreadable remote timestamp keeps the remote row.
                            None => ConflictWinner::Remote,
                        };
                        if winner == ConflictWinner::Remote {
                            info!(
                                op_id = %op.id,
                                %table,
                                id = op.record.id(),
                                "remote row is newer, dropping queued update"
                            );
                            return Ok(true);
                        }
                    }

                    if op.kind == OperationKind::Insert && remote.is_none() {
                        queries::records::insert_record(&self.db, &op.record).await?;
                    } else {
                        // An insert over an existing row degrades to an
                        // update; an update whose row vanished writes
                        // nothing. A row appearing between the check and the
                        // write still gets the payload.
                        queries::records::update_record(&self.db, &op.record).await?;
                    }
                    Ok(true)
                }
                OperationKind::Delete => {
                    queries::records::delete_record(
                        &self.db,
                        table,
                        op.record.id(),
                        op.record.device_id(),
                    )
                    .await?;
                    Ok(true)
                }
            }
        }
        .await;

        match result {
            Ok(processed) => processed,
            Err(e) => {
                warn!(
                    op_id = %op.id,
                    %table,
                    id = op.record.id(),
                    error = %e,
                    "queue replay failed, operation stays queued"
                );
                false
            }
        }
    }

    /// Replay the whole offline queue in enqueue-time order.
    pub async fn drain_queue(&self) -> Result<DrainReport, BerthError> {
        self.queue
            .drain(|op| async move { self.process_queue_entry(&op).await })
            .await
    }
}

/// Replay the queue whenever connectivity comes back.
///
/// Each offline→online flip of the connectivity signal with a non-empty
/// queue triggers exactly one drain. A signal already online when the task
/// starts counts as one flip, so work queued by a previous run replays at
/// startup. The task stops when the token cancels or the signal's sender is
/// dropped.
pub fn spawn_reconnect_watcher(
    coordinator: Arc<SyncCoordinator>,
    mut connectivity: watch::Receiver<bool>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut online = *connectivity.borrow_and_update();
        if online {
            drain_if_pending(&coordinator).await;
        }
        loop {
            tokio::select! {
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now_online = *connectivity.borrow_and_update();
                    let came_online = now_online && !online;
                    online = now_online;
                    if came_online {
                        drain_if_pending(&coordinator).await;
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        debug!("reconnect watcher stopped");
    })
}

async fn drain_if_pending(coordinator: &SyncCoordinator) {
    if coordinator.queue().is_empty().await {
        debug!("online with an empty queue, nothing to replay");
        return;
    }
    match coordinator.drain_queue().await {
        Ok(report) => info!(
            processed = report.processed,
            remaining = report.remaining,
            "offline queue replayed after reconnect"
        ),
        Err(e) => warn!(error = %e, "offline queue replay failed"),
    }
}

/// Feed change events into the coordinator's replica until shutdown.
pub fn spawn_apply_task(
    coordinator: Arc<SyncCoordinator>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut events = coordinator.db.feed().subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => coordinator.apply_remote_change(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "change feed lagged, replica is stale until the next fetch");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = cancel.cancelled() => break,
            }
        }
        debug!("change apply task stopped");
    })
}
