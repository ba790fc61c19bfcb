// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end integration tests for the broker pipeline.
//!
//! Each test wires the real components against a temp store: SQLite session
//! database, state file, pool allocator, session lifecycle, offline queue,
//! and sync coordinator, the same way `berth serve` does. Tests are
//! independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use berth_broker::{PoolAllocator, SessionLifecycle, run_cleanup};
use berth_config::InstanceSpec;
use berth_core::BerthError;
use berth_core::types::{
    BroadcastRecord, BroadcastStatus, OperationKind, Recipient, SessionStatus, SyncRecord,
    SyncTable, now_timestamp,
};
use berth_device::StateStore;
use berth_storage::{Database, queries};
use berth_sync::{OfflineQueue, SyncCoordinator, spawn_apply_task, spawn_reconnect_watcher};

const OTHER_DEVICE: &str = "9b2f8a64-1c3d-4e5f-8a70-6b1c2d3e4f50";

/// Everything `berth serve` wires up, against a throwaway store.
struct Broker {
    db: Database,
    state: Arc<StateStore>,
    pool: PoolAllocator,
    lifecycle: SessionLifecycle,
    queue: OfflineQueue,
    coordinator: Arc<SyncCoordinator>,
    device_id: String,
    _dir: tempfile::TempDir,
}

impl Broker {
    async fn start(ports: &[u16]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("berth.db").to_str().unwrap(), true)
            .await
            .unwrap();
        let state = Arc::new(StateStore::open(dir.path().join("state.json")).unwrap());
        let device_id = state.device_id().await.unwrap();

        let pool = PoolAllocator::new(db.clone());
        let specs: Vec<InstanceSpec> = ports
            .iter()
            .map(|port| InstanceSpec {
                port: *port,
                container_name: format!("wa-bridge-{port}"),
            })
            .collect();
        pool.provision(&specs).await.unwrap();

        let lifecycle = SessionLifecycle::new(db.clone(), pool.clone(), state.clone());
        let queue = OfflineQueue::new(state.clone(), 64);
        let coordinator = Arc::new(SyncCoordinator::new(db.clone(), queue.clone(), &device_id));

        Broker {
            db,
            state,
            pool,
            lifecycle,
            queue,
            coordinator,
            device_id,
            _dir: dir,
        }
    }

    async fn backdate_session_activity(&self, session_id: &str, stamp: &str) {
        let (session_id, stamp) = (session_id.to_string(), stamp.to_string());
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "UPDATE sessions SET last_active_at = ?1 WHERE id = ?2",
                    rusqlite::params![stamp, session_id],
                )?;
                Ok(())
            })
            .await
            .unwrap();
    }
}

fn broadcast(id: &str, device_id: &str, message: &str) -> SyncRecord {
    SyncRecord::BroadcastHistory(BroadcastRecord {
        id: id.to_string(),
        device_id: device_id.to_string(),
        message: message.to_string(),
        recipients: vec![Recipient {
            phone: "+15550001".into(),
            name: None,
        }],
        sent_count: 0,
        failed_count: 0,
        status: BroadcastStatus::Pending,
        created_at: now_timestamp(),
        updated_at: now_timestamp(),
    })
}

fn broadcast_at(id: &str, device_id: &str, message: &str, updated_at: &str) -> SyncRecord {
    match broadcast(id, device_id, message) {
        SyncRecord::BroadcastHistory(mut record) => {
            record.updated_at = updated_at.to_string();
            SyncRecord::BroadcastHistory(record)
        }
        other => other,
    }
}

/// Poll until the check passes, failing the test after one second.
async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within one second");
}

// ---- Test 1: Session creation and pool binding ----

#[tokio::test]
async fn test_create_session_claims_lowest_port() {
    let broker = Broker::start(&[3003, 3001, 3002]).await;

    let session = broker
        .lifecycle
        .create_session(&broker.device_id)
        .await
        .unwrap();
    assert_eq!(session.api_instance_port, 3001);
    assert_eq!(session.status, SessionStatus::Pending);
    assert!(session.session_token.is_some());

    let summary = broker.pool.status_summary().await.unwrap();
    assert_eq!(summary.in_use, 1);
    assert_eq!(summary.available, 2);

    // The minted token is persisted for the local client.
    assert_eq!(broker.state.session_token().await, session.session_token);
}

// ---- Test 2: Pool exhaustion ----

#[tokio::test]
async fn test_pool_exhaustion_surfaces_without_a_session_row() {
    let broker = Broker::start(&[3001]).await;
    broker
        .lifecycle
        .create_session(&broker.device_id)
        .await
        .unwrap();

    let err = broker
        .lifecycle
        .create_session(OTHER_DEVICE)
        .await
        .unwrap_err();
    assert!(matches!(err, BerthError::PoolExhausted));

    let rows = queries::sessions::list_sessions_for_device(&broker.db, OTHER_DEVICE)
        .await
        .unwrap();
    assert!(rows.is_empty(), "failed create must leave no session row");
}

// ---- Test 3: Re-authentication replaces the previous session ----

#[tokio::test]
async fn test_new_session_for_same_device_reuses_its_port() {
    let broker = Broker::start(&[3001, 3002]).await;

    let first = broker
        .lifecycle
        .create_session(&broker.device_id)
        .await
        .unwrap();
    assert_eq!(first.api_instance_port, 3001);

    let second = broker
        .lifecycle
        .create_session(&broker.device_id)
        .await
        .unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(
        second.api_instance_port, 3001,
        "the replaced session's port is free again and preferred"
    );

    let rows = queries::sessions::list_sessions_for_device(&broker.db, &broker.device_id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1, "one session per device");

    let summary = broker.pool.status_summary().await.unwrap();
    assert_eq!(summary.in_use, 1);
    assert_eq!(summary.available, 1);
}

// ---- Test 4: Dormancy cleanup ----

#[tokio::test]
async fn test_cleanup_reclaims_dormant_session_and_frees_port() {
    let broker = Broker::start(&[3001]).await;
    let session = broker
        .lifecycle
        .create_session(&broker.device_id)
        .await
        .unwrap();
    broker
        .lifecycle
        .mark_connected(&session.id, "+15550001111")
        .await
        .unwrap();
    broker
        .backdate_session_activity(&session.id, "2026-01-01T00:00:00.000Z")
        .await;

    let report = run_cleanup(&broker.db).await.unwrap();
    assert_eq!(report.marked_dormant, 1);
    assert_eq!(report.slots_released, 1);

    let reclaimed = queries::sessions::get_session(&broker.db, &session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.status, SessionStatus::Dormant);

    // The freed port is immediately claimable by another device.
    let next = broker.lifecycle.create_session(OTHER_DEVICE).await.unwrap();
    assert_eq!(next.api_instance_port, 3001);
}

// ---- Test 5: Termination ----

#[tokio::test]
async fn test_terminate_session_releases_port_and_clears_local_token() {
    let broker = Broker::start(&[3001]).await;
    let session = broker
        .lifecycle
        .create_session(&broker.device_id)
        .await
        .unwrap();
    assert!(broker.state.session_token().await.is_some());

    assert!(broker.lifecycle.terminate_session(&session.id).await.unwrap());

    let terminated = queries::sessions::get_session(&broker.db, &session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(terminated.status, SessionStatus::Disconnected);
    assert!(terminated.session_token.is_none());
    assert!(broker.state.session_token().await.is_none());

    let summary = broker.pool.status_summary().await.unwrap();
    assert_eq!(summary.available, 1);
}

// ---- Test 6: Offline queue replay ----

#[tokio::test]
async fn test_drain_replays_queued_operations_in_order() {
    let broker = Broker::start(&[]).await;

    broker
        .queue
        .enqueue(
            OperationKind::Insert,
            broadcast("b-1", &broker.device_id, "v1"),
        )
        .await
        .unwrap();
    broker
        .queue
        .enqueue(
            OperationKind::Update,
            broadcast("b-1", &broker.device_id, "v2"),
        )
        .await
        .unwrap();
    broker
        .queue
        .enqueue(
            OperationKind::Insert,
            broadcast("b-2", &broker.device_id, "fresh"),
        )
        .await
        .unwrap();

    let report = broker.coordinator.drain_queue().await.unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.remaining, 0);
    assert!(broker.queue.is_empty().await);

    let row = queries::records::get_record(&broker.db, SyncTable::BroadcastHistory, "b-1")
        .await
        .unwrap()
        .unwrap();
    match row {
        SyncRecord::BroadcastHistory(b) => {
            assert_eq!(b.message, "v2", "later update replayed after the insert")
        }
        other => panic!("unexpected record: {other:?}"),
    }
    assert!(
        queries::records::get_record(&broker.db, SyncTable::BroadcastHistory, "b-2")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_stale_local_update_loses_to_newer_remote_row() {
    let broker = Broker::start(&[]).await;

    queries::records::insert_record(
        &broker.db,
        &broadcast_at(
            "b-1",
            &broker.device_id,
            "remote",
            "2099-01-01T00:00:00.000Z",
        ),
    )
    .await
    .unwrap();

    broker
        .queue
        .enqueue(
            OperationKind::Update,
            broadcast("b-1", &broker.device_id, "stale local"),
        )
        .await
        .unwrap();

    let report = broker.coordinator.drain_queue().await.unwrap();
    assert_eq!(report.processed, 1, "losing operation is dropped as spent");
    assert!(broker.queue.is_empty().await);

    let row = queries::records::get_record(&broker.db, SyncTable::BroadcastHistory, "b-1")
        .await
        .unwrap()
        .unwrap();
    match row {
        SyncRecord::BroadcastHistory(b) => assert_eq!(b.message, "remote"),
        other => panic!("unexpected record: {other:?}"),
    }
}

// ---- Test 7: Reconnect replay and live feed ----

#[tokio::test]
async fn test_queued_work_lands_after_coming_online() {
    let broker = Broker::start(&[]).await;
    broker
        .queue
        .enqueue(
            OperationKind::Insert,
            broadcast("b-offline", &broker.device_id, "queued while offline"),
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let (tx, rx) = watch::channel(false);
    let watcher = spawn_reconnect_watcher(broker.coordinator.clone(), rx, cancel.clone());

    tx.send(true).unwrap();
    wait_until(|| async { broker.queue.is_empty().await }).await;

    let row = queries::records::get_record(&broker.db, SyncTable::BroadcastHistory, "b-offline")
        .await
        .unwrap();
    assert!(row.is_some(), "queued insert reaches the store on reconnect");

    cancel.cancel();
    watcher.await.unwrap();
}

#[tokio::test]
async fn test_feed_events_reach_the_replica() {
    let broker = Broker::start(&[]).await;
    let cancel = CancellationToken::new();
    let apply = spawn_apply_task(broker.coordinator.clone(), cancel.clone());

    queries::records::insert_record(&broker.db, &broadcast("b-live", &broker.device_id, "pushed"))
        .await
        .unwrap();

    wait_until(|| async {
        !broker
            .coordinator
            .snapshot(SyncTable::BroadcastHistory)
            .await
            .is_empty()
    })
    .await;

    cancel.cancel();
    apply.await.unwrap();
}
