// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker pool slot operations.
//!
//! The claim path relies on a conditional UPDATE: the row only flips to
//! `in_use` when it is still `available` at execution time, so two callers
//! racing for the same port cannot both win.

use rusqlite::params;

use berth_core::BerthError;
use berth_core::types::{PoolInstance, PoolSummary, now_timestamp};

use crate::database::Database;
use crate::queries::parse_text_column;

fn instance_from_row(row: &rusqlite::Row<'_>) -> Result<PoolInstance, rusqlite::Error> {
    Ok(PoolInstance {
        id: row.get(0)?,
        port: row.get(1)?,
        status: parse_text_column(2, &row.get::<_, String>(2)?)?,
        session_id: row.get(3)?,
        container_name: row.get(4)?,
        last_health_check: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Register a pool slot, keyed by port.
///
/// A new slot starts `available`. An existing slot only has its
/// `container_name` refreshed; live status and session binding are preserved
/// so re-provisioning never kicks out an active session.
pub async fn upsert_instance(
    db: &Database,
    port: u16,
    container_name: &str,
) -> Result<(), BerthError> {
    let id = uuid::Uuid::new_v4().to_string();
    let container_name = container_name.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO session_pool
                     (id, port, status, session_id, container_name, last_health_check, created_at, updated_at)
                 VALUES (?1, ?2, 'available', NULL, ?3, NULL, ?4, ?4)
                 ON CONFLICT(port) DO UPDATE SET
                     container_name = excluded.container_name,
                     updated_at = excluded.updated_at",
                params![id, port, container_name, now],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get one slot by port.
pub async fn get_instance(db: &Database, port: u16) -> Result<Option<PoolInstance>, BerthError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, port, status, session_id, container_name, last_health_check, created_at, updated_at
                 FROM session_pool WHERE port = ?1",
            )?;
            let result = stmt.query_row(params![port], instance_from_row);
            match result {
                Ok(instance) => Ok(Some(instance)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All slots, lowest port first.
pub async fn list_instances(db: &Database) -> Result<Vec<PoolInstance>, BerthError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, port, status, session_id, container_name, last_health_check, created_at, updated_at
                 FROM session_pool ORDER BY port ASC",
            )?;
            let rows = stmt.query_map([], instance_from_row)?;
            let mut instances = Vec::new();
            for row in rows {
                instances.push(row?);
            }
            Ok(instances)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Slots currently free to claim, lowest port first.
pub async fn list_available(db: &Database) -> Result<Vec<PoolInstance>, BerthError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, port, status, session_id, container_name, last_health_check, created_at, updated_at
                 FROM session_pool WHERE status = 'available' ORDER BY port ASC",
            )?;
            let rows = stmt.query_map([], instance_from_row)?;
            let mut instances = Vec::new();
            for row in rows {
                instances.push(row?);
            }
            Ok(instances)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Slots currently bound (or mid-bind), for the orphan sweep.
pub async fn instances_in_use(db: &Database) -> Result<Vec<PoolInstance>, BerthError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, port, status, session_id, container_name, last_health_check, created_at, updated_at
                 FROM session_pool WHERE status = 'in_use' ORDER BY port ASC",
            )?;
            let rows = stmt.query_map([], instance_from_row)?;
            let mut instances = Vec::new();
            for row in rows {
                instances.push(row?);
            }
            Ok(instances)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Atomically claim a slot that is still `available`, stamping the health
/// check time.
///
/// Returns `false` when the row was already taken (or the port is unknown);
/// the caller moves on to the next candidate.
pub async fn claim_instance(db: &Database, port: u16) -> Result<bool, BerthError> {
    let now = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE session_pool
                 SET status = 'in_use', last_health_check = ?2, updated_at = ?2
                 WHERE port = ?1 AND status = 'available'",
                params![port, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Return a slot to the pool, clearing any session binding.
///
/// Idempotent: releasing an already-available slot is a no-op that still
/// reports `true`. Only an unknown port reports `false`.
pub async fn release_instance(db: &Database, port: u16) -> Result<bool, BerthError> {
    let now = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE session_pool
                 SET status = 'available', session_id = NULL, updated_at = ?2
                 WHERE port = ?1",
                params![port, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Stamp the owning session onto a slot, forcing it `in_use`.
///
/// Runs unconditionally so a crash between claim and bind self-heals the
/// next time the same port is handed out.
pub async fn bind_session(db: &Database, port: u16, session_id: &str) -> Result<bool, BerthError> {
    let session_id = session_id.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE session_pool
                 SET status = 'in_use', session_id = ?2, updated_at = ?3
                 WHERE port = ?1",
                params![port, session_id, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Aggregate counts across the whole pool.
pub async fn status_counts(db: &Database) -> Result<PoolSummary, BerthError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT
                     COUNT(*),
                     COALESCE(SUM(status = 'available'), 0),
                     COALESCE(SUM(status = 'in_use'), 0),
                     COALESCE(SUM(status = 'maintenance'), 0)
                 FROM session_pool",
                [],
                |row| {
                    Ok(PoolSummary {
                        total: row.get(0)?,
                        available: row.get(1)?,
                        in_use: row.get(2)?,
                        maintenance: row.get(3)?,
                    })
                },
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::types::InstanceStatus;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn upsert_creates_available_slot() {
        let (db, _dir) = setup_db().await;

        upsert_instance(&db, 3001, "wa-bridge-1").await.unwrap();

        let slot = get_instance(&db, 3001).await.unwrap().unwrap();
        assert_eq!(slot.port, 3001);
        assert_eq!(slot.status, InstanceStatus::Available);
        assert_eq!(slot.container_name, "wa-bridge-1");
        assert!(slot.session_id.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_existing_keeps_status_and_binding() {
        let (db, _dir) = setup_db().await;
        upsert_instance(&db, 3001, "wa-bridge-1").await.unwrap();
        assert!(claim_instance(&db, 3001).await.unwrap());
        assert!(bind_session(&db, 3001, "sess-1").await.unwrap());

        upsert_instance(&db, 3001, "wa-bridge-1-renamed").await.unwrap();

        let slot = get_instance(&db, 3001).await.unwrap().unwrap();
        assert_eq!(slot.status, InstanceStatus::InUse);
        assert_eq!(slot.session_id.as_deref(), Some("sess-1"));
        assert_eq!(slot.container_name, "wa-bridge-1-renamed");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_flips_available_to_in_use_once() {
        let (db, _dir) = setup_db().await;
        upsert_instance(&db, 3002, "wa-bridge-2").await.unwrap();

        assert!(claim_instance(&db, 3002).await.unwrap());
        // Second claim loses: the row is no longer available.
        assert!(!claim_instance(&db, 3002).await.unwrap());

        let slot = get_instance(&db, 3002).await.unwrap().unwrap();
        assert_eq!(slot.status, InstanceStatus::InUse);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_unknown_port_returns_false() {
        let (db, _dir) = setup_db().await;
        assert!(!claim_instance(&db, 4999).await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn release_clears_binding_and_is_idempotent() {
        let (db, _dir) = setup_db().await;
        upsert_instance(&db, 3003, "wa-bridge-3").await.unwrap();
        assert!(claim_instance(&db, 3003).await.unwrap());
        assert!(bind_session(&db, 3003, "sess-9").await.unwrap());

        assert!(release_instance(&db, 3003).await.unwrap());
        let slot = get_instance(&db, 3003).await.unwrap().unwrap();
        assert_eq!(slot.status, InstanceStatus::Available);
        assert!(slot.session_id.is_none());

        // Releasing again still succeeds; unknown port does not.
        assert!(release_instance(&db, 3003).await.unwrap());
        assert!(!release_instance(&db, 4999).await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_available_orders_by_port() {
        let (db, _dir) = setup_db().await;
        upsert_instance(&db, 3003, "wa-bridge-3").await.unwrap();
        upsert_instance(&db, 3001, "wa-bridge-1").await.unwrap();
        upsert_instance(&db, 3002, "wa-bridge-2").await.unwrap();
        assert!(claim_instance(&db, 3002).await.unwrap());

        let available = list_available(&db).await.unwrap();
        let ports: Vec<u16> = available.iter().map(|i| i.port).collect();
        assert_eq!(ports, vec![3001, 3003]);

        let all = list_instances(&db).await.unwrap();
        let ports: Vec<u16> = all.iter().map(|i| i.port).collect();
        assert_eq!(ports, vec![3001, 3002, 3003]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn status_counts_reflect_claims() {
        let (db, _dir) = setup_db().await;
        for (port, name) in [(3001, "a"), (3002, "b"), (3003, "c"), (3004, "d"), (3005, "e")] {
            upsert_instance(&db, port, name).await.unwrap();
        }
        assert!(claim_instance(&db, 3001).await.unwrap());
        assert!(claim_instance(&db, 3004).await.unwrap());

        let summary = status_counts(&db).await.unwrap();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.available, 3);
        assert_eq!(summary.in_use, 2);
        assert_eq!(summary.maintenance, 0);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn status_counts_on_empty_pool() {
        let (db, _dir) = setup_db().await;
        let summary = status_counts(&db).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.available, 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_stamps_health_check_time() {
        let (db, _dir) = setup_db().await;
        upsert_instance(&db, 3001, "wa-bridge-1").await.unwrap();
        assert!(get_instance(&db, 3001).await.unwrap().unwrap().last_health_check.is_none());

        assert!(claim_instance(&db, 3001).await.unwrap());
        assert!(get_instance(&db, 3001).await.unwrap().unwrap().last_health_check.is_some());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn in_use_listing_for_orphan_sweep() {
        let (db, _dir) = setup_db().await;
        upsert_instance(&db, 3001, "a").await.unwrap();
        upsert_instance(&db, 3002, "b").await.unwrap();
        assert!(claim_instance(&db, 3002).await.unwrap());

        let in_use = instances_in_use(&db).await.unwrap();
        assert_eq!(in_use.len(), 1);
        assert_eq!(in_use[0].port, 3002);
        // Claimed but not yet bound: session_id is transiently null.
        assert!(in_use[0].session_id.is_none());

        db.close().await.unwrap();
    }
}
