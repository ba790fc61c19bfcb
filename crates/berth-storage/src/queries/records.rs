// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CRUD for the synced tables (`broadcast_history`, `scheduled_messages`).
//!
//! Reads used for existence checks are by ID alone; every write is scoped to
//! the owning device so one device can never mutate another's rows. Committed
//! writes publish on the database change feed.

use rusqlite::params;

use berth_core::BerthError;
use berth_core::types::{
    BroadcastRecord, ChangeEvent, Recipient, ScheduledMessage, SyncRecord, SyncTable,
};

use crate::database::Database;
use crate::queries::parse_text_column;

fn broadcast_from_row(row: &rusqlite::Row<'_>) -> Result<BroadcastRecord, rusqlite::Error> {
    let recipients_json: String = row.get(3)?;
    Ok(BroadcastRecord {
        id: row.get(0)?,
        device_id: row.get(1)?,
        message: row.get(2)?,
        recipients: serde_json::from_str(&recipients_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        sent_count: row.get(4)?,
        failed_count: row.get(5)?,
        status: parse_text_column(6, &row.get::<_, String>(6)?)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn scheduled_from_row(row: &rusqlite::Row<'_>) -> Result<ScheduledMessage, rusqlite::Error> {
    Ok(ScheduledMessage {
        id: row.get(0)?,
        device_id: row.get(1)?,
        contact_id: row.get(2)?,
        broadcast_id: row.get(3)?,
        message: row.get(4)?,
        media_url: row.get(5)?,
        media_type: row.get(6)?,
        scheduled_time: row.get(7)?,
        status: parse_text_column(8, &row.get::<_, String>(8)?)?,
        error_message: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        sent_at: row.get(12)?,
    })
}

fn encode_recipients(recipients: &[Recipient]) -> Result<String, rusqlite::Error> {
    serde_json::to_string(recipients)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Everything the shared store holds for one device, broadcasts first.
pub async fn fetch_all(db: &Database, device_id: &str) -> Result<Vec<SyncRecord>, BerthError> {
    let device_id = device_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut records = Vec::new();

            let mut stmt = conn.prepare(
                "SELECT id, device_id, message, recipients, sent_count, failed_count,
                        status, created_at, updated_at
                 FROM broadcast_history WHERE device_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![device_id], broadcast_from_row)?;
            for row in rows {
                records.push(SyncRecord::BroadcastHistory(row?));
            }

            let mut stmt = conn.prepare(
                "SELECT id, device_id, contact_id, broadcast_id, message, media_url,
                        media_type, scheduled_time, status, error_message, created_at,
                        updated_at, sent_at
                 FROM scheduled_messages WHERE device_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![device_id], scheduled_from_row)?;
            for row in rows {
                records.push(SyncRecord::ScheduledMessages(row?));
            }

            Ok(records)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Look up one record by ID in its table. Existence checks are ID-only.
pub async fn get_record(
    db: &Database,
    table: SyncTable,
    id: &str,
) -> Result<Option<SyncRecord>, BerthError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let result = match table {
                SyncTable::BroadcastHistory => {
                    let mut stmt = conn.prepare(
                        "SELECT id, device_id, message, recipients, sent_count, failed_count,
                                status, created_at, updated_at
                         FROM broadcast_history WHERE id = ?1",
                    )?;
                    stmt.query_row(params![id], broadcast_from_row)
                        .map(SyncRecord::BroadcastHistory)
                }
                SyncTable::ScheduledMessages => {
                    let mut stmt = conn.prepare(
                        "SELECT id, device_id, contact_id, broadcast_id, message, media_url,
                                media_type, scheduled_time, status, error_message, created_at,
                                updated_at, sent_at
                         FROM scheduled_messages WHERE id = ?1",
                    )?;
                    stmt.query_row(params![id], scheduled_from_row)
                        .map(SyncRecord::ScheduledMessages)
                }
            };
            match result {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert a record into its table.
///
/// Plain INSERT: a duplicate ID is a constraint error. Callers that need
/// insert-or-update semantics check existence first and degrade to
/// [`update_record`].
pub async fn insert_record(db: &Database, record: &SyncRecord) -> Result<(), BerthError> {
    let stored = record.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            match &stored {
                SyncRecord::BroadcastHistory(b) => {
                    let recipients = encode_recipients(&b.recipients)?;
                    conn.execute(
                        "INSERT INTO broadcast_history
                             (id, device_id, message, recipients, sent_count, failed_count,
                              status, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        params![
                            b.id,
                            b.device_id,
                            b.message,
                            recipients,
                            b.sent_count,
                            b.failed_count,
                            b.status.to_string(),
                            b.created_at,
                            b.updated_at,
                        ],
                    )?;
                }
                SyncRecord::ScheduledMessages(m) => {
                    conn.execute(
                        "INSERT INTO scheduled_messages
                             (id, device_id, contact_id, broadcast_id, message, media_url,
                              media_type, scheduled_time, status, error_message, created_at,
                              updated_at, sent_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                        params![
                            m.id,
                            m.device_id,
                            m.contact_id,
                            m.broadcast_id,
                            m.message,
                            m.media_url,
                            m.media_type,
                            m.scheduled_time,
                            m.status.to_string(),
                            m.error_message,
                            m.created_at,
                            m.updated_at,
                            m.sent_at,
                        ],
                    )?;
                }
            }
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    db.feed().emit(ChangeEvent::Inserted(record.clone()));
    Ok(())
}

/// Replace a record's payload in place.
///
/// Returns `false` (without emitting) when no row matches the ID and device;
/// updating a missing record is a no-op, not an error.
pub async fn update_record(db: &Database, record: &SyncRecord) -> Result<bool, BerthError> {
    let stored = record.clone();
    let changed = db
        .connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = match &stored {
                SyncRecord::BroadcastHistory(b) => {
                    let recipients = encode_recipients(&b.recipients)?;
                    conn.execute(
                        "UPDATE broadcast_history
                         SET message = ?3, recipients = ?4, sent_count = ?5, failed_count = ?6,
                             status = ?7, created_at = ?8, updated_at = ?9
                         WHERE id = ?1 AND device_id = ?2",
                        params![
                            b.id,
                            b.device_id,
                            b.message,
                            recipients,
                            b.sent_count,
                            b.failed_count,
                            b.status.to_string(),
                            b.created_at,
                            b.updated_at,
                        ],
                    )?
                }
                SyncRecord::ScheduledMessages(m) => conn.execute(
                    "UPDATE scheduled_messages
                     SET contact_id = ?3, broadcast_id = ?4, message = ?5, media_url = ?6,
                         media_type = ?7, scheduled_time = ?8, status = ?9, error_message = ?10,
                         created_at = ?11, updated_at = ?12, sent_at = ?13
                     WHERE id = ?1 AND device_id = ?2",
                    params![
                        m.id,
                        m.device_id,
                        m.contact_id,
                        m.broadcast_id,
                        m.message,
                        m.media_url,
                        m.media_type,
                        m.scheduled_time,
                        m.status.to_string(),
                        m.error_message,
                        m.created_at,
                        m.updated_at,
                        m.sent_at,
                    ],
                )?,
            };
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if changed {
        db.feed().emit(ChangeEvent::Updated(record.clone()));
    }
    Ok(changed)
}

/// Delete a record. Deleting a missing record is a no-op returning `false`.
pub async fn delete_record(
    db: &Database,
    table: SyncTable,
    id: &str,
    device_id: &str,
) -> Result<bool, BerthError> {
    let id_param = id.to_string();
    let device_param = device_id.to_string();
    let changed = db
        .connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let sql = match table {
                SyncTable::BroadcastHistory => {
                    "DELETE FROM broadcast_history WHERE id = ?1 AND device_id = ?2"
                }
                SyncTable::ScheduledMessages => {
                    "DELETE FROM scheduled_messages WHERE id = ?1 AND device_id = ?2"
                }
            };
            let changed = conn.execute(sql, params![id_param, device_param])?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if changed {
        db.feed().emit(ChangeEvent::Deleted {
            table,
            id: id.to_string(),
            device_id: device_id.to_string(),
        });
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::types::{BroadcastStatus, ScheduleStatus, now_timestamp};

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    fn sample_broadcast(id: &str, device_id: &str) -> SyncRecord {
        SyncRecord::BroadcastHistory(BroadcastRecord {
            id: id.to_string(),
            device_id: device_id.to_string(),
            message: "hello all".to_string(),
            recipients: vec![
                Recipient {
                    phone: "+15550001".into(),
                    name: Some("Ana".into()),
                },
                Recipient {
                    phone: "+15550002".into(),
                    name: None,
                },
            ],
            sent_count: 0,
            failed_count: 0,
            status: BroadcastStatus::Pending,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        })
    }

    fn sample_schedule(id: &str, device_id: &str) -> SyncRecord {
        SyncRecord::ScheduledMessages(ScheduledMessage {
            id: id.to_string(),
            device_id: device_id.to_string(),
            contact_id: None,
            broadcast_id: None,
            message: "see you tomorrow".to_string(),
            media_url: None,
            media_type: None,
            scheduled_time: "2026-09-01T09:00:00.000Z".to_string(),
            status: ScheduleStatus::Pending,
            error_message: None,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
            sent_at: None,
        })
    }

    #[tokio::test]
    async fn insert_then_fetch_round_trips_both_tables() {
        let (db, _dir) = setup_db().await;
        let broadcast = sample_broadcast("b-1", "device-a");
        let schedule = sample_schedule("s-1", "device-a");

        insert_record(&db, &broadcast).await.unwrap();
        insert_record(&db, &schedule).await.unwrap();

        let records = fetch_all(&db, "device-a").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], broadcast);
        assert_eq!(records[1], schedule);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn fetch_all_is_scoped_to_the_device() {
        let (db, _dir) = setup_db().await;
        insert_record(&db, &sample_broadcast("b-1", "device-a")).await.unwrap();
        insert_record(&db, &sample_broadcast("b-2", "device-b")).await.unwrap();
        insert_record(&db, &sample_schedule("s-1", "device-b")).await.unwrap();

        let mine = fetch_all(&db, "device-a").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id(), "b-1");

        let theirs = fetch_all(&db, "device-b").await.unwrap();
        assert_eq!(theirs.len(), 2);

        assert!(fetch_all(&db, "device-c").await.unwrap().is_empty());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_record_finds_by_id_alone() {
        let (db, _dir) = setup_db().await;
        insert_record(&db, &sample_schedule("s-1", "device-a")).await.unwrap();

        let found = get_record(&db, SyncTable::ScheduledMessages, "s-1").await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().device_id(), "device-a");

        assert!(
            get_record(&db, SyncTable::BroadcastHistory, "s-1")
                .await
                .unwrap()
                .is_none()
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_constraint_error() {
        let (db, _dir) = setup_db().await;
        let record = sample_broadcast("b-1", "device-a");
        insert_record(&db, &record).await.unwrap();

        let result = insert_record(&db, &record).await;
        assert!(result.is_err(), "duplicate id should be rejected");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_replaces_payload() {
        let (db, _dir) = setup_db().await;
        insert_record(&db, &sample_broadcast("b-1", "device-a")).await.unwrap();

        let updated = match sample_broadcast("b-1", "device-a") {
            SyncRecord::BroadcastHistory(mut b) => {
                b.message = "edited".to_string();
                b.sent_count = 2;
                b.status = BroadcastStatus::Completed;
                SyncRecord::BroadcastHistory(b)
            }
            other => other,
        };
        assert!(update_record(&db, &updated).await.unwrap());

        let fetched = get_record(&db, SyncTable::BroadcastHistory, "b-1")
            .await
            .unwrap()
            .unwrap();
        match fetched {
            SyncRecord::BroadcastHistory(b) => {
                assert_eq!(b.message, "edited");
                assert_eq!(b.sent_count, 2);
                assert_eq!(b.status, BroadcastStatus::Completed);
            }
            _ => panic!("wrong table"),
        }

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_missing_or_foreign_row_is_noop() {
        let (db, _dir) = setup_db().await;
        assert!(!update_record(&db, &sample_broadcast("ghost", "device-a")).await.unwrap());

        insert_record(&db, &sample_broadcast("b-1", "device-a")).await.unwrap();
        // Same id, different device: the write must not land.
        assert!(!update_record(&db, &sample_broadcast("b-1", "device-b")).await.unwrap());

        let fetched = get_record(&db, SyncTable::BroadcastHistory, "b-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.device_id(), "device-a");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let (db, _dir) = setup_db().await;
        insert_record(&db, &sample_schedule("s-1", "device-a")).await.unwrap();

        assert!(delete_record(&db, SyncTable::ScheduledMessages, "s-1", "device-a").await.unwrap());
        assert!(!delete_record(&db, SyncTable::ScheduledMessages, "s-1", "device-a").await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_respects_device_scope() {
        let (db, _dir) = setup_db().await;
        insert_record(&db, &sample_schedule("s-1", "device-a")).await.unwrap();

        assert!(!delete_record(&db, SyncTable::ScheduledMessages, "s-1", "device-b").await.unwrap());
        assert!(
            get_record(&db, SyncTable::ScheduledMessages, "s-1")
                .await
                .unwrap()
                .is_some()
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn writes_publish_on_the_change_feed() {
        let (db, _dir) = setup_db().await;
        let mut rx = db.feed().subscribe();

        let record = sample_broadcast("b-1", "device-a");
        insert_record(&db, &record).await.unwrap();
        update_record(&db, &record).await.unwrap();
        delete_record(&db, SyncTable::BroadcastHistory, "b-1", "device-a").await.unwrap();

        match rx.recv().await.unwrap() {
            ChangeEvent::Inserted(r) => assert_eq!(r.id(), "b-1"),
            other => panic!("expected insert event, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            ChangeEvent::Updated(r) => assert_eq!(r.id(), "b-1"),
            other => panic!("expected update event, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            ChangeEvent::Deleted { table, id, device_id } => {
                assert_eq!(table, SyncTable::BroadcastHistory);
                assert_eq!(id, "b-1");
                assert_eq!(device_id, "device-a");
            }
            other => panic!("expected delete event, got {other:?}"),
        }

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn noop_writes_do_not_publish() {
        let (db, _dir) = setup_db().await;
        let mut rx = db.feed().subscribe();

        assert!(!update_record(&db, &sample_broadcast("ghost", "device-a")).await.unwrap());
        assert!(!delete_record(&db, SyncTable::BroadcastHistory, "ghost", "device-a").await.unwrap());

        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));

        db.close().await.unwrap();
    }
}
