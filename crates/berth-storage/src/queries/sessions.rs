// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session row operations.
//!
//! Rows are never deleted on terminate; terminal sessions stay behind as
//! history. Only re-authentication clears prior rows for a device.

use rusqlite::params;

use berth_core::BerthError;
use berth_core::types::{Session, SessionCounts, SessionStatus, now_timestamp};

use crate::database::Database;
use crate::queries::parse_text_column;

fn session_from_row(row: &rusqlite::Row<'_>) -> Result<Session, rusqlite::Error> {
    Ok(Session {
        id: row.get(0)?,
        device_id: row.get(1)?,
        whatsapp_number: row.get(2)?,
        api_instance_port: row.get(3)?,
        status: parse_text_column(4, &row.get::<_, String>(4)?)?,
        session_token: row.get(5)?,
        token_expires_at: row.get(6)?,
        created_at: row.get(7)?,
        last_active_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Insert a freshly created session row.
pub async fn insert_session(db: &Database, session: &Session) -> Result<(), BerthError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions
                     (id, device_id, whatsapp_number, api_instance_port, status,
                      session_token, token_expires_at, created_at, last_active_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    session.id,
                    session.device_id,
                    session.whatsapp_number,
                    session.api_instance_port,
                    session.status.to_string(),
                    session.session_token,
                    session.token_expires_at,
                    session.created_at,
                    session.last_active_at,
                    session.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a session by ID.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<Session>, BerthError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, device_id, whatsapp_number, api_instance_port, status,
                        session_token, token_expires_at, created_at, last_active_at, updated_at
                 FROM sessions WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], session_from_row);
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Most recently created session for a device, regardless of status.
pub async fn latest_session_for_device(
    db: &Database,
    device_id: &str,
) -> Result<Option<Session>, BerthError> {
    let device_id = device_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, device_id, whatsapp_number, api_instance_port, status,
                        session_token, token_expires_at, created_at, last_active_at, updated_at
                 FROM sessions WHERE device_id = ?1
                 ORDER BY created_at DESC LIMIT 1",
            )?;
            let result = stmt.query_row(params![device_id], session_from_row);
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Every session row for a device, newest first.
pub async fn list_sessions_for_device(
    db: &Database,
    device_id: &str,
) -> Result<Vec<Session>, BerthError> {
    let device_id = device_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, device_id, whatsapp_number, api_instance_port, status,
                        session_token, token_expires_at, created_at, last_active_at, updated_at
                 FROM sessions WHERE device_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(params![device_id], session_from_row)?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?);
            }
            Ok(sessions)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Remove every session row for a device. Returns how many went away.
///
/// Runs before a new session is created so one device never accumulates
/// parallel live rows.
pub async fn delete_sessions_for_device(
    db: &Database,
    device_id: &str,
) -> Result<usize, BerthError> {
    let device_id = device_id.to_string();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let deleted = conn.execute(
                "DELETE FROM sessions WHERE device_id = ?1",
                params![device_id],
            )?;
            Ok(deleted)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Flip a pending session to `connected` once pairing completes.
pub async fn mark_connected(
    db: &Database,
    id: &str,
    whatsapp_number: &str,
) -> Result<bool, BerthError> {
    let id = id.to_string();
    let whatsapp_number = whatsapp_number.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE sessions
                 SET status = 'connected', whatsapp_number = ?2,
                     last_active_at = ?3, updated_at = ?3
                 WHERE id = ?1",
                params![id, whatsapp_number, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Flip a session to `disconnected` and wipe its token columns.
pub async fn terminate_session(db: &Database, id: &str) -> Result<bool, BerthError> {
    let id = id.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE sessions
                 SET status = 'disconnected', session_token = NULL,
                     token_expires_at = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![id, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set a session's lifecycle status.
pub async fn set_session_status(
    db: &Database,
    id: &str,
    status: SessionStatus,
) -> Result<bool, BerthError> {
    let id = id.to_string();
    let status = status.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE sessions SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Store a re-issued token and its expiry, counting as activity.
pub async fn refresh_token(
    db: &Database,
    id: &str,
    token: &str,
    expires_at: &str,
) -> Result<bool, BerthError> {
    let id = id.to_string();
    let token = token.to_string();
    let expires_at = expires_at.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE sessions
                 SET session_token = ?2, token_expires_at = ?3,
                     last_active_at = ?4, updated_at = ?4
                 WHERE id = ?1",
                params![id, token, expires_at, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Bump `last_active_at`, deferring dormancy.
pub async fn touch_last_active(db: &Database, id: &str) -> Result<bool, BerthError> {
    let id = id.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE sessions SET last_active_at = ?2, updated_at = ?2 WHERE id = ?1",
                params![id, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Sessions currently in the given status, oldest activity first.
pub async fn list_sessions_by_status(
    db: &Database,
    status: SessionStatus,
) -> Result<Vec<Session>, BerthError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, device_id, whatsapp_number, api_instance_port, status,
                        session_token, token_expires_at, created_at, last_active_at, updated_at
                 FROM sessions WHERE status = ?1 ORDER BY last_active_at ASC",
            )?;
            let rows = stmt.query_map(params![status], session_from_row)?;
            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row?);
            }
            Ok(sessions)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Session counts grouped by status.
pub async fn status_counts(db: &Database) -> Result<SessionCounts, BerthError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT
                     COALESCE(SUM(status = 'pending'), 0),
                     COALESCE(SUM(status = 'connected'), 0),
                     COALESCE(SUM(status = 'disconnected'), 0),
                     COALESCE(SUM(status = 'dormant'), 0)
                 FROM sessions",
                [],
                |row| {
                    Ok(SessionCounts {
                        pending: row.get(0)?,
                        connected: row.get(1)?,
                        disconnected: row.get(2)?,
                        dormant: row.get(3)?,
                    })
                },
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}
