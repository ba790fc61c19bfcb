// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `berth status` command implementation.
//!
//! Reads the session store directly to display pool and session counts, the
//! device's current session, and the offline queue depth. Works whether or
//! not the daemon is running; WAL mode allows the concurrent read.

use std::sync::Arc;

use serde::Serialize;

use berth_broker::{PoolAllocator, SessionLifecycle};
use berth_config::BerthConfig;
use berth_core::BerthError;
use berth_core::types::{PoolSummary, Session, SessionCounts};
use berth_device::StateStore;
use berth_storage::{Database, queries};

/// Structured status output for `--json` mode.
///
/// Token columns never appear here; the status surface is for operators,
/// not for authentication.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub device_id: String,
    pub pool: PoolSummary,
    pub sessions: SessionCounts,
    pub session: Option<SessionInfo>,
    pub queued_operations: usize,
}

/// Trimmed session view for status output.
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub status: String,
    pub port: u16,
    pub whatsapp_number: Option<String>,
    pub last_active_at: String,
}

impl SessionInfo {
    fn from_session(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            status: session.status.to_string(),
            port: session.api_instance_port,
            whatsapp_number: session.whatsapp_number.clone(),
            last_active_at: session.last_active_at.clone(),
        }
    }
}

/// Run the `berth status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
pub async fn run_status(config: &BerthConfig, json: bool) -> Result<(), BerthError> {
    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    let state = Arc::new(StateStore::open(&config.storage.state_path)?);
    let device_id = state.device_id().await?;

    let pool = PoolAllocator::new(db.clone());
    let summary = pool.status_summary().await?;
    let counts = queries::sessions::status_counts(&db).await?;
    let lifecycle = SessionLifecycle::new(db.clone(), pool, state.clone());
    let session = lifecycle.current_session().await?;
    let queued = state.offline_queue().await.len();
    db.close().await?;

    if json {
        let response = StatusResponse {
            device_id,
            pool: summary,
            sessions: counts,
            session: session.as_ref().map(SessionInfo::from_session),
            queued_operations: queued,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print_status(&device_id, &summary, &counts, session.as_ref(), queued);
    }

    Ok(())
}

fn print_status(
    device_id: &str,
    summary: &PoolSummary,
    counts: &SessionCounts,
    session: Option<&Session>,
    queued: usize,
) {
    println!();
    println!("  berth status");
    println!("  {}", "-".repeat(35));
    println!("    Device:   {device_id}");
    println!("    Pool:     {}", format_pool_line(summary));
    println!("    Sessions: {}", format_counts_line(counts));
    println!("    Session:  {}", format_session_line(session));
    println!("    Queue:    {}", format_queue_line(queued));
    println!();
}

/// Format pool counts into a single summary line.
fn format_pool_line(summary: &PoolSummary) -> String {
    format!(
        "{} slots ({} available, {} in use, {} maintenance)",
        summary.total, summary.available, summary.in_use, summary.maintenance
    )
}

fn format_counts_line(counts: &SessionCounts) -> String {
    format!(
        "{} pending, {} connected, {} disconnected, {} dormant",
        counts.pending, counts.connected, counts.disconnected, counts.dormant
    )
}

fn format_session_line(session: Option<&Session>) -> String {
    match session {
        Some(session) => format!(
            "{} {} on port {} (last active {})",
            session.id, session.status, session.api_instance_port, session.last_active_at
        ),
        None => "none".to_string(),
    }
}

fn format_queue_line(queued: usize) -> String {
    match queued {
        0 => "empty".to_string(),
        1 => "1 operation pending".to_string(),
        n => format!("{n} operations pending"),
    }
}
