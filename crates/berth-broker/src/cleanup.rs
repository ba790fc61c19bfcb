// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic reclamation of idle sessions and leaked slots.
//!
//! Two passes per run. The dormancy pass retires connected sessions whose
//! last activity is over the threshold, freeing their slots. The orphan
//! sweep returns `in_use` slots whose owning session no longer lives, which
//! covers crashes between claim and bind as well as rows removed by
//! re-authentication.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use berth_core::BerthError;
use berth_core::types::{SessionStatus, parse_timestamp};
use berth_storage::{Database, queries};

use crate::pool::is_dormant;

/// How long a claimed-but-unbound slot is left alone, so an in-flight
/// create is not swept out from under its caller.
const ORPHAN_GRACE_SECS: i64 = 60;

/// What one cleanup pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub marked_dormant: usize,
    pub slots_released: usize,
    pub orphans_released: usize,
}

/// Run one cleanup pass. Idempotent: a second pass right after the first
/// finds nothing left to do.
pub async fn run_cleanup(db: &Database) -> Result<CleanupReport, BerthError> {
    let now = chrono::Utc::now();
    let mut report = CleanupReport::default();

    for session in
        queries::sessions::list_sessions_by_status(db, SessionStatus::Connected).await?
    {
        if !is_dormant(&session.last_active_at, now) {
            continue;
        }
        queries::sessions::set_session_status(db, &session.id, SessionStatus::Dormant).await?;
        report.marked_dormant += 1;
        if queries::pool::release_instance(db, session.api_instance_port).await? {
            report.slots_released += 1;
        }
        info!(
            session_id = %session.id,
            port = session.api_instance_port,
            last_active_at = %session.last_active_at,
            "dormant session reclaimed"
        );
    }

    for instance in queries::pool::instances_in_use(db).await? {
        let live = match &instance.session_id {
            Some(session_id) => {
                match queries::sessions::get_session(db, session_id).await? {
                    Some(session) => matches!(
                        session.status,
                        SessionStatus::Pending | SessionStatus::Connected
                    ),
                    None => false,
                }
            }
            // Claimed but not yet bound: an in-flight create looks exactly
            // like this, so only reclaim once the grace window has passed.
            None => match parse_timestamp(&instance.updated_at) {
                Some(updated) => now - updated < chrono::Duration::seconds(ORPHAN_GRACE_SECS),
                None => false,
            },
        };
        if !live {
            queries::pool::release_instance(db, instance.port).await?;
            report.orphans_released += 1;
            warn!(port = instance.port, "released orphaned slot");
        }
    }

    Ok(report)
}

/// Spawn the cleanup loop: one pass immediately, then one per interval
/// until the token cancels.
pub fn spawn_cleanup_task(
    db: Database,
    interval_secs: u64,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_once(&db).await;

        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // Consume the immediate tick; the startup pass just ran.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => run_once(&db).await,
                _ = cancel.cancelled() => {
                    debug!("cleanup task stopped");
                    break;
                }
            }
        }
    })
}

async fn run_once(db: &Database) {
    match run_cleanup(db).await {
        Ok(report) if report.marked_dormant + report.orphans_released > 0 => {
            info!(
                dormant = report.marked_dormant,
                released = report.slots_released,
                orphans = report.orphans_released,
                "cleanup pass complete"
            );
        }
        Ok(_) => debug!("cleanup pass complete, nothing to reclaim"),
        Err(e) => warn!(error = %e, "cleanup pass failed"),
    }
}
