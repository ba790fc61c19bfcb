// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-size worker pool allocation.
//!
//! Every slot is one worker container listening on a well-known port. The
//! pool never grows at runtime; allocation hands out a free slot, release
//! returns it. Concurrent claims are settled by the conditional UPDATE in
//! the storage layer, not by locks.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use berth_config::model::InstanceSpec;
use berth_core::BerthError;
use berth_core::types::{PoolSummary, parse_timestamp};
use berth_storage::{Database, queries};

/// Inactivity span after which a connected session counts as dormant.
pub const DORMANCY_THRESHOLD_HOURS: i64 = 24;

/// Hands out and reclaims worker slots.
#[derive(Clone)]
pub struct PoolAllocator {
    db: Database,
}

impl PoolAllocator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register the configured slots, keyed by port.
    ///
    /// Safe to run on every startup: existing slots keep their status and
    /// session binding, only the container name is refreshed.
    pub async fn provision(&self, instances: &[InstanceSpec]) -> Result<(), BerthError> {
        for spec in instances {
            queries::pool::upsert_instance(&self.db, spec.port, &spec.container_name).await?;
        }
        info!(count = instances.len(), "pool slots provisioned");
        Ok(())
    }

    /// Claim an available slot, lowest port first.
    ///
    /// A lost race against a concurrent claim falls through to the next
    /// candidate. `Ok(None)` means the pool is exhausted; that is an
    /// expected outcome, not an error.
    pub async fn allocate(&self) -> Result<Option<u16>, BerthError> {
        let candidates = queries::pool::list_available(&self.db).await?;
        for candidate in &candidates {
            if queries::pool::claim_instance(&self.db, candidate.port).await? {
                debug!(port = candidate.port, "slot claimed");
                return Ok(Some(candidate.port));
            }
            debug!(port = candidate.port, "slot contested, trying next");
        }
        Ok(None)
    }

    /// Return a slot to the pool, clearing its session binding.
    ///
    /// Idempotent; only an unknown port reports `false`.
    pub async fn release(&self, port: u16) -> Result<bool, BerthError> {
        let released = queries::pool::release_instance(&self.db, port).await?;
        if released {
            debug!(port, "slot released");
        }
        Ok(released)
    }

    /// Bind the owning session to a freshly claimed slot.
    ///
    /// Separate from [`allocate`](Self::allocate) because the session row
    /// must exist first to have an id.
    pub async fn mark_in_use(&self, port: u16, session_id: &str) -> Result<bool, BerthError> {
        queries::pool::bind_session(&self.db, port, session_id).await
    }

    /// Aggregate counts, recomputed on every call.
    pub async fn status_summary(&self) -> Result<PoolSummary, BerthError> {
        queries::pool::status_counts(&self.db).await
    }
}

/// True iff the activity timestamp is strictly more than 24 hours before
/// `now`. Exactly 24 hours old is not dormant.
///
/// Unparseable input is not dormant either: a session is only reclaimed on
/// positive evidence of inactivity.
pub fn is_dormant(last_active_at: &str, now: DateTime<Utc>) -> bool {
    match parse_timestamp(last_active_at) {
        Some(last_active) => now - last_active > Duration::hours(DORMANCY_THRESHOLD_HOURS),
        None => false,
    }
}
