// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle state machine.
//!
//! `pending → connected → {disconnected, dormant}`. Both right-hand states
//! are terminal here: resuming always means a new session row, there is no
//! dormant→connected edge. One device holds at most one session; creating a
//! new one retires whatever came before it.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use berth_core::BerthError;
use berth_core::token;
use berth_core::types::{Session, SessionStatus, now_timestamp, parse_timestamp};
use berth_device::{StateStore, identity};
use berth_storage::{Database, queries};

use crate::pool::PoolAllocator;

/// Creates, restores, and retires sessions, keeping the pool and the local
/// state file in step with the session table.
pub struct SessionLifecycle {
    db: Database,
    pool: PoolAllocator,
    state: Arc<StateStore>,
}

impl SessionLifecycle {
    pub fn new(db: Database, pool: PoolAllocator, state: Arc<StateStore>) -> Self {
        Self { db, pool, state }
    }

    /// This device's session, if it has one. New devices have none; that is
    /// not an error.
    pub async fn current_session(&self) -> Result<Option<Session>, BerthError> {
        let device_id = self.state.device_id().await?;
        queries::sessions::latest_session_for_device(&self.db, &device_id).await
    }

    /// Create a fresh session for a device: retire any prior session, claim
    /// a slot, mint a token, insert the row, bind the slot, persist the
    /// token locally.
    ///
    /// Fails with [`BerthError::PoolExhausted`] when no slot is free. Any
    /// failure after the claim releases the slot again before surfacing.
    pub async fn create_session(&self, device_id: &str) -> Result<Session, BerthError> {
        if !identity::is_valid(device_id) {
            return Err(BerthError::LocalState {
                message: format!("invalid device id: {device_id}"),
                source: None,
            });
        }

        self.retire_previous_sessions(device_id).await;

        let Some(port) = self.pool.allocate().await? else {
            return Err(BerthError::PoolExhausted);
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        let session_token = token::encode(&session_id, device_id);
        let now = now_timestamp();
        let session = Session {
            id: session_id.clone(),
            device_id: device_id.to_string(),
            whatsapp_number: None,
            api_instance_port: port,
            status: SessionStatus::Pending,
            session_token: Some(session_token.clone()),
            token_expires_at: Some(token::expiry_timestamp()),
            created_at: now.clone(),
            last_active_at: now.clone(),
            updated_at: now,
        };

        if let Err(e) = queries::sessions::insert_session(&self.db, &session).await {
            self.unwind_create(port, &session_id).await;
            return Err(e);
        }
        if let Err(e) = self.pool.mark_in_use(port, &session_id).await {
            self.unwind_create(port, &session_id).await;
            return Err(e);
        }
        if let Err(e) = self.state.set_session_token(&session_token).await {
            self.unwind_create(port, &session_id).await;
            return Err(e);
        }

        info!(session_id = %session.id, device_id, port, "session created");
        Ok(session)
    }

    /// Restore a session by id, refreshing its token when expired.
    ///
    /// `Ok(None)` when no such row exists. A failed token refresh is logged
    /// and the session restores with its stale token; the next restore
    /// retries.
    pub async fn restore_session(&self, session_id: &str) -> Result<Option<Session>, BerthError> {
        let Some(session) = queries::sessions::get_session(&self.db, session_id).await? else {
            debug!(session_id, "restore found no session");
            return Ok(None);
        };

        if is_token_expired(&session) {
            if let Err(e) = self.refresh_session_token(session_id).await {
                warn!(session_id, error = %e, "token refresh during restore failed");
            }
        } else if let Some(stored) = &session.session_token {
            self.state.set_session_token(stored).await?;
        }

        queries::sessions::touch_last_active(&self.db, session_id).await?;
        let restored = queries::sessions::get_session(&self.db, session_id).await?;
        info!(session_id, "session restored");
        Ok(restored)
    }

    /// Retire a session: terminal `disconnected` status, token columns
    /// wiped, slot released, and the locally stored token dropped when it
    /// referred to this session. The row itself stays behind as history.
    pub async fn terminate_session(&self, session_id: &str) -> Result<bool, BerthError> {
        let Some(session) = queries::sessions::get_session(&self.db, session_id).await? else {
            return Ok(false);
        };

        queries::sessions::terminate_session(&self.db, session_id).await?;
        self.pool.release(session.api_instance_port).await?;

        if let Some(stored) = self.state.session_token().await
            && let Some(payload) = token::decode(&stored)
            && payload.session_id == session_id
        {
            self.state.clear_session_token().await?;
        }

        info!(session_id, port = session.api_instance_port, "session terminated");
        Ok(true)
    }

    /// Mint a brand-new token for the session and persist it on the row and
    /// in the local state file. Counts as activity.
    pub async fn refresh_session_token(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, BerthError> {
        let Some(session) = queries::sessions::get_session(&self.db, session_id).await? else {
            return Ok(None);
        };

        let session_token = token::encode(session_id, &session.device_id);
        let expires_at = token::expiry_timestamp();
        queries::sessions::refresh_token(&self.db, session_id, &session_token, &expires_at)
            .await?;
        self.state.set_session_token(&session_token).await?;

        debug!(session_id, "session token refreshed");
        Ok(Some(session_token))
    }

    /// Record that the worker finished pairing and reported its number.
    pub async fn mark_connected(
        &self,
        session_id: &str,
        whatsapp_number: &str,
    ) -> Result<bool, BerthError> {
        let changed =
            queries::sessions::mark_connected(&self.db, session_id, whatsapp_number).await?;
        if changed {
            info!(session_id, "session connected");
        }
        Ok(changed)
    }

    /// Auto-cleanup before create: release slots still bound to the
    /// device's live sessions, then drop its rows. Failures here are logged
    /// and ignored; having no prior session is the common case.
    async fn retire_previous_sessions(&self, device_id: &str) {
        let previous = match queries::sessions::list_sessions_for_device(&self.db, device_id).await
        {
            Ok(previous) => previous,
            Err(e) => {
                warn!(device_id, error = %e, "could not inspect previous sessions");
                return;
            }
        };
        if previous.is_empty() {
            return;
        }

        for session in &previous {
            if matches!(
                session.status,
                SessionStatus::Pending | SessionStatus::Connected
            ) && let Err(e) = self.pool.release(session.api_instance_port).await
            {
                warn!(
                    port = session.api_instance_port,
                    error = %e,
                    "could not release slot of replaced session"
                );
            }
        }
        match queries::sessions::delete_sessions_for_device(&self.db, device_id).await {
            Ok(removed) => debug!(device_id, removed, "cleared previous sessions"),
            Err(e) => warn!(device_id, error = %e, "could not clear previous sessions"),
        }
    }

    /// Best-effort compensation so a failed create never leaks its slot.
    async fn unwind_create(&self, port: u16, session_id: &str) {
        if let Err(e) = self.pool.release(port).await {
            warn!(port, error = %e, "failed to release slot during create unwind");
        }
        match queries::sessions::get_session(&self.db, session_id).await {
            Ok(Some(_)) => {
                if let Err(e) = queries::sessions::terminate_session(&self.db, session_id).await {
                    warn!(session_id, error = %e, "failed to retire session during create unwind");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(session_id, error = %e, "failed to inspect session during create unwind");
            }
        }
    }
}

/// True when the row's recorded token expiry is missing, unparseable, or in
/// the past.
pub fn is_token_expired(session: &Session) -> bool {
    match &session.token_expires_at {
        Some(raw) => match parse_timestamp(raw) {
            Some(expiry) => Utc::now() >= expiry,
            None => true,
        },
        None => true,
    }
}
