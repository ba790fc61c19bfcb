// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-local persisted state.
//!
//! One JSON file per installation holding the device id, the current session
//! token, and the offline mutation queue. The file is private to a single
//! client process; writes go through a temp file + rename so a crash never
//! leaves a half-written state file.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use berth_core::{BerthError, QueuedOperation};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::identity;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    session_token: Option<String>,
    #[serde(default)]
    offline_queue: Vec<QueuedOperation>,
}

/// Durable client-local state store.
pub struct StateStore {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl StateStore {
    /// Open (or create) the state file at `path`.
    ///
    /// A missing file starts empty. An unreadable file is an error; a
    /// readable-but-corrupt file starts empty with a warning so a damaged
    /// install can still boot and re-pair.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BerthError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| state_err("create state dir", e))?;
        }

        let state = if path.exists() {
            let raw =
                std::fs::read_to_string(&path).map_err(|e| state_err("read state file", e))?;
            match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "state file corrupt, starting fresh");
                    StateFile::default()
                }
            }
        } else {
            StateFile::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// The stable device id for this installation.
    ///
    /// Reads the persisted value; if absent or failing validation, mints a
    /// new one and persists it. Repeated calls return the same value.
    pub async fn device_id(&self) -> Result<String, BerthError> {
        let mut state = self.state.lock().await;

        if let Some(id) = &state.device_id
            && identity::is_valid(id)
        {
            return Ok(id.clone());
        }

        if state.device_id.is_some() {
            warn!("persisted device id failed validation, regenerating");
        }

        let id = identity::generate();
        state.device_id = Some(id.clone());
        self.persist(&state)?;
        Ok(id)
    }

    /// The locally persisted session token, if any.
    pub async fn session_token(&self) -> Option<String> {
        self.state.lock().await.session_token.clone()
    }

    pub async fn set_session_token(&self, token: &str) -> Result<(), BerthError> {
        let mut state = self.state.lock().await;
        state.session_token = Some(token.to_string());
        self.persist(&state)
    }

    pub async fn clear_session_token(&self) -> Result<(), BerthError> {
        let mut state = self.state.lock().await;
        state.session_token = None;
        self.persist(&state)
    }

    /// Snapshot of the persisted offline queue.
    pub async fn offline_queue(&self) -> Vec<QueuedOperation> {
        self.state.lock().await.offline_queue.clone()
    }

    /// Replace and persist the offline queue.
    pub async fn save_offline_queue(&self, queue: &[QueuedOperation]) -> Result<(), BerthError> {
        let mut state = self.state.lock().await;
        state.offline_queue = queue.to_vec();
        self.persist(&state)
    }

    /// Write the full state file atomically: temp file, fsync, rename.
    fn persist(&self, state: &StateFile) -> Result<(), BerthError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| state_err("serialize state file", e))?;

        let tmp = self.path.with_extension("json.tmp");
        let mut file =
            std::fs::File::create(&tmp).map_err(|e| state_err("create temp state file", e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| state_err("write temp state file", e))?;
        file.sync_all()
            .map_err(|e| state_err("sync temp state file", e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| state_err("replace state file", e))
    }
}

fn state_err(
    message: &str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> BerthError {
    BerthError::LocalState {
        message: message.to_string(),
        source: Some(Box::new(source)),
    }
}
