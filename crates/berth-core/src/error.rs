// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Berth session broker.

use thiserror::Error;

/// The primary error type used across all Berth crates.
///
/// Expected-empty lookups are `Ok(None)`, never an error. Conflict losses
/// during queue replay are logged and dropped, never surfaced here.
#[derive(Debug, Error)]
pub enum BerthError {
    /// Configuration errors (invalid TOML, bad values, unknown keys).
    #[error("configuration error: {0}")]
    Config(String),

    /// Shared-store errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Zero pool instances could be claimed. Recoverable: retry later.
    #[error("no worker instance available in the pool")]
    PoolExhausted,

    /// The offline queue refused an enqueue at its configured cap.
    #[error("offline queue is full ({limit} entries)")]
    QueueFull { limit: usize },

    /// Client-local state file errors (unreadable, unwritable, corrupt).
    #[error("local state error: {message}")]
    LocalState {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Worker bridge errors (transport failure, non-success envelope).
    #[error("bridge error: {message}")]
    Bridge {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Catch-all for failures with no dedicated variant.
    #[error("internal error: {0}")]
    Internal(String),
}
