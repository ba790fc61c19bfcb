// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async SQLite handle shared by every query module.
//!
//! All statements run on the dedicated connection thread owned by
//! [`tokio_rusqlite::Connection`]; callers stay on the tokio runtime.
//! Migrations run on a short-lived synchronous connection before the async
//! handle is opened, so a partially migrated database is never observable.

use std::path::Path;

use tracing::debug;

use berth_core::BerthError;

use crate::feed::ChangeFeed;
use crate::migrations::run_migrations;

/// Open database handle plus the change feed fed by record writes.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    feed: ChangeFeed,
}

impl Database {
    /// Open (creating if needed) the database at `path` and bring the schema
    /// up to date. Parent directories are created as required.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, BerthError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| BerthError::Storage {
                source: Box::new(e),
            })?;
        }

        {
            let mut bootstrap =
                rusqlite::Connection::open(path).map_err(|e| BerthError::Storage {
                    source: Box::new(e),
                })?;
            if wal_mode {
                bootstrap
                    .pragma_update(None, "journal_mode", "WAL")
                    .map_err(|e| BerthError::Storage {
                        source: Box::new(e),
                    })?;
            }
            run_migrations(&mut bootstrap)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| BerthError::Storage {
                source: Box::new(e),
            })?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, wal_mode, "database open, schema current");

        Ok(Self {
            conn,
            feed: ChangeFeed::new(),
        })
    }

    /// Raw connection handle for the query modules.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Feed of committed changes on synced tables.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Checkpoint the WAL and release this handle.
    ///
    /// Other clones of the handle stay usable; the connection thread exits
    /// once the last clone drops.
    pub async fn close(self) -> Result<(), BerthError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Lift a connection-thread error into the workspace error type.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> BerthError {
    BerthError::Storage {
        source: Box::new(e),
    }
}
