// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded schema migrations.
//!
//! The SQL files under `migrations/` are compiled into the binary with
//! `embed_migrations!` and applied when the database opens.

use tracing::debug;

use berth_core::BerthError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Apply any pending migrations on the given connection.
///
/// Refinery records what already ran in its `refinery_schema_history`
/// table, so reopening an up-to-date database applies nothing.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), BerthError> {
    match embedded::migrations::runner().run(conn) {
        Ok(report) => {
            debug!(
                applied = report.applied_migrations().len(),
                "schema migrations complete"
            );
            Ok(())
        }
        Err(e) => Err(BerthError::Storage {
            source: Box::new(e),
        }),
    }
}
