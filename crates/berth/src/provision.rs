// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `berth pool init` command implementation.

use berth_broker::PoolAllocator;
use berth_config::BerthConfig;
use berth_core::BerthError;
use berth_storage::Database;

/// Run the `berth pool init` command.
///
/// Registers the configured worker slots and prints the resulting counts.
/// Rerunning refreshes container names but never touches slot status or
/// session bindings, so it is safe against a live pool.
pub async fn run_pool_init(config: &BerthConfig) -> Result<(), BerthError> {
    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    let pool = PoolAllocator::new(db.clone());
    pool.provision(&config.pool.instances).await?;
    let summary = pool.status_summary().await?;
    db.close().await?;

    println!(
        "pool initialized: {} slots ({} available, {} in use)",
        summary.total, summary.available, summary.in_use
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_config::InstanceSpec;

    fn temp_config(dir: &tempfile::TempDir) -> BerthConfig {
        let mut config = BerthConfig::default();
        config.storage.database_path = dir
            .path()
            .join("berth.db")
            .to_string_lossy()
            .into_owned();
        config.storage.state_path = dir
            .path()
            .join("state.json")
            .to_string_lossy()
            .into_owned();
        config.pool.instances = vec![
            InstanceSpec {
                port: 4001,
                container_name: "wa-bridge-1".to_string(),
            },
            InstanceSpec {
                port: 4002,
                container_name: "wa-bridge-2".to_string(),
            },
        ];
        config
    }

    #[tokio::test]
    async fn pool_init_registers_configured_slots() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);

        run_pool_init(&config).await.unwrap();

        let db = Database::open(&config.storage.database_path, true)
            .await
            .unwrap();
        let summary = PoolAllocator::new(db.clone()).status_summary().await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.available, 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pool_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);

        run_pool_init(&config).await.unwrap();
        run_pool_init(&config).await.unwrap();

        let db = Database::open(&config.storage.database_path, true)
            .await
            .unwrap();
        let summary = PoolAllocator::new(db.clone()).status_summary().await.unwrap();
        assert_eq!(summary.total, 2);
        db.close().await.unwrap();
    }
}
