// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `berth serve` command implementation.
//!
//! Starts the broker daemon: opens the session store, registers the worker
//! pool, and runs the background workers (cleanup loop, change feed apply
//! task, connectivity probe, reconnect replay) until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use berth_bridge::BridgeClient;
use berth_broker::{PoolAllocator, SessionLifecycle, install_signal_handler, spawn_cleanup_task};
use berth_config::BerthConfig;
use berth_core::BerthError;
use berth_device::StateStore;
use berth_storage::Database;
use berth_sync::{OfflineQueue, SyncCoordinator, spawn_apply_task, spawn_reconnect_watcher};

/// Poll cadence for the bridge reachability probe.
const CONNECTIVITY_PROBE_SECS: u64 = 30;

/// Runs the `berth serve` command.
///
/// The first cleanup pass runs immediately on startup, so sessions that went
/// dormant while the broker was down and slots leaked by a crash are
/// reclaimed before anything else happens.
pub async fn run_serve(config: BerthConfig) -> Result<(), BerthError> {
    init_tracing(&config.broker.log_level);

    info!("starting berth serve");

    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    info!(
        path = config.storage.database_path.as_str(),
        "session store opened"
    );

    let state = Arc::new(StateStore::open(&config.storage.state_path)?);
    let device_id = state.device_id().await?;
    info!(%device_id, "device identity ready");

    let pool = PoolAllocator::new(db.clone());
    pool.provision(&config.pool.instances).await?;

    let lifecycle = SessionLifecycle::new(db.clone(), pool, state.clone());

    let queue = OfflineQueue::new(state.clone(), config.sync.max_queue_len);
    let coordinator = Arc::new(SyncCoordinator::new(db.clone(), queue, &device_id));

    let bridge = BridgeClient::new(&config.bridge)?;
    info!(
        base_url = config.bridge.base_url.as_str(),
        "bridge client ready"
    );

    let cancel = install_signal_handler();

    let cleanup = spawn_cleanup_task(
        db.clone(),
        config.pool.cleanup_interval_secs,
        cancel.clone(),
    );
    let apply = spawn_apply_task(coordinator.clone(), cancel.clone());

    let (connectivity_tx, connectivity_rx) = watch::channel(false);
    let reconnect = spawn_reconnect_watcher(coordinator, connectivity_rx, cancel.clone());
    let probe = spawn_connectivity_probe(bridge, lifecycle, connectivity_tx, cancel.clone());

    info!("berth serve running");
    cancel.cancelled().await;

    // Wait for the workers so nothing touches the store mid-teardown.
    for (name, handle) in [
        ("cleanup", cleanup),
        ("apply", apply),
        ("reconnect", reconnect),
        ("probe", probe),
    ] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "worker task failed during shutdown");
        }
    }

    db.close().await?;
    info!("berth serve shutdown complete");
    Ok(())
}

/// Poll the bridge and publish reachability onto the watch channel.
///
/// Any probe failure reads as offline. The reconnect watcher replays the
/// offline queue on the next offline-to-online edge, so a false negative
/// costs one extra replay at most.
fn spawn_connectivity_probe(
    bridge: BridgeClient,
    lifecycle: SessionLifecycle,
    connectivity: watch::Sender<bool>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(CONNECTIVITY_PROBE_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let online = probe_once(&bridge, &lifecycle).await;
                    if online != *connectivity.borrow() {
                        info!(online, "bridge connectivity changed");
                    }
                    connectivity.send_replace(online);
                }
                _ = cancel.cancelled() => {
                    debug!("connectivity probe stopped");
                    break;
                }
            }
        }
    })
}

/// One reachability check. Online means this device has a session whose
/// worker reports at least one linked device.
async fn probe_once(bridge: &BridgeClient, lifecycle: &SessionLifecycle) -> bool {
    let session = match lifecycle.current_session().await {
        Ok(Some(session)) => session,
        Ok(None) => return false,
        Err(e) => {
            warn!(error = %e, "connectivity probe could not read the current session");
            return false;
        }
    };
    match bridge.is_connected(session.api_instance_port).await {
        Ok(online) => online,
        Err(e) => {
            debug!(
                port = session.api_instance_port,
                error = %e,
                "connectivity probe failed"
            );
            false
        }
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("BERTH_LOG").unwrap_or_else(|_| {
        EnvFilter::new(format!("{log_level},hyper=warn,reqwest=warn,rustls=warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
