// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Berth session broker.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Berth configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BerthConfig {
    /// Broker identity and logging settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Shared store and client-local state settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Worker pool provisioning and reclamation settings.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Offline queue and sync settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Worker bridge HTTP settings.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Broker identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Display name of this broker deployment.
    #[serde(default = "default_broker_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: default_broker_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_broker_name() -> String {
    "berth".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Shared store and client-local state configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the shared SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Path to the client-local state file (device id, token, queue).
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            state_path: default_state_path(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("berth").join("berth.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("berth.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_state_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("berth").join("state.json"))
        .unwrap_or_else(|| std::path::PathBuf::from("state.json"))
        .to_string_lossy()
        .into_owned()
}

/// Worker pool provisioning and reclamation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Seconds between dormancy-reclamation passes.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// The fixed worker slots, seeded by `berth pool init`.
    #[serde(default = "default_instances")]
    pub instances: Vec<InstanceSpec>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval_secs(),
            instances: default_instances(),
        }
    }
}

/// One statically provisioned worker slot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceSpec {
    /// Network port the worker listens on. Unique across the pool.
    pub port: u16,

    /// Container name the worker runs under, for operator tooling.
    pub container_name: String,
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_instances() -> Vec<InstanceSpec> {
    (1..=5)
        .map(|i| InstanceSpec {
            port: 3000 + i,
            container_name: format!("wa-bridge-{i}"),
        })
        .collect()
}

/// Offline queue and sync configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Maximum queued offline mutations before enqueue is refused.
    #[serde(default = "default_max_queue_len")]
    pub max_queue_len: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_queue_len: default_max_queue_len(),
        }
    }
}

fn default_max_queue_len() -> usize {
    1024
}

/// Worker bridge HTTP configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Front-door base URL that routes to workers by port header.
    #[serde(default = "default_bridge_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bridge_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}
