// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model shared across the Berth workspace.
//!
//! Persisted timestamps are RFC 3339 text with millisecond precision (UTC),
//! produced by [`now_timestamp`]. Token-internal times are epoch milliseconds
//! and live in [`crate::token`].

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a session row.
///
/// `pending → connected → {disconnected, dormant}`; the two right-hand states
/// are terminal. Re-authentication always creates a fresh session row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Connected,
    Disconnected,
    Dormant,
}

/// Status of one fixed worker slot in the pool.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Available,
    InUse,
    Maintenance,
}

/// One authenticated binding between a device and a worker slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub device_id: String,
    /// Populated by the worker bridge after pairing succeeds; null until then.
    pub whatsapp_number: Option<String>,
    pub api_instance_port: u16,
    pub status: SessionStatus,
    pub session_token: Option<String>,
    pub token_expires_at: Option<String>,
    pub created_at: String,
    pub last_active_at: String,
    pub updated_at: String,
}

/// One fixed worker slot, identified by its network port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolInstance {
    pub id: String,
    pub port: u16,
    pub status: InstanceStatus,
    /// Owning session when `in_use`. Transiently null between the claim and
    /// the bind step; the cleanup orphan sweep reconciles crashes in between.
    pub session_id: Option<String>,
    pub container_name: String,
    pub last_health_check: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Aggregate pool counts, recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub total: i64,
    pub available: i64,
    pub in_use: i64,
    pub maintenance: i64,
}

/// Session counts grouped by status, recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounts {
    pub pending: i64,
    pub connected: i64,
    pub disconnected: i64,
    pub dormant: i64,
}

/// Kind of a queued or observed mutation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

/// Logical table a sync record belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncTable {
    BroadcastHistory,
    ScheduledMessages,
}

/// Delivery status of a broadcast run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Delivery status of a scheduled message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

/// One broadcast recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One broadcast run, scoped to the device that issued it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastRecord {
    pub id: String,
    pub device_id: String,
    pub message: String,
    pub recipients: Vec<Recipient>,
    pub sent_count: i64,
    pub failed_count: i64,
    pub status: BroadcastStatus,
    pub created_at: String,
    /// Last-write timestamp consulted by conflict resolution.
    pub updated_at: String,
}

/// One scheduled outbound message, scoped to the device that created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: String,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub scheduled_time: String,
    pub status: ScheduleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: String,
    /// Last-write timestamp consulted by conflict resolution.
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
}

/// A typed sync payload, tagged by its logical table.
///
/// Serializes as `{"table": "...", "data": {...}}` so queued operations keep
/// the wire shape other client stacks produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "data", rename_all = "snake_case")]
pub enum SyncRecord {
    BroadcastHistory(BroadcastRecord),
    ScheduledMessages(ScheduledMessage),
}

impl SyncRecord {
    pub fn table(&self) -> SyncTable {
        match self {
            SyncRecord::BroadcastHistory(_) => SyncTable::BroadcastHistory,
            SyncRecord::ScheduledMessages(_) => SyncTable::ScheduledMessages,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SyncRecord::BroadcastHistory(r) => &r.id,
            SyncRecord::ScheduledMessages(r) => &r.id,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            SyncRecord::BroadcastHistory(r) => &r.device_id,
            SyncRecord::ScheduledMessages(r) => &r.device_id,
        }
    }

    /// Last-write timestamp of the payload row.
    pub fn updated_at(&self) -> &str {
        match self {
            SyncRecord::BroadcastHistory(r) => &r.updated_at,
            SyncRecord::ScheduledMessages(r) => &r.updated_at,
        }
    }
}

/// A pending mutation awaiting replay against the shared store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(flatten)]
    pub record: SyncRecord,
    /// Client-side enqueue time, epoch milliseconds. Drain order key.
    pub timestamp: i64,
}

/// A change observed on a synced table, emitted on the storage feed.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Inserted(SyncRecord),
    Updated(SyncRecord),
    Deleted {
        table: SyncTable,
        id: String,
        device_id: String,
    },
}

impl ChangeEvent {
    pub fn table(&self) -> SyncTable {
        match self {
            ChangeEvent::Inserted(r) | ChangeEvent::Updated(r) => r.table(),
            ChangeEvent::Deleted { table, .. } => *table,
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            ChangeEvent::Inserted(r) | ChangeEvent::Updated(r) => r.device_id(),
            ChangeEvent::Deleted { device_id, .. } => device_id,
        }
    }
}

/// Current UTC time in the persisted-timestamp format.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parse a persisted timestamp. `None` for anything unparseable.
pub fn parse_timestamp(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}
