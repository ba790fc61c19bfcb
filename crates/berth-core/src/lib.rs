// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Berth session broker.
//!
//! This crate provides the error type, the domain model shared across the
//! workspace (sessions, pool instances, queued operations, sync records),
//! and the session token codec.

pub mod error;
pub mod token;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::BerthError;
pub use types::{
    BroadcastRecord, ChangeEvent, InstanceStatus, OperationKind, PoolInstance, PoolSummary,
    QueuedOperation, Recipient, ScheduledMessage, Session, SessionCounts, SessionStatus,
    SyncRecord, SyncTable,
};
