// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offline mutation queue and change reconciliation for Berth.
//!
//! Mutations made while disconnected queue up in the local state file; the
//! [`SyncCoordinator`] replays them last-write-wins against the shared store
//! once connectivity returns, and folds observed changes into a
//! device-scoped replica.

pub mod coordinator;
pub mod queue;

pub use coordinator::{SyncCoordinator, spawn_apply_task, spawn_reconnect_watcher};
pub use queue::{ConflictWinner, DrainReport, OfflineQueue, resolve_conflict};
