// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker pool allocation and session lifecycle for the Berth broker.
//!
//! The [`PoolAllocator`] hands out fixed worker slots without locks, the
//! [`SessionLifecycle`] drives the session state machine on top of it, and
//! the cleanup loop reclaims idle sessions and leaked slots on a timer.

pub mod cleanup;
pub mod lifecycle;
pub mod pool;
pub mod shutdown;

pub use cleanup::{CleanupReport, run_cleanup, spawn_cleanup_task};
pub use lifecycle::{SessionLifecycle, is_token_expired};
pub use pool::{DORMANCY_THRESHOLD_HOURS, PoolAllocator, is_dormant};
pub use shutdown::install_signal_handler;
