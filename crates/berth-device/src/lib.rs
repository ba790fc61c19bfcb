// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device identity and client-local persisted state.
//!
//! Everything here is private to one client process: the stable device id,
//! the locally cached session token, and the durable offline mutation queue.
//! The shared store never sees this file.

pub mod identity;
pub mod store;

pub use store::StateStore;
