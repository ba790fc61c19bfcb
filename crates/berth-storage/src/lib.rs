// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Berth session broker.
//!
//! One database holds the worker pool, session rows, and the device-scoped
//! synced tables. Schema changes ship as embedded refinery migrations; all
//! access goes through the typed query modules under [`queries`].

pub mod database;
pub mod feed;
pub mod migrations;
pub mod queries;

pub use database::Database;
pub use feed::ChangeFeed;
