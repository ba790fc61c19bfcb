// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed HTTP client for the worker instances Berth allocates.
//!
//! Every request carries the allocated pool port in a routing header; the
//! front-door router uses it to reach the right worker process.

pub mod client;
pub mod types;

pub use client::{BridgeClient, INSTANCE_PORT_HEADER};
pub use types::{DeviceInfo, Envelope, LoginInfo, OutboundMessage, SendReceipt};
