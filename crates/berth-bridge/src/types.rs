// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the worker HTTP API.

use serde::{Deserialize, Serialize};

/// Response envelope every worker endpoint returns.
///
/// `code` is `"SUCCESS"` on the happy path; anything else is an error even
/// under a 2xx status.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub code: String,
    #[serde(default)]
    pub message: String,
    pub results: Option<T>,
}

/// Pairing payload returned by `/app/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInfo {
    pub qr_link: String,
    #[serde(default)]
    pub qr_duration: Option<i64>,
}

/// One paired device as reported by `/app/devices`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub device: String,
}

/// Request body for `/send/message`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub phone: String,
    pub message: String,
}

/// Delivery acknowledgement from `/send/message`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}
