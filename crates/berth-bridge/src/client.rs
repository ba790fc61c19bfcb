// SPDX-FileCopyrightText: 2026 Berth Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the worker instances behind the front-door router.
//!
//! All workers sit behind one base URL; the assigned pool port travels as a
//! routing header on every request so the router can dispatch to the right
//! worker process. A session must never call a worker without a port it
//! allocated first.

use std::time::Duration;

use berth_config::BridgeConfig;
use berth_core::BerthError;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::{DeviceInfo, Envelope, LoginInfo, OutboundMessage, SendReceipt};

/// Routing header carrying the allocated instance port.
pub const INSTANCE_PORT_HEADER: &str = "X-Instance-Port";

/// Client for the worker HTTP API.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(config: &BridgeConfig) -> Result<Self, BerthError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BerthError::Bridge {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Fetch the pairing QR link for the worker on `port`.
    pub async fn login_qr(&self, port: u16) -> Result<String, BerthError> {
        let envelope: Envelope<LoginInfo> = self
            .call(port, self.client.get(self.url("/app/login")), "/app/login")
            .await?;
        envelope
            .results
            .map(|login| login.qr_link)
            .ok_or_else(|| BerthError::Bridge {
                message: "login response carried no QR link".to_string(),
                source: None,
            })
    }

    /// List the devices paired with the worker on `port`.
    pub async fn devices(&self, port: u16) -> Result<Vec<DeviceInfo>, BerthError> {
        let envelope: Envelope<Vec<DeviceInfo>> = self
            .call(port, self.client.get(self.url("/app/devices")), "/app/devices")
            .await?;
        Ok(envelope.results.unwrap_or_default())
    }

    /// Whether the worker on `port` holds a live pairing. This doubles as
    /// the connectivity probe: a worker with no paired device answers with
    /// an empty list, not an error.
    pub async fn is_connected(&self, port: u16) -> Result<bool, BerthError> {
        Ok(!self.devices(port).await?.is_empty())
    }

    /// Log the worker on `port` out of its pairing.
    pub async fn logout(&self, port: u16) -> Result<(), BerthError> {
        self.call::<serde_json::Value>(port, self.client.get(self.url("/app/logout")), "/app/logout")
            .await?;
        Ok(())
    }

    /// Ask the worker on `port` to re-establish its upstream connection.
    pub async fn reconnect(&self, port: u16) -> Result<(), BerthError> {
        self.call::<serde_json::Value>(
            port,
            self.client.get(self.url("/app/reconnect")),
            "/app/reconnect",
        )
        .await?;
        Ok(())
    }

    /// Send a text message through the worker on `port`.
    pub async fn send_message(
        &self,
        port: u16,
        phone: &str,
        message: &str,
    ) -> Result<SendReceipt, BerthError> {
        let body = OutboundMessage {
            phone: phone.to_string(),
            message: message.to_string(),
        };
        let envelope: Envelope<SendReceipt> = self
            .call(
                port,
                self.client.post(self.url("/send/message")).json(&body),
                "/send/message",
            )
            .await?;
        Ok(envelope.results.unwrap_or_default())
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Attach the routing header, send, and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        port: u16,
        builder: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<Envelope<T>, BerthError> {
        let response = builder
            .header(INSTANCE_PORT_HEADER, port)
            .send()
            .await
            .map_err(|e| BerthError::Bridge {
                message: format!("request to {endpoint} failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| BerthError::Bridge {
            message: format!("failed to read response from {endpoint}: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(endpoint, port, %status, "worker response received");

        if !status.is_success() {
            let message = match serde_json::from_str::<Envelope<serde_json::Value>>(&body) {
                Ok(env) => format!("{endpoint} returned {} ({status}): {}", env.code, env.message),
                Err(_) => format!("{endpoint} returned {status}: {body}"),
            };
            return Err(BerthError::Bridge {
                message,
                source: None,
            });
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| BerthError::Bridge {
                message: format!("unreadable response from {endpoint}: {e}"),
                source: Some(Box::new(e)),
            })?;

        if envelope.code != "SUCCESS" {
            return Err(BerthError::Bridge {
                message: format!("{endpoint} returned {}: {}", envelope.code, envelope.message),
                source: None,
            });
        }
        Ok(envelope)
    }
}
