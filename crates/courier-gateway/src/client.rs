//! HTTP client for the remote gateway.
//!
//! Carries the outbound send primitive used identically by the dispatcher
//! and the schedule worker, plus the streaming URL builder the supervisors
//! connect to.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{GatewayError, Result};

/// Connection parameters for the remote gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the HTTP API, e.g. `http://localhost:3000`.
    pub base_url: String,
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// Streaming handshake timeout.
    pub connect_timeout: Duration,
    /// Outbound send timeout.
    pub send_timeout: Duration,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    recipient: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    message_id: Option<String>,
}

/// Client for the gateway's HTTP API.
pub struct GatewayClient {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Build a client from config.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.send_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        info!(base_url = %config.base_url, "gateway client initialized");
        Ok(Self { config, http })
    }

    /// Send a message through one account.
    ///
    /// Returns the external message id assigned by the gateway; delivery
    /// acks later arrive on the account's streaming connection carrying the
    /// same id.
    pub async fn send_message(
        &self,
        account_id: &str,
        recipient: &str,
        body: &str,
    ) -> Result<String> {
        let url = format!("{}/api/messages/send", self.config.base_url);
        debug!(account_id, recipient, url = %url, "sending message");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("X-Account-Id", account_id)
            .json(&SendRequest { recipient, body })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                detail: truncate(&detail, 200),
            });
        }

        let parsed: SendResponse = response.json().await?;
        parsed
            .message_id
            .ok_or_else(|| GatewayError::Malformed("send response missing message_id".into()))
    }

    /// Streaming URL for one account's connection.
    ///
    /// `http(s)` schemes map to `ws(s)`; the account id rides in the query
    /// string per the gateway's streaming contract.
    #[must_use]
    pub fn stream_url(&self, account_id: &str) -> String {
        let base = self
            .config
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/ws?account_id={}", base.trim_end_matches('/'), account_id)
    }

    /// Streaming handshake timeout from config.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.config.connect_timeout
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
