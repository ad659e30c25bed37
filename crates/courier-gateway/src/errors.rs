//! Gateway errors.

use thiserror::Error;

/// Errors raised while talking to the remote gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP transport failure (connect, timeout, TLS).
    #[error("gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status from the gateway.
    #[error("gateway returned status {status}: {detail}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        detail: String,
    },

    /// WebSocket handshake or stream failure.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The gateway response was missing an expected field.
    #[error("malformed gateway response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Convert into the pipeline connectivity error for one account.
    #[must_use]
    pub fn into_connectivity(self, account_id: &str) -> courier_core::errors::CourierError {
        courier_core::errors::CourierError::connectivity(account_id, self.to_string())
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
