//! Agent errors.

use thiserror::Error;

/// Errors raised while building or running a response strategy.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent's config payload did not decode for its kind.
    #[error("invalid agent config: {0}")]
    Config(String),

    /// A rule pattern failed to compile.
    #[error("invalid pattern {pattern:?}: {reason}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// The completion endpoint was unreachable or returned a transport error.
    #[error("completion transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The completion endpoint returned a non-success status.
    #[error("completion endpoint returned status {status}")]
    CompletionStatus {
        /// HTTP status code.
        status: u16,
    },

    /// The completion response was missing the expected content.
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

impl AgentError {
    /// Convert into the pipeline dispatch error for one event.
    #[must_use]
    pub fn into_dispatch(self, event_id: &str) -> courier_core::errors::CourierError {
        courier_core::errors::CourierError::dispatch(event_id, self.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
