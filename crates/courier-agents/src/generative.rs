//! Generative response strategy.
//!
//! Treats the completion endpoint as opaque: one POST per inbound message,
//! the returned content becomes the response body. Failures propagate to the
//! dispatcher, which logs and moves on — a generative outage never stalls
//! the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use courier_core::agent::GenerativeConfig;
use courier_core::event::InboundEvent;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AgentError;
use crate::ResponseStrategy;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<&'a str>,
    message: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: Option<String>,
}

/// Strategy backed by an external completion endpoint.
pub struct GenerativeStrategy {
    config: GenerativeConfig,
    http: reqwest::Client,
}

impl GenerativeStrategy {
    /// Build a strategy with its own HTTP client honoring the configured
    /// timeout.
    pub fn new(config: GenerativeConfig) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl ResponseStrategy for GenerativeStrategy {
    async fn respond(&self, event: &InboundEvent) -> Result<Option<String>, AgentError> {
        debug!(event_id = %event.id, model = %self.config.model, "requesting completion");

        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&CompletionRequest {
                model: &self.config.model,
                system_prompt: self.config.system_prompt.as_deref(),
                message: &event.body,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::CompletionStatus {
                status: status.as_u16(),
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        match parsed.content {
            Some(content) if !content.trim().is_empty() => Ok(Some(content)),
            Some(_) => Ok(None),
            None => Err(AgentError::Malformed("completion response missing content".into())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
