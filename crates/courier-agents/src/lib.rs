//! Response strategies.
//!
//! An agent decides whether and how to answer one inbound message. The two
//! strategies share the [`ResponseStrategy`] seam: rule-based agents match
//! patterns locally, generative agents call an external completion endpoint.
//! Both return `Ok(None)` when they decline to respond.

pub mod errors;
pub mod generative;
pub mod rule_based;

pub use errors::AgentError;
pub use generative::GenerativeStrategy;
pub use rule_based::RuleBasedStrategy;

use async_trait::async_trait;
use courier_core::agent::{AgentConfig, AgentKind};
use courier_core::event::InboundEvent;

/// Decides a response for one inbound message.
#[async_trait]
pub trait ResponseStrategy: Send + Sync {
    /// Produce a response body, or `None` to stay silent.
    async fn respond(&self, event: &InboundEvent) -> Result<Option<String>, AgentError>;
}

/// Build the strategy for one agent configuration.
///
/// Fails when the config payload does not decode for the agent's kind or a
/// rule pattern does not compile.
pub fn build_strategy(config: &AgentConfig) -> Result<Box<dyn ResponseStrategy>, AgentError> {
    match config.kind {
        AgentKind::RuleBased => {
            let rules = config
                .rule_set()
                .map_err(|err| AgentError::Config(err.to_string()))?;
            Ok(Box::new(RuleBasedStrategy::compile(rules)?))
        }
        AgentKind::Generative => {
            let generative = config
                .generative()
                .map_err(|err| AgentError::Config(err.to_string()))?;
            Ok(Box::new(GenerativeStrategy::new(generative)?))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn agent(kind: AgentKind, config: serde_json::Value) -> AgentConfig {
        AgentConfig {
            id: "agent_1".into(),
            account_id: "acct_1".into(),
            kind,
            config,
            allowed_senders: vec![],
            ignore_group_chats: false,
            enabled: true,
            priority: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn builds_both_strategy_kinds() {
        let rule_based = agent(
            AgentKind::RuleBased,
            json!({"rules": [{"pattern": "hi", "response": "hello"}]}),
        );
        assert!(build_strategy(&rule_based).is_ok());

        let generative = agent(
            AgentKind::Generative,
            json!({"endpoint": "https://llm.example/v1/complete", "model": "gpt-x"}),
        );
        assert!(build_strategy(&generative).is_ok());
    }

    #[test]
    fn bad_config_payload_is_a_config_error() {
        let broken = agent(AgentKind::Generative, json!({"model": 42}));
        assert!(matches!(build_strategy(&broken), Err(AgentError::Config(_))));
    }

    #[test]
    fn bad_pattern_is_a_pattern_error() {
        let broken = agent(
            AgentKind::RuleBased,
            json!({"rules": [{"pattern": "([unclosed", "response": "x"}]}),
        );
        assert!(matches!(
            build_strategy(&broken),
            Err(AgentError::Pattern { .. })
        ));
    }
}
