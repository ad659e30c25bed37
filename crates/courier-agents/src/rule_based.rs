//! Rule-based response strategy.
//!
//! Rules are compiled once at build time and evaluated in declaration order
//! against each message body; the first match wins. An optional trigger
//! keyword gates the whole rule set, and `{{name}}` placeholders in response
//! templates are filled from the rule set's variable map.

use async_trait::async_trait;
use courier_core::agent::{MatchKind, ResponseRule, RuleSetConfig};
use courier_core::event::InboundEvent;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::errors::AgentError;
use crate::ResponseStrategy;

struct CompiledRule {
    rule: ResponseRule,
    // Only populated for MatchKind::Regex; literal kinds compare directly.
    regex: Option<Regex>,
}

impl CompiledRule {
    fn matches(&self, body: &str) -> bool {
        if let Some(regex) = &self.regex {
            return regex.is_match(body);
        }
        let (body, pattern) = if self.rule.case_insensitive {
            (body.to_lowercase(), self.rule.pattern.to_lowercase())
        } else {
            (body.to_string(), self.rule.pattern.clone())
        };
        match self.rule.match_kind {
            MatchKind::Regex => false,
            MatchKind::Contains => body.contains(&pattern),
            MatchKind::Exact => body == pattern,
            MatchKind::StartsWith => body.starts_with(&pattern),
            MatchKind::EndsWith => body.ends_with(&pattern),
        }
    }
}

/// Pattern-matching strategy over a compiled rule set.
pub struct RuleBasedStrategy {
    rules: Vec<CompiledRule>,
    trigger: Option<String>,
    default_response: Option<String>,
    variables: std::collections::HashMap<String, String>,
}

impl RuleBasedStrategy {
    /// Compile a rule set. Fails on the first invalid regex pattern.
    pub fn compile(config: RuleSetConfig) -> Result<Self, AgentError> {
        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in config.rules {
            let regex = if rule.match_kind == MatchKind::Regex {
                let compiled = RegexBuilder::new(&rule.pattern)
                    .case_insensitive(rule.case_insensitive)
                    .build()
                    .map_err(|err| AgentError::Pattern {
                        pattern: rule.pattern.clone(),
                        reason: err.to_string(),
                    })?;
                Some(compiled)
            } else {
                None
            };
            rules.push(CompiledRule { rule, regex });
        }
        Ok(Self {
            rules,
            trigger: config.trigger,
            default_response: config.default_response,
            variables: config.variables,
        })
    }

    fn render(&self, template: &str) -> String {
        let mut rendered = template.to_string();
        for (name, value) in &self.variables {
            rendered = rendered.replace(&format!("{{{{{name}}}}}"), value);
        }
        rendered
    }

    fn evaluate(&self, body: &str) -> Option<String> {
        if let Some(trigger) = &self.trigger {
            if !body.to_lowercase().contains(&trigger.to_lowercase()) {
                return None;
            }
        }
        for compiled in &self.rules {
            if compiled.matches(body) {
                return Some(self.render(&compiled.rule.response));
            }
        }
        self.default_response.as_deref().map(|d| self.render(d))
    }
}

#[async_trait]
impl ResponseStrategy for RuleBasedStrategy {
    async fn respond(&self, event: &InboundEvent) -> Result<Option<String>, AgentError> {
        let response = self.evaluate(&event.body);
        if response.is_some() {
            debug!(event_id = %event.id, "rule matched");
        }
        Ok(response)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_core::event::EventKind;
    use serde_json::json;

    fn event(body: &str) -> InboundEvent {
        InboundEvent {
            id: "evt_1".into(),
            account_id: "acct_1".into(),
            external_id: "M1".into(),
            sender: "alice@host".into(),
            chat: "alice@host".into(),
            body: body.into(),
            kind: EventKind::Message,
            is_group_chat: false,
            received_at: Utc::now(),
        }
    }

    fn strategy(config: serde_json::Value) -> RuleBasedStrategy {
        RuleBasedStrategy::compile(serde_json::from_value(config).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn first_matching_rule_wins() {
        let s = strategy(json!({
            "rules": [
                {"pattern": "hi|hello", "response": "Welcome!"},
                {"pattern": "hello", "response": "shadowed"}
            ]
        }));
        assert_eq!(
            s.respond(&event("hello there")).await.unwrap(),
            Some("Welcome!".into())
        );
    }

    #[tokio::test]
    async fn regex_matching_is_case_insensitive_by_default() {
        let s = strategy(json!({
            "rules": [{"pattern": "hi|hello", "response": "Welcome!"}]
        }));
        assert_eq!(s.respond(&event("HELLO")).await.unwrap(), Some("Welcome!".into()));

        let strict = strategy(json!({
            "rules": [{"pattern": "hello", "response": "hey", "case_insensitive": false}]
        }));
        assert_eq!(strict.respond(&event("HELLO")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn no_match_and_no_default_stays_silent() {
        let s = strategy(json!({
            "rules": [{"pattern": "help", "response": "How can I help?"}]
        }));
        assert_eq!(s.respond(&event("what's the weather")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn default_response_covers_unmatched_bodies() {
        let s = strategy(json!({
            "rules": [{"pattern": "help", "response": "How can I help?"}],
            "default_response": "I didn't catch that."
        }));
        assert_eq!(
            s.respond(&event("gibberish")).await.unwrap(),
            Some("I didn't catch that.".into())
        );
    }

    #[tokio::test]
    async fn trigger_gates_the_whole_rule_set() {
        let s = strategy(json!({
            "trigger": "bot",
            "rules": [{"pattern": "hi", "response": "hello"}],
            "default_response": "yes?"
        }));
        assert_eq!(s.respond(&event("hi everyone")).await.unwrap(), None);
        assert_eq!(s.respond(&event("hey BOT, hi")).await.unwrap(), Some("hello".into()));
        assert_eq!(s.respond(&event("bot?")).await.unwrap(), Some("yes?".into()));
    }

    #[tokio::test]
    async fn literal_match_kinds() {
        let s = strategy(json!({
            "rules": [
                {"pattern": "ping", "response": "pong", "match_kind": "exact"},
                {"pattern": "order #", "response": "checking", "match_kind": "contains"},
                {"pattern": "hey", "response": "hi", "match_kind": "starts_with"},
                {"pattern": "bye", "response": "later", "match_kind": "ends_with"}
            ]
        }));
        assert_eq!(s.respond(&event("ping")).await.unwrap(), Some("pong".into()));
        assert_eq!(s.respond(&event("my order #42?")).await.unwrap(), Some("checking".into()));
        assert_eq!(s.respond(&event("hey you")).await.unwrap(), Some("hi".into()));
        assert_eq!(s.respond(&event("ok bye")).await.unwrap(), Some("later".into()));
        assert_eq!(s.respond(&event("ping pong")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn template_variables_are_substituted() {
        let s = strategy(json!({
            "rules": [{"pattern": "hours", "response": "We're open {{hours}}, {{name}}!"}],
            "variables": {"hours": "9-5", "name": "friend"}
        }));
        assert_eq!(
            s.respond(&event("what are your hours?")).await.unwrap(),
            Some("We're open 9-5, friend!".into())
        );
    }

    #[test]
    fn invalid_regex_fails_compilation() {
        let config: RuleSetConfig = serde_json::from_value(json!({
            "rules": [{"pattern": "([unclosed", "response": "x"}]
        }))
        .unwrap();
        assert!(matches!(
            RuleBasedStrategy::compile(config),
            Err(AgentError::Pattern { .. })
        ));
    }
}
