//! Agent configurations — per-account automated responding policies.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response strategy variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Pattern-matching rules with templated responses.
    RuleBased,
    /// Opaque external generative call.
    Generative,
}

impl AgentKind {
    /// SQL string representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::RuleBased => "rule_based",
            Self::Generative => "generative",
        }
    }

    /// Parse the SQL string form. Returns `None` for unknown values.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "rule_based" => Some(Self::RuleBased),
            "generative" => Some(Self::Generative),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// How a rule's pattern is matched against the message body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Regular-expression search anywhere in the body.
    #[default]
    Regex,
    /// Substring containment.
    Contains,
    /// Whole-body equality.
    Exact,
    /// Body prefix.
    StartsWith,
    /// Body suffix.
    EndsWith,
}

/// One pattern → response rule, evaluated in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRule {
    /// Pattern to match (regex or literal, per `match_kind`).
    pub pattern: String,
    /// Response template. `{{name}}` placeholders are substituted from the
    /// rule set's variable map.
    pub response: String,
    /// Matching mode.
    #[serde(default)]
    pub match_kind: MatchKind,
    /// Case-insensitive matching.
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
}

fn default_true() -> bool {
    true
}

/// Parsed configuration for a rule-based agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetConfig {
    /// Ordered rules; the first match wins.
    #[serde(default)]
    pub rules: Vec<ResponseRule>,
    /// Optional trigger keyword. When set, the body must contain it
    /// (case-insensitive) before any rule is considered.
    #[serde(default)]
    pub trigger: Option<String>,
    /// Response when no rule matches. `None` means stay silent.
    #[serde(default)]
    pub default_response: Option<String>,
    /// Values substituted into `{{name}}` template placeholders.
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Parsed configuration for a generative agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerativeConfig {
    /// Completion endpoint URL.
    pub endpoint: String,
    /// Model identifier forwarded to the endpoint.
    pub model: String,
    /// System prompt prepended to the conversation.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// A responding policy attached to one account.
///
/// The `config` payload is opaque JSON interpreted per `kind`; use
/// [`AgentConfig::rule_set`] or [`AgentConfig::generative`] to decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique id (`agent_` prefixed UUIDv7).
    pub id: String,
    /// Owning account.
    pub account_id: String,
    /// Strategy variant.
    pub kind: AgentKind,
    /// Strategy-specific configuration payload.
    pub config: serde_json::Value,
    /// Sender identities this agent responds to. Empty means all senders.
    pub allowed_senders: Vec<String>,
    /// Skip events arriving in group chats.
    pub ignore_group_chats: bool,
    /// Disabled agents are never selected.
    pub enabled: bool,
    /// Selection order, ascending. Ties break by insertion order.
    pub priority: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl AgentConfig {
    /// Decode the config payload as a rule set.
    pub fn rule_set(&self) -> Result<RuleSetConfig, serde_json::Error> {
        serde_json::from_value(self.config.clone())
    }

    /// Decode the config payload as a generative config.
    pub fn generative(&self) -> Result<GenerativeConfig, serde_json::Error> {
        serde_json::from_value(self.config.clone())
    }

    /// Whether this agent may respond to the given sender.
    #[must_use]
    pub fn allows_sender(&self, sender: &str) -> bool {
        self.allowed_senders.is_empty() || self.allowed_senders.iter().any(|s| s == sender)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
