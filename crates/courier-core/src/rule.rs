//! Ignore rules — suppression predicates evaluated before agent dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What part of an inbound event an ignore rule matches against.
///
/// Rules are evaluated in scope order `contact → group → keyword`; the first
/// match suppresses all agent invocation for the event. Persistence of the
/// event is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreScope {
    /// Matches the sender identity exactly.
    Contact,
    /// Matches the group-chat identity exactly.
    Group,
    /// Regex matched against the message body.
    Keyword,
}

impl IgnoreScope {
    /// SQL string representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Group => "group",
            Self::Keyword => "keyword",
        }
    }

    /// Parse the SQL string form. Returns `None` for unknown values.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "contact" => Some(Self::Contact),
            "group" => Some(Self::Group),
            "keyword" => Some(Self::Keyword),
            _ => None,
        }
    }

    /// Evaluation order of the scope (lower first).
    #[must_use]
    pub fn order(self) -> u8 {
        match self {
            Self::Contact => 0,
            Self::Group => 1,
            Self::Keyword => 2,
        }
    }
}

impl std::fmt::Display for IgnoreScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A suppression predicate attached to one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRule {
    /// Unique id (`rule_` prefixed UUIDv7).
    pub id: String,
    /// Owning account.
    pub account_id: String,
    /// What the rule matches against.
    pub scope: IgnoreScope,
    /// Exact identity for contact/group scopes, regex for keyword scope.
    pub pattern: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_round_trip() {
        for scope in [IgnoreScope::Contact, IgnoreScope::Group, IgnoreScope::Keyword] {
            assert_eq!(IgnoreScope::from_sql(scope.as_sql()), Some(scope));
        }
    }

    #[test]
    fn scope_order_is_contact_group_keyword() {
        assert!(IgnoreScope::Contact.order() < IgnoreScope::Group.order());
        assert!(IgnoreScope::Group.order() < IgnoreScope::Keyword.order());
    }
}
