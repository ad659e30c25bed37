//! Scheduled sends — deferred outbound templates fired by the Schedule Worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State machine of a scheduled send.
///
/// `pending → {sent, failed, cancelled}`, terminal on any right-hand state.
/// `in_flight` is the claim marker taken by the worker between the due check
/// and the send attempt; it never rests across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Waiting for its fire time.
    Pending,
    /// Claimed by a worker tick; send attempt in progress.
    InFlight,
    /// Fired successfully. Terminal for one-shot items.
    Sent,
    /// Send attempt failed. Terminal, no automatic retry.
    Failed,
    /// Cancelled before firing. Terminal, pre-empts firing.
    Cancelled,
}

impl ScheduleStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed | Self::Cancelled)
    }

    /// SQL string representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the SQL string form. Returns `None` for unknown values.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A deferred outbound send template.
///
/// Exactly one outbound send is produced per firing. Recurring items carry a
/// cron expression; after a successful firing the worker recomputes the next
/// occurrence and returns the item to `pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledSend {
    /// Unique id (`sched_` prefixed UUIDv7).
    pub id: String,
    /// Owning account.
    pub account_id: String,
    /// Recipient identity.
    pub recipient: String,
    /// Message body.
    pub body: String,
    /// Next (or only) fire time.
    pub fire_at: DateTime<Utc>,
    /// Cron expression for recurring items.
    pub cron_expr: Option<String>,
    /// State machine position.
    pub status: ScheduleStatus,
    /// Last time a worker claimed this item.
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// Time of the successful firing.
    pub sent_at: Option<DateTime<Utc>>,
    /// Failure detail when `status` is `failed`.
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ScheduledSend {
    /// Whether this item re-fires on a cron schedule.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.cron_expr.as_deref().is_some_and(|e| !e.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!ScheduleStatus::Pending.is_terminal());
        assert!(!ScheduleStatus::InFlight.is_terminal());
        assert!(ScheduleStatus::Sent.is_terminal());
        assert!(ScheduleStatus::Failed.is_terminal());
        assert!(ScheduleStatus::Cancelled.is_terminal());
    }

    #[test]
    fn sql_round_trip() {
        for status in [
            ScheduleStatus::Pending,
            ScheduleStatus::InFlight,
            ScheduleStatus::Sent,
            ScheduleStatus::Failed,
            ScheduleStatus::Cancelled,
        ] {
            assert_eq!(ScheduleStatus::from_sql(status.as_sql()), Some(status));
        }
    }

    #[test]
    fn recurring_requires_non_empty_expression() {
        let mut item = ScheduledSend {
            id: "sched_1".into(),
            account_id: "acct_1".into(),
            recipient: "r".into(),
            body: "b".into(),
            fire_at: Utc::now(),
            cron_expr: None,
            status: ScheduleStatus::Pending,
            last_attempted_at: None,
            sent_at: None,
            error: None,
            created_at: Utc::now(),
        };
        assert!(!item.is_recurring());
        item.cron_expr = Some(String::new());
        assert!(!item.is_recurring());
        item.cron_expr = Some("*/5 * * * *".into());
        assert!(item.is_recurring());
    }
}
