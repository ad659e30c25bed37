//! Outbound sends — messages this system originates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery status of an outbound send.
///
/// Transitions are monotonic forward (`queued → sent → delivered → read`)
/// except `failed`, which is terminal from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    /// Recorded locally, not yet handed to the remote endpoint.
    Queued,
    /// Accepted by the remote endpoint.
    Sent,
    /// Delivered to the recipient's device.
    Delivered,
    /// Read by the recipient.
    Read,
    /// Send attempt failed. Terminal.
    Failed,
}

impl SendStatus {
    /// Whether this status is terminal (no further transitions).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Read | Self::Failed)
    }

    /// Position on the forward delivery path. `failed` sits outside the path.
    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 4,
        }
    }

    /// Whether a transition from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        next.rank() > self.rank()
    }

    /// Map a remote ack status code to a delivery status.
    ///
    /// Wire codes: `1` accepted, `2` delivered, `3` read. Unknown codes
    /// yield `None` and the ack is ignored.
    #[must_use]
    pub fn from_ack_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Sent),
            2 => Some(Self::Delivered),
            3 => Some(Self::Read),
            _ => None,
        }
    }

    /// SQL string representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    /// Parse the SQL string form. Returns `None` for unknown values.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Where an outbound send originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOrigin {
    /// Created directly by an operator.
    Manual,
    /// Produced by the Response Dispatcher.
    Agent,
    /// Fired by the Schedule Worker.
    Schedule,
}

impl SendOrigin {
    /// SQL string representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Agent => "agent",
            Self::Schedule => "schedule",
        }
    }

    /// Parse the SQL string form. Returns `None` for unknown values.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "agent" => Some(Self::Agent),
            "schedule" => Some(Self::Schedule),
            _ => None,
        }
    }
}

impl std::fmt::Display for SendOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A message this system originates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundSend {
    /// Unique id (`send_` prefixed UUIDv7).
    pub id: String,
    /// Owning account.
    pub account_id: String,
    /// Recipient identity.
    pub recipient: String,
    /// Message body.
    pub body: String,
    /// Delivery status.
    pub status: SendStatus,
    /// What produced this send.
    pub origin: SendOrigin,
    /// Message id assigned by the remote endpoint once sent. Acks match on this.
    pub external_id: Option<String>,
    /// Failure detail when `status` is `failed`.
    pub error: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time the remote endpoint accepted the send.
    pub sent_at: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
