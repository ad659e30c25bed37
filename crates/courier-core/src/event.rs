//! Inbound events — normalized occurrences received from a remote connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a normalized inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A chat message from a remote sender.
    Message,
    /// A delivery-status update for a previously sent outbound message.
    Ack,
    /// A presence change (online/typing). Persisted, never dispatched.
    Presence,
    /// Connection lifecycle (connected/disconnected/login).
    ConnectionState,
}

impl EventKind {
    /// SQL string representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Ack => "ack",
            Self::Presence => "presence",
            Self::ConnectionState => "connection_state",
        }
    }

    /// Parse the SQL string form. Returns `None` for unknown values.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "message" => Some(Self::Message),
            "ack" => Some(Self::Ack),
            "presence" => Some(Self::Presence),
            "connection_state" => Some(Self::ConnectionState),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One normalized occurrence from a remote connection.
///
/// Immutable once persisted. `(account_id, external_id)` is the dedup key:
/// redelivery of the same event is detected by this pair and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Unique id (`evt_` prefixed UUIDv7).
    pub id: String,
    /// Owning account.
    pub account_id: String,
    /// Message id assigned by the remote endpoint, unique per account.
    pub external_id: String,
    /// Sender identity.
    pub sender: String,
    /// Conversation identity the event arrived in.
    pub chat: String,
    /// Content payload. For `ack` events this carries the numeric status code.
    pub body: String,
    /// Event kind.
    pub kind: EventKind,
    /// Whether the conversation is a group chat.
    pub is_group_chat: bool,
    /// When the supervisor received the frame.
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    /// For `ack` events: the external id of the acked outbound message and
    /// the mapped delivery status.
    ///
    /// Ack events embed the acked id in their dedup key as
    /// `<acked_id>:ack:<code>` (each status step of one message is a
    /// distinct occurrence) and carry the numeric code as the body.
    #[must_use]
    pub fn ack_target(&self) -> Option<(&str, crate::send::SendStatus)> {
        if self.kind != EventKind::Ack {
            return None;
        }
        let (target, _) = self.external_id.rsplit_once(":ack:")?;
        let code: i64 = self.body.parse().ok()?;
        crate::send::SendStatus::from_ack_code(code).map(|status| (target, status))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
