//! Wire-frame parsing and normalization.
//!
//! The gateway emits JSON frames with an `event` discriminator. Unknown
//! kinds deserialize to [`GatewayFrame::Unknown`] and are ignored — the
//! supervisor must tolerate protocol growth without restarts.

use std::sync::LazyLock;

use chrono::Utc;
use courier_core::event::{EventKind, InboundEvent};
use courier_core::ids;
use regex::Regex;
use serde::Deserialize;

/// Conversation-identity suffix marking a group chat.
pub const GROUP_CHAT_SUFFIX: &str = "@g.us";

/// One frame off an account's streaming connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayFrame {
    /// Inbound chat message.
    Message {
        /// Remote-assigned message id.
        id: String,
        /// Sender identity.
        sender: String,
        /// Conversation identity.
        chat: String,
        /// Message text.
        #[serde(default)]
        body: String,
    },
    /// Delivery-status update for a previously sent message.
    MessageAck {
        /// Remote-assigned id of the acked message.
        id: String,
        /// Conversation the ack came from.
        #[serde(default)]
        chat: String,
        /// Numeric status code (1 sent, 2 delivered, 3 read).
        code: i64,
    },
    /// Presence change (online/typing) for a conversation.
    Presence {
        /// Conversation identity.
        chat: String,
        /// Presence state text.
        #[serde(default)]
        state: String,
    },
    /// The gateway established the upstream session.
    Connected,
    /// The gateway lost the upstream session.
    Disconnected,
    /// Login completed; the payload carries the account's external identity.
    LoginSuccess {
        /// Raw login payload.
        #[serde(default)]
        payload: String,
    },
    /// Pairing code for an account that has not completed login.
    Qr {
        /// Pairing code to surface to the operator.
        code: String,
    },
    /// Any frame kind this build does not understand.
    #[serde(other)]
    Unknown,
}

/// Parse one frame from its JSON text.
pub fn parse(text: &str) -> Result<GatewayFrame, serde_json::Error> {
    serde_json::from_str(text)
}

static IDENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    // e.g. "Logged in as 15551234567.0:12@s.whatsapp.net"
    Regex::new(r"[0-9][0-9.:]*@[A-Za-z0-9.\-]+").expect("identity regex is valid")
});

/// Extract the external identity from a login payload, if present.
#[must_use]
pub fn extract_identity(payload: &str) -> Option<String> {
    IDENTITY_RE.find(payload).map(|m| m.as_str().to_string())
}

impl GatewayFrame {
    /// Normalize a frame into an [`InboundEvent`] for the queue.
    ///
    /// Returns `None` for frames that carry no event (`qr`, unknown kinds,
    /// or a login payload with no recognizable identity). Connection-state
    /// events synthesize their own dedup key — they are local occurrences,
    /// not remote messages.
    #[must_use]
    pub fn into_event(self, account_id: &str) -> Option<InboundEvent> {
        let received_at = Utc::now();
        match self {
            Self::Message { id, sender, chat, body } => Some(InboundEvent {
                id: ids::new_event_id(),
                account_id: account_id.to_string(),
                external_id: id,
                is_group_chat: chat.ends_with(GROUP_CHAT_SUFFIX),
                sender,
                chat,
                body,
                kind: EventKind::Message,
                received_at,
            }),
            Self::MessageAck { id, chat, code } => Some(InboundEvent {
                id: ids::new_event_id(),
                account_id: account_id.to_string(),
                external_id: format!("{id}:ack:{code}"),
                sender: chat.clone(),
                is_group_chat: chat.ends_with(GROUP_CHAT_SUFFIX),
                chat,
                body: code.to_string(),
                kind: EventKind::Ack,
                received_at,
            }),
            Self::Presence { chat, state } => Some(InboundEvent {
                id: ids::new_event_id(),
                account_id: account_id.to_string(),
                external_id: ids::new_event_id(),
                sender: chat.clone(),
                is_group_chat: chat.ends_with(GROUP_CHAT_SUFFIX),
                chat,
                body: state,
                kind: EventKind::Presence,
                received_at,
            }),
            Self::Connected => Some(connection_state_event(account_id, "connected")),
            Self::Disconnected => Some(connection_state_event(account_id, "disconnected")),
            Self::LoginSuccess { payload } => {
                let identity = extract_identity(&payload)?;
                Some(connection_state_event(account_id, &format!("login:{identity}")))
            }
            Self::Qr { .. } | Self::Unknown => None,
        }
    }

}

fn connection_state_event(account_id: &str, body: &str) -> InboundEvent {
    let id = ids::new_event_id();
    InboundEvent {
        external_id: id.clone(),
        id,
        account_id: account_id.to_string(),
        sender: String::new(),
        chat: String::new(),
        body: body.to_string(),
        kind: EventKind::ConnectionState,
        is_group_chat: false,
        received_at: Utc::now(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
