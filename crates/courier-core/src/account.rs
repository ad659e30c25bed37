//! Managed accounts — one per remote endpoint the system keeps connected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a managed account.
///
/// `pending` and `connecting`/`connected`/`disconnected` are mutated only by
/// the Connection Supervisor and Connection Manager. `deactivated` is the
/// soft-delete terminal state — accounts referenced by stored events are
/// never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Registered but never connected.
    Pending,
    /// Connection attempt in progress.
    Connecting,
    /// Live streaming connection established.
    Connected,
    /// Connection lost; reconnect pending.
    Disconnected,
    /// Soft-deleted; never reconnected.
    Deactivated,
}

impl AccountStatus {
    /// Whether the account should hold a live connection.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Deactivated)
    }

    /// SQL string representation (matches `SQLite` CHECK constraint values).
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Deactivated => "deactivated",
        }
    }

    /// Parse the SQL string form. Returns `None` for unknown values.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "connecting" => Some(Self::Connecting),
            "connected" => Some(Self::Connected),
            "disconnected" => Some(Self::Disconnected),
            "deactivated" => Some(Self::Deactivated),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One remote endpoint this system maintains a persistent connection to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedAccount {
    /// Unique id (`acct_` prefixed UUIDv7).
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// External identity assigned by the remote endpoint once logged in.
    pub external_identity: Option<String>,
    /// Lifecycle status.
    pub status: AccountStatus,
    /// Last time any frame was seen on this account's connection.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
