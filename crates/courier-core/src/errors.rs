//! Error taxonomy for the Courier pipeline.
//!
//! Errors are contained at the granularity they occur: one account, one
//! event, or one scheduled item. Only startup configuration failures are
//! fatal to the process; everything here is recoverable by design.

use thiserror::Error;

/// Top-level error for pipeline operations.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Handshake, read, or write failure on an account's connection.
    /// Non-fatal: triggers the supervisor's reconnect path.
    #[error("connectivity failure for account {account_id}: {reason}")]
    Connectivity {
        /// Affected account.
        account_id: String,
        /// Underlying cause.
        reason: String,
    },

    /// Dedup hit: the event was already persisted. Not a failure — callers
    /// acknowledge and skip.
    #[error("duplicate event {external_id} for account {account_id}")]
    Duplicate {
        /// Affected account.
        account_id: String,
        /// Remote-assigned message id.
        external_id: String,
    },

    /// Agent strategy failure. Swallowed by the dispatcher after logging;
    /// never propagates into consumer processing.
    #[error("dispatch failure for event {event_id}: {reason}")]
    Dispatch {
        /// Event being dispatched.
        event_id: String,
        /// Underlying cause.
        reason: String,
    },

    /// Storage failure. Transient instances trigger queue redelivery;
    /// repeated instances route the message to the dead-letter sink.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A scheduled send attempt failed. The item becomes terminally
    /// `failed`; re-scheduling is an explicit operator action.
    #[error("schedule {schedule_id} failed to fire: {reason}")]
    ScheduleFire {
        /// Affected scheduled send.
        schedule_id: String,
        /// Underlying cause.
        reason: String,
    },

    /// A referenced account, agent, or item does not exist. Aborts the
    /// single operation with no process-wide effect.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind (e.g. `"account"`).
        kind: &'static str,
        /// Missing id.
        id: String,
    },
}

impl CourierError {
    /// Shorthand for a connectivity error.
    pub fn connectivity(account_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connectivity {
            account_id: account_id.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a dispatch error.
    pub fn dispatch(event_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Dispatch {
            event_id: event_id.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a schedule-fire error.
    pub fn schedule_fire(schedule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ScheduleFire {
            schedule_id: schedule_id.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a not-found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether this is the benign dedup-hit case.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Convenience result alias used across courier crates.
pub type Result<T> = std::result::Result<T, CourierError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
