//! Store errors.

use thiserror::Error;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool failure.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A referenced row does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Row kind (e.g. `"account"`).
        kind: &'static str,
        /// Missing id.
        id: String,
    },

    /// A status transition was rejected (monotonicity or claim violation).
    #[error("invalid transition for {kind} {id}: {reason}")]
    InvalidTransition {
        /// Row kind.
        kind: &'static str,
        /// Affected id.
        id: String,
        /// What was rejected.
        reason: String,
    },

    /// Internal invariant violation (poisoned lock, corrupt stored value).
    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Shorthand for a not-found error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<StoreError> for courier_core::errors::CourierError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Persistence(other.to_string()),
        }
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
