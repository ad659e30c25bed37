//! Settings errors.

use thiserror::Error;

/// Errors raised while loading or parsing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file {path}: {reason}")]
    Read {
        /// File path.
        path: String,
        /// Underlying I/O cause.
        reason: String,
    },

    /// The settings file is not valid JSON or has the wrong shape.
    #[error("failed to parse settings file {path}: {reason}")]
    Parse {
        /// File path.
        path: String,
        /// Underlying serde cause.
        reason: String,
    },
}

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
