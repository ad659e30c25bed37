//! # courier-settings
//!
//! Configuration management with layered sources for the Courier daemon.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`CourierSettings::default()`]
//! 2. **User file** — `~/.courier/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `COURIER_*` overrides (highest priority)
//!
//! The daemon loads once at startup and hands the resulting
//! [`CourierSettings`] to each component; configuration is never read
//! through a global.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
