//! Settings loading: defaults → file deep-merge → env overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::CourierSettings;

/// Default settings file location (`~/.courier/settings.json`).
#[must_use]
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".courier")
        .join("settings.json")
}

/// Deep-merge `overlay` into `base`. Objects merge recursively; any other
/// value in `overlay` replaces the value in `base`.
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Load settings from a specific path with env overrides applied.
///
/// A missing file is not an error: the compiled defaults (plus env
/// overrides) are returned.
pub fn load_settings_from_path(path: &Path) -> Result<CourierSettings> {
    let defaults = serde_json::to_value(CourierSettings::default())
        .map_err(|e| parse_error(path, &e.to_string()))?;

    let merged = if path.exists() {
        let raw = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let overlay: Value =
            serde_json::from_str(&raw).map_err(|e| parse_error(path, &e.to_string()))?;
        deep_merge(defaults, overlay)
    } else {
        defaults
    };

    let mut settings: CourierSettings =
        serde_json::from_value(merged).map_err(|e| parse_error(path, &e.to_string()))?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn parse_error(path: &Path, reason: &str) -> SettingsError {
    SettingsError::Parse {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Apply `COURIER_*` environment overrides (highest priority layer).
fn apply_env_overrides(settings: &mut CourierSettings) {
    if let Ok(v) = std::env::var("COURIER_DB_PATH") {
        settings.database.path = v;
    }
    if let Ok(v) = std::env::var("COURIER_GATEWAY_URL") {
        settings.gateway.base_url = v;
    }
    if let Ok(v) = std::env::var("COURIER_GATEWAY_USERNAME") {
        settings.gateway.username = v;
    }
    if let Ok(v) = std::env::var("COURIER_GATEWAY_PASSWORD") {
        settings.gateway.password = v;
    }
    if let Ok(v) = std::env::var("COURIER_LOG_FILTER") {
        settings.logging.filter = v;
    }
    if let Ok(v) = std::env::var("COURIER_LOG_JSON") {
        settings.logging.json = matches!(v.as_str(), "1" | "true" | "yes");
    }
    if let Ok(v) = std::env::var("COURIER_SCHEDULER_POLL_SECS")
        && let Ok(secs) = v.parse()
    {
        settings.scheduler.poll_interval_secs = secs;
    }
    if let Ok(v) = std::env::var("COURIER_RECONCILE_SECS")
        && let Ok(secs) = v.parse()
    {
        settings.manager.reconcile_interval_secs = secs;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
