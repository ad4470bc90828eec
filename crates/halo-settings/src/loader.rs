//! Layered settings loading.
//!
//! Three layers, in priority order:
//! 1. Compiled defaults — [`HaloSettings::default()`]
//! 2. User file — `~/.halo/settings.json`, deep-merged over defaults
//! 3. Environment variables — `HALO_*` overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::errors::{Result, SettingsError};
use crate::types::HaloSettings;

/// Resolve the settings file path (`~/.halo/settings.json`).
pub fn settings_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or(SettingsError::NoHome)?;
    Ok(PathBuf::from(home).join(".halo").join("settings.json"))
}

/// Load settings from the default path with env overrides applied.
///
/// A missing file is not an error — defaults are used. A malformed file is.
pub fn load_settings() -> Result<HaloSettings> {
    let path = settings_path()?;
    load_settings_from_path(&path)
}

/// Load settings from a specific path with env overrides applied.
pub fn load_settings_from_path(path: &Path) -> Result<HaloSettings> {
    let defaults = serde_json::to_value(HaloSettings::default())
        .unwrap_or(Value::Object(serde_json::Map::new()));

    let merged = if path.exists() {
        let raw = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let file: Value = serde_json::from_str(&raw).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        deep_merge(defaults, file)
    } else {
        defaults
    };

    let mut settings: HaloSettings = serde_json::from_value(merged).map_err(|e| {
        SettingsError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })?;

    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Deep-merge `overlay` onto `base`.
///
/// Objects merge recursively; any other value in `overlay` replaces the
/// base value wholesale. Arrays are replaced, not concatenated.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => overlay_val,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `HALO_*` environment variable overrides.
fn apply_env_overrides(settings: &mut HaloSettings) {
    if let Ok(v) = std::env::var("HALO_PORT") {
        match v.parse() {
            Ok(port) => settings.server.port = port,
            Err(_) => warn!(value = %v, "ignoring invalid HALO_PORT"),
        }
    }
    if let Ok(v) = std::env::var("HALO_HOST") {
        settings.server.host = v;
    }
    if let Ok(v) = std::env::var("HALO_DB_PATH") {
        settings.store.db_path = Some(v);
    }
    if let Ok(v) = std::env::var("HALO_AUTH_SECRET") {
        settings.auth.secret = v;
    }
    if let Ok(v) = std::env::var("HALO_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Ok(v) = std::env::var("HALO_PUSH_ENABLED") {
        settings.push.enabled = matches!(v.as_str(), "1" | "true" | "yes");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
