//! # halo-settings
//!
//! Configuration management with layered sources for Halo.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`HaloSettings::default()`]
//! 2. **User file** — `~/.halo/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `HALO_*` overrides (highest priority)
//!
//! The global singleton is reloadable: when the dashboard writes new values
//! to disk, [`reload_settings_from_path`] swaps the cached value so all
//! subsequent [`get_settings`] calls return fresh data.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::path::Path;
use std::sync::{Arc, RwLock};

/// Global settings singleton.
///
/// Uses `RwLock<Option<Arc<HaloSettings>>>` instead of `OnceLock` so the
/// cached value can be swapped after a settings reload. Reads are cheap
/// (shared lock + `Arc::clone`); writes only happen on reload.
static SETTINGS: RwLock<Option<Arc<HaloSettings>>> = RwLock::new(None);

/// Get the global settings instance.
///
/// On first call, loads from `~/.halo/settings.json` with env overrides.
/// If loading fails, compiled defaults are used. Returns an `Arc` so
/// callers hold a consistent snapshot even across a concurrent reload.
pub fn get_settings() -> Arc<HaloSettings> {
    {
        let guard = SETTINGS.read().expect("settings lock poisoned");
        if let Some(ref s) = *guard {
            return Arc::clone(s);
        }
    }

    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    // Double-check after acquiring write lock (another thread may have initialized)
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            HaloSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Initialize the global settings with a specific value.
///
/// Replaces any previously cached settings. Useful for tests and server
/// startup where the settings path is known.
pub fn init_settings(settings: HaloSettings) {
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(Arc::new(settings));
}

/// Reload settings from a specific file path and swap the global cache.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(match load_settings_from_path(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, ?path, "failed to reload settings, falling back to defaults");
            HaloSettings::default()
        }
    });
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests that mutate the global SETTINGS static must hold this lock
    /// to avoid racing with each other (Rust runs tests in parallel threads).
    static SETTINGS_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn init_then_get_returns_same_values() {
        let _guard = SETTINGS_MUTEX.lock().unwrap();
        let mut s = HaloSettings::default();
        s.server.port = 12345;
        init_settings(s);
        assert_eq!(get_settings().server.port, 12345);
    }

    #[test]
    fn reload_swaps_cached_value() {
        let _guard = SETTINGS_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 4321}}"#).unwrap();

        init_settings(HaloSettings::default());
        reload_settings_from_path(&path);
        assert_eq!(get_settings().server.port, 4321);
    }

    #[test]
    fn reload_from_bad_file_falls_back_to_defaults() {
        let _guard = SETTINGS_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "garbage").unwrap();

        reload_settings_from_path(&path);
        assert_eq!(
            get_settings().server.port,
            HaloSettings::default().server.port
        );
    }
}
