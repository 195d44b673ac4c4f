//! # slotlink-settings
//!
//! Configuration for the slotlink workspace, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`SlotlinkSettings::default()`]
//! 2. **User file**: `~/.slotlink/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SLOTLINK_*` overrides (highest priority)
//!
//! The global snapshot is reloadable: [`reload_settings_from_path`] swaps the
//! cached value so later [`get_settings`] calls see fresh data.
//!
//! ## Crate Position
//!
//! Leaf crate with no slotlink dependencies. Read by slotlink-core for log
//! output, and by slotlink-subscriptions and slotlink-messaging for their
//! defaults.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::path::Path;
use std::sync::{Arc, RwLock};

static SETTINGS: RwLock<Option<Arc<SlotlinkSettings>>> = RwLock::new(None);

/// Get the global settings instance.
///
/// The first call loads from disk and the environment; on failure the
/// compiled defaults are cached instead.
pub fn get_settings() -> Arc<SlotlinkSettings> {
    {
        let guard = SETTINGS.read().expect("settings lock poisoned");
        if let Some(ref s) = *guard {
            return Arc::clone(s);
        }
    }

    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            SlotlinkSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Replace the global settings with a specific value.
pub fn init_settings(settings: SlotlinkSettings) {
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(Arc::new(settings));
}

/// Reload settings from a specific file path and swap the global cache.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(match load_settings_from_path(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, ?path, "failed to reload settings, falling back to defaults");
            SlotlinkSettings::default()
        }
    });
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests that mutate the global snapshot hold this lock.
    static SETTINGS_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn init_then_get_returns_same_values() {
        let _guard = SETTINGS_MUTEX.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut custom = SlotlinkSettings::default();
        custom.cleanup.slice_ms = 42;
        init_settings(custom);
        assert_eq!(get_settings().cleanup.slice_ms, 42);
    }

    #[test]
    fn reload_swaps_snapshot() {
        let _guard = SETTINGS_MUTEX.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"messaging": {"defaultTimeoutMs": 1234}}"#).unwrap();

        init_settings(SlotlinkSettings::default());
        let before = get_settings();
        reload_settings_from_path(&path);
        let after = get_settings();

        assert_eq!(before.messaging.default_timeout_ms, 30_000);
        assert_eq!(after.messaging.default_timeout_ms, 1234);
    }

    #[test]
    fn reload_bad_file_falls_back_to_defaults() {
        let _guard = SETTINGS_MUTEX.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{").unwrap();
        reload_settings_from_path(&path);
        assert_eq!(*get_settings(), SlotlinkSettings::default());
    }
}
