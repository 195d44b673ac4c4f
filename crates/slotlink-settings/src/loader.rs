//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SlotlinkSettings::default()`]
//! 2. If `~/.slotlink/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SLOTLINK_*` environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::SlotlinkSettings;

/// Resolve the path to the settings file (`~/.slotlink/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".slotlink").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SlotlinkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid value is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SlotlinkSettings> {
    let defaults = serde_json::to_value(SlotlinkSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SlotlinkSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject settings the runtime cannot work with.
pub fn validate(settings: &SlotlinkSettings) -> Result<()> {
    if settings.cleanup.slice_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "cleanup.sliceMs must be greater than zero".into(),
        ));
    }
    if settings.messaging.max_pending_replies == 0 {
        return Err(SettingsError::InvalidValue(
            "messaging.maxPendingReplies must be greater than zero".into(),
        ));
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored.
pub fn apply_env_overrides(settings: &mut SlotlinkSettings) {
    // ── Cleanup ─────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("SLOTLINK_CLEANUP_SLICE_MS", 1, 600_000) {
        settings.cleanup.slice_ms = v;
    }
    if let Some(v) = read_env_u64("SLOTLINK_DESTINATION_DELETED_MS", 0, 86_400_000) {
        settings.cleanup.destination_deleted_ms = v;
    }
    if let Some(v) = read_env_u64("SLOTLINK_SOURCE_DELETED_MS", 0, 86_400_000) {
        settings.cleanup.source_deleted_ms = v;
    }
    if let Some(v) = read_env_u64("SLOTLINK_SOURCE_STOPPED_MS", 0, 86_400_000) {
        settings.cleanup.source_stopped_ms = v;
    }

    // ── Messaging ───────────────────────────────────────────────────
    if let Some(v) = read_env_u64("SLOTLINK_DEFAULT_TIMEOUT_MS", 1, 3_600_000) {
        settings.messaging.default_timeout_ms = v;
    }
    if let Some(v) = read_env_bool("SLOTLINK_BUBBLE_DOWN") {
        settings.messaging.bubble_down = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("SLOTLINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("SLOTLINK_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}
