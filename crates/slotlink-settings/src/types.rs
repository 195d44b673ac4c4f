//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so partial JSON files are accepted and missing fields keep their
//! compiled default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "cleanup": { "sliceMs": 500 },
///   "messaging": { "defaultTimeoutMs": 10000 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlotlinkSettings {
    /// Settings schema version.
    pub version: String,
    /// Lifecycle-driven cleanup behaviour.
    pub cleanup: CleanupSettings,
    /// Request/reply behaviour.
    pub messaging: MessagingSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for SlotlinkSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            cleanup: CleanupSettings::default(),
            messaging: MessagingSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Cleanup scheduling settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanupSettings {
    /// Sleep slice between cancellation checks of a delayed cleanup.
    pub slice_ms: u64,
    /// Default delay before cleaning up after a destination is deleted.
    pub destination_deleted_ms: u64,
    /// Default delay before cleaning up after the source is deleted.
    pub source_deleted_ms: u64,
    /// Default delay before cleaning up after the source is stopped.
    pub source_stopped_ms: u64,
}

impl CleanupSettings {
    /// Slice as a [`Duration`].
    pub fn slice(&self) -> Duration {
        Duration::from_millis(self.slice_ms)
    }
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            slice_ms: 1_000,
            destination_deleted_ms: 0,
            source_deleted_ms: 0,
            source_stopped_ms: 0,
        }
    }
}

/// Messaging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagingSettings {
    /// Timeout used when a caller does not pass one.
    pub default_timeout_ms: u64,
    /// Copy an envelope's source and return address into its messages before sending.
    pub bubble_down: bool,
    /// Capacity of a reply waiter's inbound queue.
    pub max_pending_replies: usize,
}

impl MessagingSettings {
    /// Default timeout as a [`Duration`].
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            bubble_down: true,
            max_pending_replies: 64,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`..`error`), overridden by `RUST_LOG`.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = SlotlinkSettings::default();
        assert_eq!(s.cleanup.slice(), Duration::from_secs(1));
        assert_eq!(s.cleanup.source_stopped_ms, 0);
        assert_eq!(s.messaging.default_timeout(), Duration::from_secs(30));
        assert!(s.messaging.bubble_down);
        assert_eq!(s.logging.level, "warn");
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(SlotlinkSettings::default()).unwrap();
        assert_eq!(json["cleanup"]["sliceMs"], 1000);
        assert_eq!(json["messaging"]["defaultTimeoutMs"], 30_000);
        assert_eq!(json["messaging"]["bubbleDown"], true);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s: SlotlinkSettings =
            serde_json::from_str(r#"{"messaging": {"bubbleDown": false}}"#).unwrap();
        assert!(!s.messaging.bubble_down);
        assert_eq!(s.messaging.default_timeout_ms, 30_000);
        assert_eq!(s.cleanup, CleanupSettings::default());
    }
}
