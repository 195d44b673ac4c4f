//! Per-source cleanup delays.

use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use slotlink_core::EntityRef;
use slotlink_settings::CleanupSettings;

/// Delays applied before reclaiming a source's subscriptions.
///
/// Immutable once built; replaced wholesale in [`CleanupConfigStore`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupConfig {
    destination_deleted_ms: u64,
    source_deleted_ms: u64,
    source_stopped_ms: u64,
}

impl CleanupConfig {
    /// Build a config from the three delays.
    pub fn new(
        destination_deleted: Duration,
        source_deleted: Duration,
        source_stopped: Duration,
    ) -> Self {
        Self {
            destination_deleted_ms: duration_ms(destination_deleted),
            source_deleted_ms: duration_ms(source_deleted),
            source_stopped_ms: duration_ms(source_stopped),
        }
    }

    /// Defaults taken from settings.
    pub fn from_settings(settings: &CleanupSettings) -> Self {
        Self {
            destination_deleted_ms: settings.destination_deleted_ms,
            source_deleted_ms: settings.source_deleted_ms,
            source_stopped_ms: settings.source_stopped_ms,
        }
    }

    /// Delay after a destination entity is deleted.
    pub fn destination_deleted(&self) -> Duration {
        Duration::from_millis(self.destination_deleted_ms)
    }

    /// Delay after the source entity is deleted.
    pub fn source_deleted(&self) -> Duration {
        Duration::from_millis(self.source_deleted_ms)
    }

    /// Delay after the source entity is stopped.
    pub fn source_stopped(&self) -> Duration {
        Duration::from_millis(self.source_stopped_ms)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Cleanup configuration per source entity.
pub struct CleanupConfigStore {
    configs: DashMap<String, CleanupConfig>,
    fallback: CleanupConfig,
}

impl CleanupConfigStore {
    /// Create a store whose unset sources use zero delays.
    pub fn new() -> Self {
        Self::with_fallback(CleanupConfig::default())
    }

    /// Create a store whose unset sources use `fallback`.
    pub fn with_fallback(fallback: CleanupConfig) -> Self {
        Self {
            configs: DashMap::new(),
            fallback,
        }
    }

    /// Insert or replace the config of `source`.
    pub fn set(&self, source: EntityRef, config: CleanupConfig) {
        let _ = self.configs.insert(source.key(), config);
    }

    /// The config of `source`, or the fallback.
    pub fn get(&self, source: EntityRef) -> CleanupConfig {
        self.configs
            .get(&source.key())
            .map_or(self.fallback, |c| *c.value())
    }

    /// Forget the config of `source`. Returns whether one was stored.
    pub fn remove(&self, source: EntityRef) -> bool {
        self.configs.remove(&source.key()).is_some()
    }

    /// Number of sources with an explicit config.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Whether no source has an explicit config.
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

impl Default for CleanupConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_source_gets_zero_delays() {
        let store = CleanupConfigStore::new();
        let c = store.get(EntityRef::new(1, 1));
        assert_eq!(c.source_stopped(), Duration::ZERO);
        assert_eq!(c.source_deleted(), Duration::ZERO);
        assert_eq!(c.destination_deleted(), Duration::ZERO);
    }

    #[test]
    fn set_replaces_wholesale() {
        let store = CleanupConfigStore::new();
        let src = EntityRef::new(1, 1);
        store.set(
            src,
            CleanupConfig::new(
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
            ),
        );
        store.set(
            src,
            CleanupConfig::new(Duration::ZERO, Duration::ZERO, Duration::from_millis(200)),
        );
        let c = store.get(src);
        assert_eq!(c.destination_deleted(), Duration::ZERO);
        assert_eq!(c.source_stopped(), Duration::from_millis(200));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_restores_fallback() {
        let fallback = CleanupConfig::new(Duration::ZERO, Duration::ZERO, Duration::from_secs(9));
        let store = CleanupConfigStore::with_fallback(fallback);
        let src = EntityRef::new(1, 1);
        store.set(src, CleanupConfig::default());
        assert!(store.remove(src));
        assert!(!store.remove(src));
        assert_eq!(store.get(src), fallback);
    }

    #[test]
    fn from_settings_copies_delays() {
        let settings = CleanupSettings {
            source_stopped_ms: 5,
            ..CleanupSettings::default()
        };
        let c = CleanupConfig::from_settings(&settings);
        assert_eq!(c.source_stopped(), Duration::from_millis(5));
    }

    #[test]
    fn serializes_camel_case() {
        let c = CleanupConfig::new(
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_millis(3),
        );
        let json = serde_json::to_value(c).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"destinationDeletedMs": 1, "sourceDeletedMs": 2, "sourceStoppedMs": 3})
        );
    }
}
