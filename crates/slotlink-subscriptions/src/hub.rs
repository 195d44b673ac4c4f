//! One-stop construction of the subscription layer.

use std::sync::Arc;

use slotlink_core::Transport;
use slotlink_settings::CleanupSettings;
use tracing::info;

use crate::cancellation::CancellationRegistry;
use crate::cleanup_config::{CleanupConfig, CleanupConfigStore};
use crate::lifecycle::LifecycleMonitor;
use crate::registry::SubscriptionRegistry;

/// The registries and monitor of one process (or one test), wired to a
/// single transport.
#[derive(Clone)]
pub struct SubscriptionHub {
    transport: Arc<dyn Transport>,
    configs: Arc<CleanupConfigStore>,
    registry: Arc<SubscriptionRegistry>,
    cancellations: Arc<CancellationRegistry>,
    monitor: LifecycleMonitor,
}

impl SubscriptionHub {
    /// Build a hub with default cleanup settings.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_settings(transport, &CleanupSettings::default())
    }

    /// Build a hub whose unconfigured sources use the delays in `settings`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn with_settings(transport: Arc<dyn Transport>, settings: &CleanupSettings) -> Self {
        let configs = Arc::new(CleanupConfigStore::with_fallback(
            CleanupConfig::from_settings(settings),
        ));
        let registry = Arc::new(SubscriptionRegistry::with_configs(
            Arc::clone(&transport),
            Arc::clone(&configs),
        ));
        let cancellations = Arc::new(CancellationRegistry::new());
        let monitor = LifecycleMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&cancellations),
            settings.slice(),
        );
        Self {
            transport,
            configs,
            registry,
            cancellations,
            monitor,
        }
    }

    /// The transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Per-source cleanup delays.
    pub fn configs(&self) -> &Arc<CleanupConfigStore> {
        &self.configs
    }

    /// The subscription registry.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Pending delayed removals.
    pub fn cancellations(&self) -> &Arc<CancellationRegistry> {
        &self.cancellations
    }

    /// The lifecycle monitor.
    pub fn monitor(&self) -> &LifecycleMonitor {
        &self.monitor
    }

    /// Cancel every pending delayed removal.
    pub fn shutdown(&self) {
        let cancelled = self.cancellations.cancel_all();
        info!(cancelled, "subscription hub shut down");
    }
}
