//! Per-source subscription registry.
//!
//! Each source entity owns an ordered set of [`SubscriptionEntry`]s. Every
//! mutation of a source's set, including the matching transport
//! subscribe/unsubscribe calls, runs inside that source's exclusive section
//! of a [`KeyedLockRegistry`]. A source is present iff it has at least one
//! entry; the registry drops it the moment its set becomes empty.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use slotlink_core::{EntityRef, Transport};
use tracing::{debug, instrument, warn};

use crate::cleanup_config::CleanupConfigStore;
use crate::entry::{Destination, SubscriptionEntry, SubscriptionInfo};
use crate::errors::{Result, SubscriptionError};
use crate::keyed::KeyedLockRegistry;

/// Transport registration key for an entry of `source`.
pub fn transport_key(source: EntityRef, set_id: &str) -> String {
    format!("{source}:{set_id}")
}

/// The entries of one source, in registration order.
#[derive(Debug, Default)]
pub struct SourceSubscriptions {
    entries: IndexMap<String, SubscriptionEntry>,
}

impl SourceSubscriptions {
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn has_normal(&self) -> bool {
        self.entries.values().any(SubscriptionEntry::is_normal)
    }

    fn has_normal_for(&self, entity: EntityRef) -> bool {
        self.entries
            .values()
            .any(|e| e.is_normal() && e.targets(entity))
    }

    fn take_where(&mut self, pred: impl Fn(&SubscriptionEntry) -> bool) -> Vec<SubscriptionEntry> {
        let ids: Vec<String> = self
            .entries
            .values()
            .filter(|e| pred(e))
            .map(|e| e.set_id().to_string())
            .collect();
        ids.iter()
            .filter_map(|id| self.entries.shift_remove(id))
            .collect()
    }
}

/// Registry of every source's subscriptions.
pub struct SubscriptionRegistry {
    transport: Arc<dyn Transport>,
    sources: KeyedLockRegistry<SourceSubscriptions>,
    configs: Arc<CleanupConfigStore>,
}

impl SubscriptionRegistry {
    /// Create a registry with its own config store.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_configs(transport, Arc::new(CleanupConfigStore::new()))
    }

    /// Create a registry sharing `configs`.
    pub fn with_configs(transport: Arc<dyn Transport>, configs: Arc<CleanupConfigStore>) -> Self {
        Self {
            transport,
            sources: KeyedLockRegistry::with_prune(SourceSubscriptions::is_empty),
            configs,
        }
    }

    /// Underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Cleanup configuration store.
    pub fn configs(&self) -> &Arc<CleanupConfigStore> {
        &self.configs
    }

    /// Install `entry` for `source` and activate its transport registration.
    ///
    /// An existing entry with the same id is kept unless `overwrite` is set,
    /// in which case the new registration replaces it. Returns whether
    /// `entry` was installed. A transport failure leaves the registry as it
    /// was.
    #[instrument(skip(self, entry), fields(set_id = entry.set_id()))]
    pub fn create_subscription(
        &self,
        source: EntityRef,
        entry: SubscriptionEntry,
        overwrite: bool,
    ) -> Result<bool> {
        let key = source.key();
        self.sources.get_or_add_and_act(
            &key,
            SourceSubscriptions::default,
            |subs| -> Result<bool> {
                let exists = subs.entries.contains_key(entry.set_id());
                if exists && !overwrite {
                    debug!("subscription already present");
                    return Ok(false);
                }
                self.transport.subscribe(
                    &transport_key(source, entry.set_id()),
                    entry.filters(),
                    Arc::clone(entry.handler()),
                )?;
                debug!(replaced = exists, kind = ?entry.kind(), "subscription installed");
                let _ = subs.entries.insert(entry.set_id().to_string(), entry);
                Ok(true)
            },
        )
    }

    /// Remove one entry and deactivate it.
    ///
    /// A missing entry is an error unless `force` is set.
    #[instrument(skip(self))]
    pub fn remove_subscription(&self, source: EntityRef, set_id: &str, force: bool) -> Result<()> {
        let removed = self
            .sources
            .get_and_act(&source.key(), |subs| {
                subs.entries
                    .shift_remove(set_id)
                    .map(|entry| self.deactivate(source, &entry))
            })
            .flatten()
            .is_some();
        if removed || force {
            return Ok(());
        }
        Err(SubscriptionError::NotFound {
            owner: source,
            set_id: set_id.to_string(),
        })
    }

    /// Remove every entry of `source` and discard its cleanup config.
    ///
    /// Returns the number of entries removed. Calling it again is a no-op.
    #[instrument(skip(self))]
    pub fn remove_subscriptions(&self, source: EntityRef) -> usize {
        let removed = self
            .sources
            .action_and_remove(&source.key(), |subs| {
                let entries: Vec<SubscriptionEntry> =
                    subs.entries.drain(..).map(|(_, e)| e).collect();
                for entry in &entries {
                    self.deactivate(source, entry);
                }
                entries.len()
            })
            .unwrap_or(0);
        let _ = self.configs.remove(source);
        if removed > 0 {
            debug!(removed, "source subscriptions removed");
        }
        removed
    }

    /// Remove the entries of `source` that depend on `destination`.
    ///
    /// If no normal entry remains afterwards, the whole source is purged.
    /// Returns the number of entries removed.
    #[instrument(skip(self))]
    pub fn remove_subscriptions_for_destination(
        &self,
        source: EntityRef,
        destination: EntityRef,
    ) -> usize {
        let outcome = self.sources.get_and_act(&source.key(), |subs| {
            let mut removed = subs.take_where(|e| e.targets(destination));
            let purge = !subs.has_normal();
            if purge {
                removed.extend(subs.entries.drain(..).map(|(_, e)| e));
            }
            for entry in &removed {
                self.deactivate(source, entry);
            }
            (removed.len(), purge)
        });
        let Some((removed, purged)) = outcome else {
            return 0;
        };
        if purged {
            let _ = self.configs.remove(source);
        }
        debug!(removed, purged, "destination subscriptions removed");
        removed
    }

    /// Drop cleanup entries that no longer guard a normal subscription.
    ///
    /// For each destination of `source` with no normal entry targeting it,
    /// its cleanup entries are removed. If `source` has no normal entry left
    /// at all, every entry is removed. Returns the number of entries removed.
    #[instrument(skip(self))]
    pub fn try_remove_cleanup_only_subscriptions(&self, source: EntityRef) -> usize {
        let outcome = self.sources.get_and_act(&source.key(), |subs| {
            let destinations: IndexSet<EntityRef> = subs
                .entries
                .values()
                .filter_map(|e| e.destination().map(|d| d.entity))
                .collect();
            let mut removed = Vec::new();
            for dest in destinations {
                if !subs.has_normal_for(dest) {
                    removed.extend(subs.take_where(|e| !e.is_normal() && e.targets(dest)));
                }
            }
            let purge = !subs.has_normal();
            if purge {
                removed.extend(subs.entries.drain(..).map(|(_, e)| e));
            }
            for entry in &removed {
                self.deactivate(source, entry);
            }
            (removed.len(), purge)
        });
        let Some((removed, purged)) = outcome else {
            return 0;
        };
        if purged {
            let _ = self.configs.remove(source);
        }
        if removed > 0 {
            debug!(removed, purged, "cleanup-only subscriptions removed");
        }
        removed
    }

    /// Cache `value` under `data_key` for one entry unless it is unchanged.
    ///
    /// Returns `true` only when the value was absent or different. A missing
    /// entry yields `false`.
    pub fn replace_if_changed(
        &self,
        source: EntityRef,
        set_id: &str,
        data_key: &str,
        value: &str,
    ) -> bool {
        self.sources
            .get_and_act(&source.key(), |subs| {
                subs.entries
                    .get_mut(set_id)
                    .is_some_and(|e| e.replace_if_changed(data_key, value))
            })
            .unwrap_or(false)
    }

    /// Ordered snapshot of the entries of `source`.
    pub fn subscriptions(&self, source: EntityRef) -> Vec<SubscriptionInfo> {
        self.sources
            .get_and_act(&source.key(), |subs| {
                subs.entries.values().map(SubscriptionEntry::info).collect()
            })
            .unwrap_or_default()
    }

    /// Distinct destinations referenced by normal entries of `source`.
    pub fn destinations(&self, source: EntityRef) -> Vec<Destination> {
        self.sources
            .get_and_act(&source.key(), |subs| {
                let set: IndexSet<Destination> = subs
                    .entries
                    .values()
                    .filter(|e| e.is_normal())
                    .filter_map(SubscriptionEntry::destination)
                    .collect();
                set.into_iter().collect()
            })
            .unwrap_or_default()
    }

    /// Whether `source` has an entry with `set_id`.
    pub fn contains(&self, source: EntityRef, set_id: &str) -> bool {
        self.sources
            .get_and_act(&source.key(), |subs| subs.entries.contains_key(set_id))
            .unwrap_or(false)
    }

    /// Whether `source` has at least one normal entry.
    pub fn has_normal(&self, source: EntityRef) -> bool {
        self.sources
            .get_and_act(&source.key(), |subs| subs.has_normal())
            .unwrap_or(false)
    }

    /// Sources that currently own entries.
    pub fn sources(&self) -> Vec<EntityRef> {
        self.sources
            .keys()
            .iter()
            .filter_map(|k| k.parse().ok())
            .collect()
    }

    /// Number of sources that currently own entries.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    fn deactivate(&self, source: EntityRef, entry: &SubscriptionEntry) {
        if let Err(error) = self
            .transport
            .unsubscribe(&transport_key(source, entry.set_id()))
        {
            warn!(
                %source,
                set_id = entry.set_id(),
                %error,
                "failed to deactivate transport subscription"
            );
        }
    }
}
