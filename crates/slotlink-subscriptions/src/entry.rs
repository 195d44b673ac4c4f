//! Subscription entries.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use slotlink_core::{EntityKind, EntityRef, EventFilter, EventHandler};

/// Why a subscription exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    /// Serves the caller's functional need.
    Normal,
    /// Observes lifecycle events so other subscriptions can be reclaimed.
    Cleanup,
}

/// Remote entity a subscription depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// The remote entity.
    pub entity: EntityRef,
    /// Its kind, used when watching its lifecycle.
    pub kind: EntityKind,
}

impl Destination {
    /// Create a destination.
    pub const fn new(entity: EntityRef, kind: EntityKind) -> Self {
        Self { entity, kind }
    }
}

/// One registered subscription of a source entity.
pub struct SubscriptionEntry {
    set_id: String,
    filters: Vec<EventFilter>,
    handler: EventHandler,
    destination: Option<Destination>,
    kind: SubscriptionKind,
    cached: HashMap<String, String>,
}

impl SubscriptionEntry {
    /// Create a normal subscription.
    pub fn new(set_id: impl Into<String>, filters: Vec<EventFilter>, handler: EventHandler) -> Self {
        Self {
            set_id: set_id.into(),
            filters,
            handler,
            destination: None,
            kind: SubscriptionKind::Normal,
            cached: HashMap::new(),
        }
    }

    /// Create a cleanup-kind subscription.
    pub fn cleanup(
        set_id: impl Into<String>,
        filters: Vec<EventFilter>,
        handler: EventHandler,
    ) -> Self {
        Self {
            kind: SubscriptionKind::Cleanup,
            ..Self::new(set_id, filters, handler)
        }
    }

    /// Attach the remote entity this subscription depends on.
    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Identifier, unique within the owning source.
    pub fn set_id(&self) -> &str {
        &self.set_id
    }

    /// Event filters.
    pub fn filters(&self) -> &[EventFilter] {
        &self.filters
    }

    /// Delivery handler.
    pub fn handler(&self) -> &EventHandler {
        &self.handler
    }

    /// Remote entity this subscription depends on, if any.
    pub fn destination(&self) -> Option<Destination> {
        self.destination
    }

    /// Subscription kind.
    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// Whether this is a normal subscription.
    pub fn is_normal(&self) -> bool {
        self.kind == SubscriptionKind::Normal
    }

    /// Whether this entry targets `entity`.
    pub fn targets(&self, entity: EntityRef) -> bool {
        self.destination.is_some_and(|d| d.entity == entity)
    }

    /// Store `value` under `key` unless it equals the cached value.
    ///
    /// Returns `true` when the cache changed.
    pub(crate) fn replace_if_changed(&mut self, key: &str, value: &str) -> bool {
        if self.cached.get(key).is_some_and(|cur| cur == value) {
            return false;
        }
        let _ = self.cached.insert(key.to_string(), value.to_string());
        true
    }

    /// Last cached value for `key`.
    pub fn cached(&self, key: &str) -> Option<&str> {
        self.cached.get(key).map(String::as_str)
    }

    /// Read-only summary.
    pub fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            set_id: self.set_id.clone(),
            kind: self.kind,
            destination: self.destination,
            filters: self.filters.clone(),
        }
    }
}

impl fmt::Debug for SubscriptionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionEntry")
            .field("set_id", &self.set_id)
            .field("kind", &self.kind)
            .field("destination", &self.destination)
            .field("filters", &self.filters)
            .field("cached_keys", &self.cached.len())
            .finish_non_exhaustive()
    }
}

/// Snapshot of a subscription entry, safe to hand out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    /// Identifier within the source.
    pub set_id: String,
    /// Entry kind.
    pub kind: SubscriptionKind,
    /// Remote dependency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
    /// Event filters.
    pub filters: Vec<EventFilter>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn noop() -> EventHandler {
        Arc::new(|_| {})
    }

    #[test]
    fn new_is_normal_without_destination() {
        let e = SubscriptionEntry::new("a", vec![], noop());
        assert!(e.is_normal());
        assert_eq!(e.destination(), None);
        assert_eq!(e.set_id(), "a");
    }

    #[test]
    fn cleanup_constructor_sets_kind() {
        let e = SubscriptionEntry::cleanup("c", vec![], noop());
        assert_eq!(e.kind(), SubscriptionKind::Cleanup);
    }

    #[test]
    fn targets_compares_entity_only() {
        let dest = EntityRef::new(1, 2);
        let e = SubscriptionEntry::new("a", vec![], noop())
            .with_destination(Destination::new(dest, EntityKind::Service));
        assert!(e.targets(dest));
        assert!(!e.targets(EntityRef::new(1, 3)));
    }

    #[test]
    fn replace_if_changed_suppresses_duplicates() {
        let mut e = SubscriptionEntry::new("a", vec![], noop());
        assert!(e.replace_if_changed("k", "1"));
        assert!(!e.replace_if_changed("k", "1"));
        assert!(e.replace_if_changed("k", "2"));
        assert_eq!(e.cached("k"), Some("2"));
        assert!(e.replace_if_changed("other", "1"));
    }

    #[test]
    fn debug_omits_handler() {
        let e = SubscriptionEntry::new("dbg", vec![], noop());
        let s = format!("{e:?}");
        assert!(s.contains("dbg"));
        assert!(!s.contains("handler"));
    }
}
