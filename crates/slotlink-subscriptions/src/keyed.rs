//! Concurrent map with a per-key exclusive section.
//!
//! Structural concurrency (inserting and removing keys) is handled by a
//! [`DashMap`]; value mutation is serialized by a [`Mutex`] owned by each
//! key's slot. Callers never receive a reference that outlives an action
//! closure, so the per-key lock cannot be bypassed.
//!
//! A slot holding `None` is a tombstone: its key was removed while another
//! caller still held a clone of the slot. Actions on a tombstone behave as if
//! the key were absent, and `get_or_add_and_act` retries against the map.
//!
//! Lock order is always slot → shard. Shard guards are dropped before a slot
//! is locked.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

type Slot<V> = Arc<Mutex<Option<V>>>;
type PrunePredicate<V> = Box<dyn Fn(&V) -> bool + Send + Sync>;

/// Concurrent string-keyed map whose values are mutated under a per-key lock.
pub struct KeyedLockRegistry<V> {
    map: DashMap<String, Slot<V>>,
    prune: Option<PrunePredicate<V>>,
}

impl<V> KeyedLockRegistry<V> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            prune: None,
        }
    }

    /// Create a registry that drops a key as soon as an action leaves its
    /// value satisfying `prune`.
    pub fn with_prune(prune: impl Fn(&V) -> bool + Send + Sync + 'static) -> Self {
        Self {
            map: DashMap::new(),
            prune: Some(Box::new(prune)),
        }
    }

    /// Insert `value` under `key` unless the key already exists.
    ///
    /// Returns whether the value was inserted.
    pub fn add(&self, key: &str, value: V) -> bool {
        match self.map.entry(key.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                let _ = v.insert(Arc::new(Mutex::new(Some(value))));
                true
            }
        }
    }

    /// Run `f` on the value for `key`, exclusively with respect to other
    /// actions on the same key. Returns `None` if the key is absent.
    pub fn get_and_act<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let slot = self.slot(key)?;
        let mut guard = slot.lock();
        let value = guard.as_mut()?;
        let result = f(value);
        self.prune_locked(key, &slot, &mut guard);
        Some(result)
    }

    /// Run `f` on the value for `key`, inserting `default()` first if absent.
    pub fn get_or_add_and_act<R>(
        &self,
        key: &str,
        default: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> R,
    ) -> R {
        let mut default = Some(default);
        loop {
            let slot = Arc::clone(
                self.map
                    .entry(key.to_owned())
                    .or_insert_with(|| Arc::new(Mutex::new(None)))
                    .value(),
            );
            let mut guard = slot.lock();
            if guard.is_none() {
                // Either a fresh slot we must fill, or a tombstone left by a
                // concurrent removal.
                if !self.is_current(key, &slot) {
                    continue;
                }
                match default.take() {
                    Some(make) => *guard = Some(make()),
                    None => continue,
                }
            }
            if let Some(value) = guard.as_mut() {
                let result = f(value);
                self.prune_locked(key, &slot, &mut guard);
                return result;
            }
        }
    }

    /// Run `f` on the value for `key`, then remove the key atomically.
    ///
    /// Returns `None` if the key was absent, otherwise the action's result.
    pub fn action_and_remove<R>(&self, key: &str, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let slot = self.slot(key)?;
        let mut guard = slot.lock();
        let value = guard.as_mut()?;
        let result = f(value);
        let _ = self.map.remove_if(key, |_, cur| Arc::ptr_eq(cur, &slot));
        *guard = None;
        Some(result)
    }

    /// Remove `key` unconditionally. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        let Some(slot) = self.slot(key) else {
            return false;
        };
        let mut guard = slot.lock();
        let _ = self.map.remove_if(key, |_, cur| Arc::ptr_eq(cur, &slot));
        guard.take().is_some()
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot of the current keys.
    pub fn keys(&self) -> Vec<String> {
        self.map.iter().map(|r| r.key().clone()).collect()
    }

    fn slot(&self, key: &str) -> Option<Slot<V>> {
        self.map.get(key).map(|r| Arc::clone(r.value()))
    }

    fn is_current(&self, key: &str, slot: &Slot<V>) -> bool {
        self.map
            .get(key)
            .is_some_and(|cur| Arc::ptr_eq(cur.value(), slot))
    }

    fn prune_locked(&self, key: &str, slot: &Slot<V>, guard: &mut Option<V>) {
        let Some(prune) = &self.prune else {
            return;
        };
        if guard.as_ref().is_some_and(|v| prune(v)) {
            let _ = self.map.remove_if(key, |_, cur| Arc::ptr_eq(cur, slot));
            *guard = None;
        }
    }
}

impl<V> Default for KeyedLockRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}
