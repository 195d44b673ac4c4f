//! Cancellation handles for pending delayed cleanups.
//!
//! At most one live handle exists per operation id. Each handle carries a
//! generation number so that a finishing task only releases its own handle,
//! never a newer one stored under the same id after a cancel.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;

use crate::errors::CancellationError;

/// A stored cancellation token and the generation it was created with.
#[derive(Clone, Debug)]
pub struct CancellationHandle {
    id: String,
    generation: u64,
    token: CancellationToken,
}

impl CancellationHandle {
    /// Operation id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Map from operation id to its cancellation handle.
pub struct CancellationRegistry {
    handles: DashMap<String, (u64, CancellationToken)>,
    next_generation: AtomicU64,
}

impl CancellationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Create and store a handle for `id`.
    ///
    /// Fails if a handle for `id` already exists.
    pub fn create_and_store(&self, id: &str) -> Result<CancellationHandle, CancellationError> {
        match self.handles.entry(id.to_string()) {
            Entry::Occupied(_) => Err(CancellationError::AlreadyPending(id.to_string())),
            Entry::Vacant(v) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let token = CancellationToken::new();
                let _ = v.insert((generation, token.clone()));
                Ok(CancellationHandle {
                    id: id.to_string(),
                    generation,
                    token,
                })
            }
        }
    }

    /// Signal cancellation for `id` and discard its handle.
    ///
    /// Returns whether a handle was present.
    pub fn cancel(&self, id: &str) -> bool {
        match self.handles.remove(id) {
            Some((_, (_, token))) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Discard the handle for `id` without signalling it.
    pub fn remove(&self, id: &str) -> bool {
        self.handles.remove(id).is_some()
    }

    /// Discard `handle` if it is still the one stored under its id.
    pub fn release(&self, handle: &CancellationHandle) -> bool {
        self.handles
            .remove_if(&handle.id, |_, (generation, _)| *generation == handle.generation)
            .is_some()
    }

    /// Whether a handle exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.handles.contains_key(id)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether there are no live handles.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel and discard every handle.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.handles.iter().map(|r| r.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn create_twice_fails() {
        let reg = CancellationRegistry::new();
        let _h = reg.create_and_store("op").unwrap();
        assert_matches!(
            reg.create_and_store("op"),
            Err(CancellationError::AlreadyPending(id)) if id == "op"
        );
    }

    #[test]
    fn cancel_signals_and_frees_id() {
        let reg = CancellationRegistry::new();
        let h = reg.create_and_store("op").unwrap();
        assert!(reg.cancel("op"));
        assert!(h.is_cancelled());
        assert!(!reg.contains("op"));
        assert!(reg.create_and_store("op").is_ok());
    }

    #[test]
    fn cancel_unknown_is_false() {
        let reg = CancellationRegistry::new();
        assert!(!reg.cancel("nope"));
    }

    #[test]
    fn remove_does_not_signal() {
        let reg = CancellationRegistry::new();
        let h = reg.create_and_store("op").unwrap();
        assert!(reg.remove("op"));
        assert!(!h.is_cancelled());
        assert!(reg.is_empty());
    }

    #[test]
    fn release_ignores_newer_handle() {
        let reg = CancellationRegistry::new();
        let old = reg.create_and_store("op").unwrap();
        assert!(reg.cancel("op"));
        let new = reg.create_and_store("op").unwrap();

        assert!(!reg.release(&old));
        assert!(reg.contains("op"));
        assert!(reg.release(&new));
        assert!(!reg.contains("op"));
    }

    #[test]
    fn cancel_all_counts() {
        let reg = CancellationRegistry::new();
        let a = reg.create_and_store("a").unwrap();
        let b = reg.create_and_store("b").unwrap();
        assert_eq!(reg.cancel_all(), 2);
        assert!(a.is_cancelled() && b.is_cancelled());
        assert_eq!(reg.len(), 0);
    }
}
