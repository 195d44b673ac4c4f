//! Lifecycle-driven cleanup of source subscriptions.
//!
//! The monitor installs cleanup-kind watchers on entity state events:
//!
//! - one per source, keyed [`SOURCE_WATCHER_ID`]
//! - one per distinct destination referenced by a normal subscription
//!
//! | Observed | Reaction |
//! |---|---|
//! | source `Stopped` / `Deleted` | remove every subscription of the source after the configured delay |
//! | destination `Deleted` | remove the subscriptions depending on that destination after the configured delay |
//! | `Active` | cancel the pending removal for that watcher |
//!
//! A delayed removal sleeps in bounded slices, checking its cancellation
//! token between slices, then re-reads the watched entity's state. Removal
//! proceeds only if the triggering condition still holds, or if the state
//! cannot be read.

use std::sync::{Arc, Weak};
use std::time::Duration;

use slotlink_core::{EntityKind, EntityRef, EntityState, EventFilter, EventHandler, TransportEvent};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::cancellation::{CancellationHandle, CancellationRegistry};
use crate::entry::{Destination, SubscriptionEntry};
use crate::errors::Result;
use crate::registry::{SubscriptionRegistry, transport_key};

/// Entry id of a source's own lifecycle watcher.
pub const SOURCE_WATCHER_ID: &str = "lifecycle:self";

/// Entry id of the watcher a source keeps on `destination`.
pub fn destination_watcher_id(destination: EntityRef) -> String {
    format!("lifecycle:dest:{destination}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Condition {
    SourceStopped,
    SourceDeleted,
    DestinationDeleted,
}

impl Condition {
    fn holds(self, state: EntityState) -> bool {
        match self {
            Self::SourceStopped => matches!(state, EntityState::Stopped | EntityState::Deleted),
            Self::SourceDeleted | Self::DestinationDeleted => state == EntityState::Deleted,
        }
    }
}

#[derive(Clone, Debug)]
struct Trigger {
    source: EntityRef,
    watched: EntityRef,
    key: String,
    condition: Condition,
}

#[derive(Debug, PartialEq, Eq)]
enum SleepOutcome {
    Elapsed,
    Cancelled,
}

/// Sleep for `total` in steps of at most `slice`, stopping early once
/// `token` is cancelled.
async fn sliced_sleep(total: Duration, slice: Duration, token: &CancellationToken) -> SleepOutcome {
    let slice = slice.max(Duration::from_millis(1));
    let mut remaining = total;
    while !remaining.is_zero() {
        if token.is_cancelled() {
            return SleepOutcome::Cancelled;
        }
        let step = remaining.min(slice);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
    if token.is_cancelled() {
        SleepOutcome::Cancelled
    } else {
        SleepOutcome::Elapsed
    }
}

struct MonitorInner {
    registry: Arc<SubscriptionRegistry>,
    cancellations: Arc<CancellationRegistry>,
    slice: Duration,
    runtime: Handle,
}

impl MonitorInner {
    fn on_source_event(self: &Arc<Self>, source: EntityRef, event: &TransportEvent) {
        let TransportEvent::EntityState(change) = event else {
            return;
        };
        let key = transport_key(source, SOURCE_WATCHER_ID);
        let config = self.registry.configs().get(source);
        let (condition, delay) = match change.state {
            EntityState::Active => {
                if self.cancellations.cancel(&key) {
                    info!(%source, "source active again, pending cleanup cancelled");
                }
                return;
            }
            EntityState::Stopped => (Condition::SourceStopped, config.source_stopped()),
            EntityState::Deleted => (Condition::SourceDeleted, config.source_deleted()),
        };
        self.trigger(
            Trigger {
                source,
                watched: source,
                key,
                condition,
            },
            delay,
        );
    }

    fn on_destination_event(
        self: &Arc<Self>,
        source: EntityRef,
        destination: EntityRef,
        event: &TransportEvent,
    ) {
        let TransportEvent::EntityState(change) = event else {
            return;
        };
        let key = transport_key(source, &destination_watcher_id(destination));
        match change.state {
            EntityState::Active => {
                if self.cancellations.cancel(&key) {
                    info!(%source, %destination, "destination active again, pending cleanup cancelled");
                }
            }
            EntityState::Stopped => {
                trace!(%source, %destination, "destination stopped, nothing to do");
            }
            EntityState::Deleted => {
                let delay = self.registry.configs().get(source).destination_deleted();
                self.trigger(
                    Trigger {
                        source,
                        watched: destination,
                        key,
                        condition: Condition::DestinationDeleted,
                    },
                    delay,
                );
            }
        }
    }

    fn trigger(self: &Arc<Self>, trigger: Trigger, delay: Duration) {
        if delay.is_zero() {
            self.perform(&trigger);
            return;
        }
        let handle = match self.cancellations.create_and_store(&trigger.key) {
            Ok(handle) => handle,
            Err(error) => {
                debug!(key = %trigger.key, %error, "cleanup already pending, trigger ignored");
                return;
            }
        };
        debug!(
            source = %trigger.source,
            watched = %trigger.watched,
            condition = ?trigger.condition,
            delay_ms = delay.as_millis(),
            "cleanup scheduled"
        );
        let inner = Arc::clone(self);
        drop(
            self.runtime
                .spawn(async move { inner.delayed_removal(trigger, delay, handle).await }),
        );
    }

    async fn delayed_removal(
        self: Arc<Self>,
        trigger: Trigger,
        delay: Duration,
        handle: CancellationHandle,
    ) {
        if sliced_sleep(delay, self.slice, handle.token()).await == SleepOutcome::Cancelled {
            debug!(key = %trigger.key, "cleanup cancelled");
            let _ = self.cancellations.release(&handle);
            return;
        }

        let state = self
            .registry
            .transport()
            .read_entity_state(trigger.watched)
            .await;
        if handle.is_cancelled() {
            debug!(key = %trigger.key, "cleanup cancelled after state read");
        } else {
            match state {
                Ok(state) if trigger.condition.holds(state) => self.perform(&trigger),
                Ok(state) => {
                    info!(watched = %trigger.watched, %state, "entity state reverted, cleanup skipped");
                }
                Err(error) => {
                    warn!(
                        watched = %trigger.watched,
                        %error,
                        category = error.category(),
                        "state read failed, cleaning up anyway"
                    );
                    self.perform(&trigger);
                }
            }
        }
        let _ = self.cancellations.release(&handle);
    }

    fn perform(&self, trigger: &Trigger) {
        let removed = match trigger.condition {
            Condition::SourceStopped | Condition::SourceDeleted => {
                self.registry.remove_subscriptions(trigger.source)
            }
            Condition::DestinationDeleted => self
                .registry
                .remove_subscriptions_for_destination(trigger.source, trigger.watched),
        };
        info!(
            source = %trigger.source,
            watched = %trigger.watched,
            condition = ?trigger.condition,
            removed,
            "subscriptions cleaned up"
        );
    }
}

/// Watches entity lifecycles and reclaims subscriptions that outlived them.
#[derive(Clone)]
pub struct LifecycleMonitor {
    inner: Arc<MonitorInner>,
}

impl LifecycleMonitor {
    /// Create a monitor over `registry`.
    ///
    /// Delayed removals are spawned on the runtime current at construction.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        cancellations: Arc<CancellationRegistry>,
        slice: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                registry,
                cancellations,
                slice,
                runtime: Handle::current(),
            }),
        }
    }

    /// Watch the lifecycle of `source` itself.
    ///
    /// Returns whether a new watcher was installed.
    pub fn watch_source(&self, source: EntityRef, kind: EntityKind) -> Result<bool> {
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let handler: EventHandler = Arc::new(move |event: &TransportEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_source_event(source, event);
            }
        });
        let entry = SubscriptionEntry::cleanup(
            SOURCE_WATCHER_ID,
            vec![EventFilter::entity_state(kind, source)],
            handler,
        );
        self.inner.registry.create_subscription(source, entry, false)
    }

    /// Watch `destination` on behalf of `source`.
    ///
    /// Never installs a watcher of a source on itself.
    pub fn watch_destination(&self, source: EntityRef, destination: Destination) -> Result<bool> {
        if destination.entity == source {
            return Ok(false);
        }
        let dest = destination.entity;
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        let handler: EventHandler = Arc::new(move |event: &TransportEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_destination_event(source, dest, event);
            }
        });
        let entry = SubscriptionEntry::cleanup(
            destination_watcher_id(dest),
            vec![EventFilter::entity_state(destination.kind, dest)],
            handler,
        )
        .with_destination(destination);
        self.inner.registry.create_subscription(source, entry, false)
    }

    /// Watch every destination referenced by the normal subscriptions of
    /// `source`. Returns the number of watchers installed.
    pub fn watch_destinations(&self, source: EntityRef) -> Result<usize> {
        let mut installed = 0;
        for destination in self.inner.registry.destinations(source) {
            if self.watch_destination(source, destination)? {
                installed += 1;
            }
        }
        Ok(installed)
    }

    /// Create a normal subscription and install the watchers it needs.
    ///
    /// Returns whether `entry` was installed.
    pub fn register(
        &self,
        source: EntityRef,
        source_kind: EntityKind,
        entry: SubscriptionEntry,
        overwrite: bool,
    ) -> Result<bool> {
        let destination = entry.destination();
        if !self
            .inner
            .registry
            .create_subscription(source, entry, overwrite)?
        {
            return Ok(false);
        }
        let _ = self.watch_source(source, source_kind)?;
        if let Some(destination) = destination {
            let _ = self.watch_destination(source, destination)?;
        }
        Ok(true)
    }

    /// Remove one subscription and any watchers left without purpose.
    pub fn unregister(&self, source: EntityRef, set_id: &str) -> Result<()> {
        self.inner
            .registry
            .remove_subscription(source, set_id, false)?;
        let _ = self
            .inner
            .registry
            .try_remove_cleanup_only_subscriptions(source);
        Ok(())
    }

    /// Number of delayed removals currently pending.
    pub fn pending_cleanups(&self) -> usize {
        self.inner.cancellations.len()
    }

    /// The registry this monitor cleans up.
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.inner.registry
    }
}
