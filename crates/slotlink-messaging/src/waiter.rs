//! Scoped reply correlation.
//!
//! A [`ReplyWaiter`] subscribes to a return slot before the request is
//! written, so a fast reply cannot slip past it. Each inbound frame on the
//! slot is decoded and every message whose id is still pending is handed
//! to the waiting task. Dropping the waiter removes its subscription.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use slotlink_core::{EntityRef, EventFilter, EventHandler, SlotAddress, TransportEvent};
use slotlink_subscriptions::{SubscriptionEntry, SubscriptionRegistry};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::codec;
use crate::errors::Result;
use crate::message::Message;
use crate::resolver::TypeCatalog;

const CACHE_KEY: &str = "value";

/// Replies gathered by [`ReplyWaiter::collect`].
#[derive(Clone, Debug, PartialEq)]
pub struct Collected {
    /// Replies in arrival order.
    pub replies: Vec<Message>,
    /// Whether every pending id was answered before the deadline.
    pub complete: bool,
}

/// Correlates replies on a return slot with pending request ids.
pub struct ReplyWaiter {
    registry: Weak<SubscriptionRegistry>,
    owner: EntityRef,
    set_id: String,
    expected: usize,
    rx: mpsc::Receiver<Message>,
}

impl ReplyWaiter {
    /// Subscribe to `return_address` and wait for replies to `ids`.
    ///
    /// At most `capacity` replies are buffered; extra matches are dropped
    /// with a warning.
    pub fn arm(
        registry: &Arc<SubscriptionRegistry>,
        catalog: Arc<TypeCatalog>,
        return_address: SlotAddress,
        ids: &[Uuid],
        capacity: usize,
    ) -> Result<Self> {
        let owner = return_address.entity;
        let set_id = format!("reply:{}", Uuid::now_v7());
        let pending: Arc<Mutex<HashSet<Uuid>>> = Arc::new(Mutex::new(ids.iter().copied().collect()));
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let weak = Arc::downgrade(registry);
        let handler_set_id = set_id.clone();
        let handler: EventHandler = Arc::new(move |event: &TransportEvent| {
            let TransportEvent::SlotChanged(change) = event else {
                return;
            };
            let Some(registry) = weak.upgrade() else {
                return;
            };
            if !registry.replace_if_changed(owner, &handler_set_id, CACHE_KEY, &change.value) {
                trace!(slot = %change.slot, "unchanged slot value ignored");
                return;
            }
            let mut frame = match codec::decode(&catalog, &change.value) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(slot = %change.slot, %error, "skipping undecodable reply frame");
                    return;
                }
            };
            frame.mark_received(Utc::now());
            for message in frame.into_messages() {
                if !pending.lock().remove(&message.id) {
                    continue;
                }
                let id = message.id;
                if tx.try_send(message).is_err() {
                    warn!(%id, "reply buffer full or closed, reply dropped");
                }
            }
        });

        let entry = SubscriptionEntry::new(
            set_id.clone(),
            vec![EventFilter::slot(return_address)],
            handler,
        );
        let _ = registry.create_subscription(owner, entry, false)?;
        debug!(%return_address, %set_id, pending = ids.len(), "reply waiter armed");

        Ok(Self {
            registry: Arc::downgrade(registry),
            owner,
            set_id,
            expected: ids.len(),
            rx,
        })
    }

    /// Subscription id of this waiter.
    pub fn set_id(&self) -> &str {
        &self.set_id
    }

    /// Wait for the next matching reply, or `None` once `timeout` passes.
    pub async fn next(&mut self, timeout: Duration) -> Option<Message> {
        timeout_at(Instant::now() + timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Wait until every pending id has a reply or `timeout` passes.
    pub async fn collect(&mut self, timeout: Duration) -> Collected {
        let deadline = Instant::now() + timeout;
        let mut replies = Vec::with_capacity(self.expected);
        while replies.len() < self.expected {
            match timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(message)) => replies.push(message),
                Ok(None) | Err(_) => break,
            }
        }
        let complete = replies.len() == self.expected;
        Collected { replies, complete }
    }
}

impl Drop for ReplyWaiter {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        if let Err(error) = registry.remove_subscription(self.owner, &self.set_id, true) {
            warn!(set_id = %self.set_id, %error, "failed to release reply waiter");
        }
        trace!(set_id = %self.set_id, "reply waiter released");
    }
}
