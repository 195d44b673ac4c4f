//! Request/reply messaging over slots.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use slotlink_core::{
    EntityRef, EntityState, EventFilter, EventHandler, SlotAddress, Transport, TransportEvent,
};
use slotlink_settings::MessagingSettings;
use slotlink_subscriptions::{SubscriptionEntry, SubscriptionHub, SubscriptionRegistry};
use tracing::{debug, instrument, warn};

use crate::codec;
use crate::errors::{MessagingError, Result};
use crate::message::{Frame, Message};
use crate::resolver::TypeCatalog;
use crate::waiter::{Collected, ReplyWaiter};

const INBOX_CACHE_KEY: &str = "value";

/// Result of a timed request.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplyOutcome {
    /// The first matching reply.
    Reply(Message),
    /// No reply arrived in time.
    TimedOut,
}

impl ReplyOutcome {
    /// The reply, if one arrived.
    pub fn into_reply(self) -> Option<Message> {
        match self {
            Self::Reply(m) => Some(m),
            Self::TimedOut => None,
        }
    }
}

/// Sends frames to slots and correlates replies.
#[derive(Clone)]
pub struct Messenger {
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    catalog: Arc<TypeCatalog>,
    settings: MessagingSettings,
}

impl Messenger {
    /// Create a messenger using the global messaging settings.
    pub fn new(hub: &SubscriptionHub, catalog: TypeCatalog) -> Self {
        let settings = slotlink_settings::get_settings().messaging.clone();
        Self::with_settings(hub, catalog, settings)
    }

    /// Create a messenger with explicit settings.
    pub fn with_settings(
        hub: &SubscriptionHub,
        catalog: TypeCatalog,
        settings: MessagingSettings,
    ) -> Self {
        Self {
            transport: Arc::clone(hub.transport()),
            registry: Arc::clone(hub.registry()),
            catalog: Arc::new(catalog),
            settings,
        }
    }

    /// The payload type catalogue.
    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Serialize a frame to its wire form.
    pub fn encode(&self, frame: &Frame) -> Result<String> {
        codec::encode(&self.catalog, frame)
    }

    /// Parse a wire string into a frame.
    pub fn decode(&self, raw: &str) -> Result<Frame> {
        codec::decode(&self.catalog, raw)
    }

    /// Write `frame` to `destination`.
    ///
    /// Fails if the destination entity is not active.
    #[instrument(skip_all, fields(destination = %destination))]
    pub async fn send(&self, frame: impl Into<Frame>, destination: SlotAddress) -> Result<()> {
        let mut frame = frame.into();
        self.ensure_active(destination.entity).await?;
        self.write(&mut frame, destination).await
    }

    /// Send `frame` and wait for the first reply to any of its messages.
    ///
    /// `timeout` defaults to the configured request timeout.
    #[instrument(skip_all, fields(destination = %destination))]
    pub async fn send_and_wait(
        &self,
        frame: impl Into<Frame>,
        destination: SlotAddress,
        timeout: Option<Duration>,
    ) -> Result<ReplyOutcome> {
        let mut frame = frame.into();
        let mut waiter = self.arm(&frame)?;
        self.ensure_active(destination.entity).await?;
        self.write(&mut frame, destination).await?;

        let timeout = timeout.unwrap_or_else(|| self.settings.default_timeout());
        let outcome = match waiter.next(timeout).await {
            Some(reply) => ReplyOutcome::Reply(reply),
            None => {
                debug!(timeout_ms = timeout.as_millis(), "request timed out");
                ReplyOutcome::TimedOut
            }
        };
        Ok(outcome)
    }

    /// Send `frame` and wait until every message has a reply or the timeout
    /// passes.
    #[instrument(skip_all, fields(destination = %destination))]
    pub async fn send_and_collect(
        &self,
        frame: impl Into<Frame>,
        destination: SlotAddress,
        timeout: Option<Duration>,
    ) -> Result<Collected> {
        let mut frame = frame.into();
        let mut waiter = self.arm(&frame)?;
        self.ensure_active(destination.entity).await?;
        self.write(&mut frame, destination).await?;

        let timeout = timeout.unwrap_or_else(|| self.settings.default_timeout());
        let collected = waiter.collect(timeout).await;
        if !collected.complete {
            debug!(
                received = collected.replies.len(),
                "collection ended before every reply arrived"
            );
        }
        Ok(collected)
    }

    /// Answer `original` with `reply`, reusing its correlation id.
    #[instrument(skip_all, fields(correlation_id = %original.id))]
    pub async fn reply(&self, original: &Message, reply: Message) -> Result<()> {
        let target = original.return_address.ok_or_else(|| {
            MessagingError::Configuration(format!(
                "message {} has no return address",
                original.id
            ))
        })?;
        self.send(reply.with_id(original.id), target).await
    }

    /// Deliver every message written to `slot` to `handler`.
    ///
    /// The subscription is owned by `slot`'s entity and lives until the
    /// returned [`Inbox`] is dropped. Frames that fail to decode are logged
    /// and skipped.
    pub fn listen(
        &self,
        slot: SlotAddress,
        handler: impl Fn(Message) + Send + Sync + 'static,
    ) -> Result<Inbox> {
        let owner = slot.entity;
        let set_id = format!("inbox:{}", slot.slot_id);
        let weak = Arc::downgrade(&self.registry);
        let catalog = Arc::clone(&self.catalog);
        let handler_set_id = set_id.clone();
        let on_event: EventHandler = Arc::new(move |event: &TransportEvent| {
            let TransportEvent::SlotChanged(change) = event else {
                return;
            };
            let Some(registry) = weak.upgrade() else {
                return;
            };
            if !registry.replace_if_changed(owner, &handler_set_id, INBOX_CACHE_KEY, &change.value)
            {
                return;
            }
            match codec::decode(&catalog, &change.value) {
                Ok(mut frame) => {
                    frame.mark_received(Utc::now());
                    for message in frame.into_messages() {
                        handler(message);
                    }
                }
                Err(error) => {
                    warn!(
                        slot = %change.slot,
                        %error,
                        category = error.category(),
                        "skipping inbound frame"
                    );
                }
            }
        });

        let entry = SubscriptionEntry::new(set_id.clone(), vec![EventFilter::slot(slot)], on_event);
        if !self.registry.create_subscription(owner, entry, false)? {
            return Err(MessagingError::Operation(format!(
                "already listening on {slot}"
            )));
        }
        debug!(%slot, "inbox opened");
        Ok(Inbox {
            registry: Arc::downgrade(&self.registry),
            owner,
            set_id,
        })
    }

    fn arm(&self, frame: &Frame) -> Result<ReplyWaiter> {
        let return_address = frame.return_address().ok_or_else(|| {
            MessagingError::Configuration(format!(
                "frame {} has no return address",
                frame.id()
            ))
        })?;
        let ids = frame.correlation_ids();
        if ids.is_empty() {
            return Err(MessagingError::Configuration(format!(
                "frame {} carries no messages",
                frame.id()
            )));
        }
        ReplyWaiter::arm(
            &self.registry,
            Arc::clone(&self.catalog),
            return_address,
            &ids,
            self.settings.max_pending_replies,
        )
    }

    async fn ensure_active(&self, entity: EntityRef) -> Result<()> {
        let state = self.transport.read_entity_state(entity).await?;
        if state != EntityState::Active {
            return Err(MessagingError::Operation(format!(
                "destination {entity} is {state}"
            )));
        }
        Ok(())
    }

    async fn write(&self, frame: &mut Frame, destination: SlotAddress) -> Result<()> {
        if self.settings.bubble_down {
            frame.bubble_down();
        }
        frame.mark_sent(Utc::now());
        let raw = self.encode(frame)?;
        self.transport.write_slot(destination, &raw).await?;
        debug!(%destination, bytes = raw.len(), "frame written");
        Ok(())
    }
}

/// Subscription guard returned by [`Messenger::listen`].
pub struct Inbox {
    registry: Weak<SubscriptionRegistry>,
    owner: EntityRef,
    set_id: String,
}

impl fmt::Debug for Inbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbox")
            .field("owner", &self.owner)
            .field("set_id", &self.set_id)
            .finish_non_exhaustive()
    }
}

impl Inbox {
    /// Subscription id of this inbox.
    pub fn set_id(&self) -> &str {
        &self.set_id
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        if let Err(error) = registry.remove_subscription(self.owner, &self.set_id, true) {
            warn!(set_id = %self.set_id, %error, "failed to close inbox");
        }
    }
}
