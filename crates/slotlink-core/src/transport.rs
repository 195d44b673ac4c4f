//! The slot transport abstraction.

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::events::{EntityState, EventFilter, EventHandler};
use crate::ids::{EntityRef, SlotAddress};

/// Capabilities the messaging core needs from the underlying system.
///
/// `subscribe` and `unsubscribe` are local registrations and complete
/// synchronously, so they may be called while a registry lock is held.
/// Reads and writes may cross the network and are async.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Register `handler` for events matching any of `filters`, keyed by `set_id`.
    ///
    /// Registering an existing `set_id` replaces the previous registration.
    fn subscribe(
        &self,
        set_id: &str,
        filters: &[EventFilter],
        handler: EventHandler,
    ) -> Result<(), TransportError>;

    /// Remove the registration keyed by `set_id`. Unknown ids are a no-op.
    fn unsubscribe(&self, set_id: &str) -> Result<(), TransportError>;

    /// Point-in-time state of an entity.
    async fn read_entity_state(&self, entity: EntityRef) -> Result<EntityState, TransportError>;

    /// Current value of a slot.
    async fn read_slot(&self, slot: SlotAddress) -> Result<String, TransportError>;

    /// Write a value to a slot. Delivery is not guaranteed.
    async fn write_slot(&self, slot: SlotAddress, value: &str) -> Result<(), TransportError>;
}
