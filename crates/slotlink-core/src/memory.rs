//! In-process [`Transport`] implementation.
//!
//! Holds a table of entities (kind, state, slots) and a table of event
//! registrations. State changes and slot writes deliver events to matching
//! registrations synchronously, after all internal locks are released, so a
//! handler may call back into the transport.
//!
//! Failure injection (`fail_state_reads`, `fail_subscribes`, `drop_writes`)
//! lets tests exercise the fail-safe paths of the layers above.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::errors::TransportError;
use crate::events::{
    EntityKind, EntityState, EntityStateEvent, EventFilter, EventHandler, SlotChangeEvent,
    TransportEvent,
};
use crate::ids::{EntityRef, SlotAddress};
use crate::transport::Transport;

struct MemoryEntity {
    kind: EntityKind,
    state: EntityState,
    slots: HashMap<u32, String>,
}

struct Registration {
    filters: Vec<EventFilter>,
    handler: EventHandler,
}

/// In-memory transport with synchronous event delivery.
pub struct MemoryTransport {
    entities: RwLock<HashMap<EntityRef, MemoryEntity>>,
    registrations: RwLock<HashMap<String, Registration>>,
    fail_state_reads: AtomicBool,
    fail_subscribes: AtomicBool,
    drop_writes: AtomicBool,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    write_calls: AtomicUsize,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            registrations: RwLock::new(HashMap::new()),
            fail_state_reads: AtomicBool::new(false),
            fail_subscribes: AtomicBool::new(false),
            drop_writes: AtomicBool::new(false),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
        }
    }

    /// Add an entity (or reset an existing one) without emitting an event.
    pub fn add_entity(&self, entity: EntityRef, kind: EntityKind, state: EntityState) {
        let _ = self.entities.write().insert(
            entity,
            MemoryEntity {
                kind,
                state,
                slots: HashMap::new(),
            },
        );
    }

    /// Change an entity's state and deliver the state event.
    pub fn set_state(&self, entity: EntityRef, state: EntityState) -> Result<(), TransportError> {
        let kind = {
            let mut entities = self.entities.write();
            let e = entities
                .get_mut(&entity)
                .ok_or(TransportError::EntityNotFound(entity))?;
            e.state = state;
            e.kind
        };
        debug!(%entity, %state, "entity state changed");
        self.deliver(&TransportEvent::EntityState(EntityStateEvent {
            kind,
            entity,
            state,
        }));
        Ok(())
    }

    /// Store a slot value as if written remotely and deliver the change event.
    ///
    /// Unlike [`Transport::write_slot`], this ignores `drop_writes` and the
    /// entity state.
    pub fn set_slot(&self, slot: SlotAddress, value: &str) -> Result<(), TransportError> {
        self.store(slot, value)?;
        self.deliver(&TransportEvent::SlotChanged(SlotChangeEvent {
            slot,
            value: value.to_string(),
        }));
        Ok(())
    }

    /// Make every `read_entity_state` call fail with `Unavailable`.
    pub fn fail_state_reads(&self, fail: bool) {
        self.fail_state_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every `subscribe` call fail with `Unavailable`.
    pub fn fail_subscribes(&self, fail: bool) {
        self.fail_subscribes.store(fail, Ordering::SeqCst);
    }

    /// Silently discard every `write_slot` call.
    pub fn drop_writes(&self, drop: bool) {
        self.drop_writes.store(drop, Ordering::SeqCst);
    }

    /// Whether a registration exists for `set_id`.
    pub fn is_subscribed(&self, set_id: &str) -> bool {
        self.registrations.read().contains_key(set_id)
    }

    /// Number of live registrations.
    pub fn registration_count(&self) -> usize {
        self.registrations.read().len()
    }

    /// Total `subscribe` calls so far.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Total `unsubscribe` calls so far.
    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    /// Total `write_slot` calls so far, including dropped ones.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn store(&self, slot: SlotAddress, value: &str) -> Result<(), TransportError> {
        let mut entities = self.entities.write();
        let e = entities
            .get_mut(&slot.entity)
            .ok_or(TransportError::EntityNotFound(slot.entity))?;
        let _ = e.slots.insert(slot.slot_id, value.to_string());
        Ok(())
    }

    fn deliver(&self, event: &TransportEvent) {
        let handlers: Vec<EventHandler> = self
            .registrations
            .read()
            .values()
            .filter(|r| r.filters.iter().any(|f| f.matches(event)))
            .map(|r| r.handler.clone())
            .collect();
        trace!(entity = %event.entity(), recipients = handlers.len(), "delivering event");
        for handler in handlers {
            handler(event);
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn subscribe(
        &self,
        set_id: &str,
        filters: &[EventFilter],
        handler: EventHandler,
    ) -> Result<(), TransportError> {
        let _ = self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribes.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("subscriptions disabled".into()));
        }
        let _ = self.registrations.write().insert(
            set_id.to_string(),
            Registration {
                filters: filters.to_vec(),
                handler,
            },
        );
        Ok(())
    }

    fn unsubscribe(&self, set_id: &str) -> Result<(), TransportError> {
        let _ = self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.registrations.write().remove(set_id);
        Ok(())
    }

    async fn read_entity_state(&self, entity: EntityRef) -> Result<EntityState, TransportError> {
        if self.fail_state_reads.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("state reads disabled".into()));
        }
        self.entities
            .read()
            .get(&entity)
            .map(|e| e.state)
            .ok_or(TransportError::EntityNotFound(entity))
    }

    async fn read_slot(&self, slot: SlotAddress) -> Result<String, TransportError> {
        let entities = self.entities.read();
        let e = entities
            .get(&slot.entity)
            .ok_or(TransportError::EntityNotFound(slot.entity))?;
        e.slots
            .get(&slot.slot_id)
            .cloned()
            .ok_or(TransportError::SlotNotFound(slot))
    }

    async fn write_slot(&self, slot: SlotAddress, value: &str) -> Result<(), TransportError> {
        let _ = self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.drop_writes.load(Ordering::SeqCst) {
            debug!(%slot, "write dropped");
            return Ok(());
        }
        self.set_slot(slot, value)
    }
}
