//! Transport events and event filters.
//!
//! The transport delivers two kinds of events to subscribers:
//!
//! - [`EntityStateEvent`]: an entity changed lifecycle state
//! - [`SlotChangeEvent`]: a slot received a new value
//!
//! A subscription is described by a set of [`EventFilter`]s; an event is
//! delivered when any filter in the set matches it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ids::{EntityRef, SlotAddress};

/// Kind of managed entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A monitored element.
    Element,
    /// A service grouping elements.
    Service,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element => write!(f, "element"),
            Self::Service => write!(f, "service"),
        }
    }
}

/// Lifecycle state of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    /// Running and reachable.
    Active,
    /// Stopped; may come back.
    Stopped,
    /// Removed from its system.
    Deleted,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Stopped => write!(f, "stopped"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// An entity changed state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStateEvent {
    /// Entity kind.
    pub kind: EntityKind,
    /// The entity that changed.
    pub entity: EntityRef,
    /// Its new state.
    pub state: EntityState,
}

/// A slot received a new value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotChangeEvent {
    /// The slot that changed.
    pub slot: SlotAddress,
    /// Its new value.
    pub value: String,
}

/// An event delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportEvent {
    /// Entity lifecycle change.
    EntityState(EntityStateEvent),
    /// Slot value change.
    SlotChanged(SlotChangeEvent),
}

impl TransportEvent {
    /// The entity this event concerns.
    pub fn entity(&self) -> EntityRef {
        match self {
            Self::EntityState(e) => e.entity,
            Self::SlotChanged(e) => e.slot.entity,
        }
    }
}

/// Selects which events a subscription receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "on", rename_all = "camelCase")]
pub enum EventFilter {
    /// State changes of one entity.
    EntityState {
        /// Expected entity kind.
        kind: EntityKind,
        /// Watched entity.
        entity: EntityRef,
    },
    /// Value changes of one slot.
    Slot {
        /// Watched slot.
        slot: SlotAddress,
    },
}

impl EventFilter {
    /// Filter on state changes of an entity.
    pub const fn entity_state(kind: EntityKind, entity: EntityRef) -> Self {
        Self::EntityState { kind, entity }
    }

    /// Filter on value changes of a slot.
    pub const fn slot(slot: SlotAddress) -> Self {
        Self::Slot { slot }
    }

    /// Whether `event` passes this filter.
    pub fn matches(&self, event: &TransportEvent) -> bool {
        match (self, event) {
            (Self::EntityState { kind, entity }, TransportEvent::EntityState(e)) => {
                *kind == e.kind && *entity == e.entity
            }
            (Self::Slot { slot }, TransportEvent::SlotChanged(e)) => *slot == e.slot,
            _ => false,
        }
    }
}

/// Callback invoked by the transport for each matching event.
///
/// Handlers run on the transport's delivery context and must not block.
pub type EventHandler = Arc<dyn Fn(&TransportEvent) + Send + Sync>;
