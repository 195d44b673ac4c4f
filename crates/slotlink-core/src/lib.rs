//! # slotlink-core
//!
//! Shared vocabulary for the slotlink workspace.
//!
//! - **Identifiers**: [`ids::EntityRef`] and [`ids::SlotAddress`]
//! - **Events**: [`events::TransportEvent`], [`events::EventFilter`], entity states and kinds
//! - **Transport**: the [`transport::Transport`] trait the rest of the workspace talks to
//! - **Memory transport**: [`memory::MemoryTransport`], an in-process implementation
//! - **Errors**: [`errors::TransportError`]
//! - **Logging**: [`logging::init_from_settings`], [`logging::init_subscriber`]
//!
//! ## Crate Position
//!
//! Foundation crate. Depends only on slotlink-settings (for log output
//! settings). Depended on by slotlink-subscriptions and slotlink-messaging.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod memory;
pub mod transport;

pub use errors::TransportError;
pub use events::{
    EntityKind, EntityState, EntityStateEvent, EventFilter, EventHandler, SlotChangeEvent,
    TransportEvent,
};
pub use ids::{EntityRef, SlotAddress};
pub use memory::MemoryTransport;
pub use transport::Transport;
