//! # slotlink-messaging
//!
//! Request/reply messaging between entities that can only exchange data by
//! writing each other's slots.
//!
//! - **Type resolution**: [`resolver::TypeCatalog`] maps wire type names to [`descriptor::TypeDescriptor`]s
//! - **Payloads**: [`payload::PayloadType`] and [`payload::Payload`]
//! - **Frames**: [`message::Message`], [`message::Envelope`], [`message::Frame`] and the JSON [`codec`]
//! - **Correlation**: [`waiter::ReplyWaiter`]
//! - **Messenger**: [`messenger::Messenger`] for send, send-and-wait, reply and listen
//!
//! ## Crate Position
//!
//! Depends on slotlink-core, slotlink-settings and slotlink-subscriptions.
//! Top of the workspace.

#![deny(unsafe_code)]

pub mod codec;
pub mod descriptor;
pub mod errors;
pub mod message;
pub mod messenger;
pub mod payload;
pub mod resolver;
pub mod waiter;

pub use descriptor::{NamedType, TypeDescriptor};
pub use errors::{MessagingError, ResolveError, Result};
pub use message::{Envelope, Frame, Message};
pub use messenger::{Inbox, Messenger, ReplyOutcome};
pub use payload::{Payload, PayloadType};
pub use resolver::{LOCAL_MODULE, MAX_NESTING, TypeCatalog};
pub use waiter::{Collected, ReplyWaiter};
