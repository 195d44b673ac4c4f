//! # slotlink-subscriptions
//!
//! Per-source subscription bookkeeping with lifecycle-driven cleanup.
//!
//! - **Keyed locks**: [`keyed::KeyedLockRegistry`], a concurrent map with a per-key exclusive section
//! - **Registry**: [`registry::SubscriptionRegistry`], subscriptions per source entity
//! - **Cleanup delays**: [`cleanup_config::CleanupConfigStore`]
//! - **Cancellation**: [`cancellation::CancellationRegistry`] for pending delayed removals
//! - **Lifecycle**: [`lifecycle::LifecycleMonitor`] reacts to entity state changes
//! - **Hub**: [`hub::SubscriptionHub`] wires all of the above to one transport
//!
//! ## Crate Position
//!
//! Depends on slotlink-core and slotlink-settings.
//! Depended on by slotlink-messaging.

#![deny(unsafe_code)]

pub mod cancellation;
pub mod cleanup_config;
pub mod entry;
pub mod errors;
pub mod hub;
pub mod keyed;
pub mod lifecycle;
pub mod registry;

pub use cancellation::{CancellationHandle, CancellationRegistry};
pub use cleanup_config::{CleanupConfig, CleanupConfigStore};
pub use entry::{Destination, SubscriptionEntry, SubscriptionInfo, SubscriptionKind};
pub use errors::{CancellationError, Result, SubscriptionError};
pub use hub::SubscriptionHub;
pub use keyed::KeyedLockRegistry;
pub use lifecycle::{LifecycleMonitor, SOURCE_WATCHER_ID, destination_watcher_id};
pub use registry::{SubscriptionRegistry, transport_key};
