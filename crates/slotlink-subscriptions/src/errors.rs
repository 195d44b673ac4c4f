//! Subscription error types.

use slotlink_core::{EntityRef, TransportError};
use thiserror::Error;

/// Errors raised by the subscription registry.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Explicit removal of an entry that does not exist.
    #[error("subscription '{set_id}' not found for source {owner}")]
    NotFound {
        /// Owning source entity.
        owner: EntityRef,
        /// Requested entry id.
        set_id: String,
    },

    /// The transport refused the registration.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl SubscriptionError {
    /// Error category string for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "operation",
            Self::Transport(_) => "transport",
        }
    }
}

/// Errors raised by the cancellation registry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CancellationError {
    /// A handle already exists for this operation id.
    #[error("cancellation handle already pending for '{0}'")]
    AlreadyPending(String),
}

/// Result type for subscription operations.
pub type Result<T> = std::result::Result<T, SubscriptionError>;
