//! Messaging error types.

use slotlink_core::TransportError;
use slotlink_subscriptions::SubscriptionError;
use thiserror::Error;

/// Failure to map a bare type name onto a known type.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// More than one catalogue entry shares the simple name.
    #[error("type name '{name}' is ambiguous: {}", .candidates.join(", "))]
    Ambiguous {
        /// The simple name.
        name: String,
        /// Fully-qualified names of every match.
        candidates: Vec<String>,
    },

    /// Nothing matched after every resolution stage.
    #[error("type name '{0}' could not be resolved")]
    Unresolved(String),

    /// The name is not well formed.
    #[error("malformed type name '{name}': {reason}")]
    Malformed {
        /// The offending name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Errors surfaced by the messenger.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The call cannot be made as configured (e.g. no return address).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The operation is not possible in the current state.
    #[error("operation error: {0}")]
    Operation(String),

    /// A payload type could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A subscription could not be installed.
    #[error("subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    /// Wire encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A payload was decoded as the wrong type.
    #[error("payload is '{found}', expected '{expected}'")]
    PayloadMismatch {
        /// Requested type.
        expected: String,
        /// Actual payload type.
        found: String,
    },
}

impl MessagingError {
    /// Error category string for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Operation(_) => "operation",
            Self::Resolve(_) => "resolve",
            Self::Transport(_) => "transport",
            Self::Subscription(_) => "subscription",
            Self::Serialization(_) => "serialization",
            Self::PayloadMismatch { .. } => "payload",
        }
    }
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_lists_candidates() {
        let err = ResolveError::Ambiguous {
            name: "Order".into(),
            candidates: vec!["a.Order".into(), "b.Order".into()],
        };
        assert_eq!(
            err.to_string(),
            "type name 'Order' is ambiguous: a.Order, b.Order"
        );
    }

    #[test]
    fn resolve_error_is_transparent() {
        let err: MessagingError = ResolveError::Unresolved("X".into()).into();
        assert_eq!(err.to_string(), "type name 'X' could not be resolved");
        assert_eq!(err.category(), "resolve");
    }
}
