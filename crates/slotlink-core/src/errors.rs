//! Transport error types.

use thiserror::Error;

use crate::ids::{EntityRef, SlotAddress};

/// Opaque failures raised by a [`Transport`](crate::Transport) implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport could not be reached.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The addressed entity does not exist.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityRef),

    /// The addressed slot does not exist on its entity.
    #[error("slot not found: {0}")]
    SlotNotFound(SlotAddress),

    /// Any other collaborator failure.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Short category string for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::EntityNotFound(_) => "entity_not_found",
            Self::SlotNotFound(_) => "slot_not_found",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_not_found_display() {
        let err = TransportError::EntityNotFound(EntityRef::new(12, 400));
        assert_eq!(err.to_string(), "entity not found: 12/400");
    }

    #[test]
    fn slot_not_found_display() {
        let err = TransportError::SlotNotFound(SlotAddress::new(EntityRef::new(1, 2), 9000));
        assert_eq!(err.to_string(), "slot not found: 1/2:9000");
    }

    #[test]
    fn categories_are_distinct() {
        let all = [
            TransportError::Unavailable("x".into()).category(),
            TransportError::EntityNotFound(EntityRef::new(1, 1)).category(),
            TransportError::SlotNotFound(SlotAddress::new(EntityRef::new(1, 1), 1)).category(),
            TransportError::Other("x".into()).category(),
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
