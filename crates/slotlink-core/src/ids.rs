//! Entity and slot identifiers.
//!
//! Entities are addressed by a `(system_id, entity_id)` pair and render as
//! `"system/entity"`. That string form is also the key used by the
//! per-source registries. Slots extend an entity with a numeric slot id and
//! render as `"system/entity:slot"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reference to a remote managed entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    /// Hosting system identifier.
    pub system_id: u32,
    /// Entity identifier within the system.
    pub entity_id: u32,
}

impl EntityRef {
    /// Create a new entity reference.
    pub const fn new(system_id: u32, entity_id: u32) -> Self {
        Self {
            system_id,
            entity_id,
        }
    }

    /// Registry key for this entity.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Address a slot on this entity.
    pub const fn slot(self, slot_id: u32) -> SlotAddress {
        SlotAddress::new(self, slot_id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.system_id, self.entity_id)
    }
}

/// Error returned when parsing an [`EntityRef`] or [`SlotAddress`] fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid address '{0}'")]
pub struct ParseAddressError(pub String);

impl FromStr for EntityRef {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (system, entity) = s
            .split_once('/')
            .ok_or_else(|| ParseAddressError(s.to_string()))?;
        let system_id = system
            .trim()
            .parse()
            .map_err(|_| ParseAddressError(s.to_string()))?;
        let entity_id = entity
            .trim()
            .parse()
            .map_err(|_| ParseAddressError(s.to_string()))?;
        Ok(Self::new(system_id, entity_id))
    }
}

/// A readable/writable named slot on an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAddress {
    /// Owning entity.
    #[serde(flatten)]
    pub entity: EntityRef,
    /// Slot identifier on the entity.
    pub slot_id: u32,
}

impl SlotAddress {
    /// Create a new slot address.
    pub const fn new(entity: EntityRef, slot_id: u32) -> Self {
        Self { entity, slot_id }
    }
}

impl fmt::Display for SlotAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity, self.slot_id)
    }
}

impl FromStr for SlotAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (entity, slot) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseAddressError(s.to_string()))?;
        let entity = entity.parse().map_err(|_| ParseAddressError(s.to_string()))?;
        let slot_id = slot
            .trim()
            .parse()
            .map_err(|_| ParseAddressError(s.to_string()))?;
        Ok(Self::new(entity, slot_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_display_and_key_match() {
        let e = EntityRef::new(127, 3001);
        assert_eq!(e.to_string(), "127/3001");
        assert_eq!(e.key(), "127/3001");
    }

    #[test]
    fn entity_parse() {
        assert_eq!("5/6".parse::<EntityRef>().unwrap(), EntityRef::new(5, 6));
        assert_eq!(" 5/ 6".parse::<EntityRef>().unwrap(), EntityRef::new(5, 6));
    }

    #[test]
    fn entity_parse_rejects_garbage() {
        assert!("5".parse::<EntityRef>().is_err());
        assert!("a/b".parse::<EntityRef>().is_err());
        assert!("5/-1".parse::<EntityRef>().is_err());
    }

    #[test]
    fn slot_display_and_parse() {
        let slot = EntityRef::new(1, 2).slot(9000);
        assert_eq!(slot.to_string(), "1/2:9000");
        assert_eq!("1/2:9000".parse::<SlotAddress>().unwrap(), slot);
    }

    #[test]
    fn slot_parse_rejects_missing_slot() {
        assert!("1/2".parse::<SlotAddress>().is_err());
        assert!("1/2:x".parse::<SlotAddress>().is_err());
    }

    #[test]
    fn slot_serializes_flat_camel_case() {
        let slot = EntityRef::new(1, 2).slot(3);
        let json = serde_json::to_value(slot).unwrap();
        assert_eq!(json, serde_json::json!({"systemId": 1, "entityId": 2, "slotId": 3}));
    }
}
