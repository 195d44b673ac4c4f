//! Typed message payloads.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::descriptor::TypeDescriptor;
use crate::errors::{MessagingError, Result};

/// A Rust type that can travel as a message payload.
///
/// Implement this for application message types, returning the same
/// descriptor that is registered in the [`TypeCatalog`](crate::TypeCatalog)
/// on both ends of the link.
pub trait PayloadType: Serialize + DeserializeOwned {
    /// The payload's wire type.
    fn descriptor() -> TypeDescriptor;
}

macro_rules! builtin_payload {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl PayloadType for $ty {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::builtin($name)
                }
            }
        )*
    };
}

builtin_payload! {
    String => "string",
    bool => "bool",
    i32 => "int",
    i64 => "long",
    f64 => "double",
    Uuid => "guid",
    DateTime<Utc> => "datetime",
}

impl<T: PayloadType> PayloadType for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::builtin_generic("List", vec![T::descriptor()])
    }
}

impl<T: PayloadType + Eq + Hash> PayloadType for HashSet<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::builtin_generic("HashSet", vec![T::descriptor()])
    }
}

impl<V: PayloadType> PayloadType for HashMap<String, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::builtin_generic(
            "Dictionary",
            vec![TypeDescriptor::builtin("string"), V::descriptor()],
        )
    }
}

/// A payload body tagged with its resolved type.
#[derive(Clone, Debug, PartialEq)]
pub struct Payload {
    descriptor: TypeDescriptor,
    body: Value,
}

impl Payload {
    /// Serialize `value` as a payload.
    pub fn new<T: PayloadType>(value: &T) -> Result<Self> {
        Ok(Self {
            descriptor: T::descriptor(),
            body: serde_json::to_value(value)?,
        })
    }

    /// Build a payload from already-typed parts.
    pub fn from_parts(descriptor: TypeDescriptor, body: Value) -> Self {
        Self { descriptor, body }
    }

    /// The payload type.
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// The raw JSON body.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Whether the payload is of type `T`.
    pub fn is<T: PayloadType>(&self) -> bool {
        self.descriptor == T::descriptor()
    }

    /// Deserialize the body as `T`.
    pub fn decode<T: PayloadType>(&self) -> Result<T> {
        let expected = T::descriptor();
        if self.descriptor != expected {
            return Err(MessagingError::PayloadMismatch {
                expected: expected.to_string(),
                found: self.descriptor.to_string(),
            });
        }
        Ok(serde_json::from_value(self.body.clone())?)
    }
}
