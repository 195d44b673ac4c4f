//! JSON wire format for frames.
//!
//! ```json
//! {"kind":"message","id":"…","source":{"systemId":1,"entityId":2},
//!  "returnAddress":{"systemId":1,"entityId":2,"slotId":7},
//!  "sentAt":"2026-01-01T00:00:00Z","payload":{"type":"List[Order]","body":[…]}}
//! ```
//!
//! Envelopes carry `"kind":"envelope"` and a `messages` array of the same
//! message objects (without `kind`). Payload type names are written in
//! their shortest resolvable form and resolved through the catalogue on
//! the way in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slotlink_core::{EntityRef, SlotAddress};
use uuid::Uuid;

use crate::errors::Result;
use crate::message::{Envelope, Frame, Message};
use crate::payload::Payload;
use crate::resolver::TypeCatalog;

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum WireFrame {
    Message(WireMessage),
    Envelope(WireEnvelope),
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    return_address: Option<SlotAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    received_at: Option<DateTime<Utc>>,
    payload: WirePayload,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    return_address: Option<SlotAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Serialize, Deserialize)]
struct WirePayload {
    #[serde(rename = "type")]
    type_name: String,
    body: Value,
}

fn message_to_wire(catalog: &TypeCatalog, m: &Message) -> WireMessage {
    WireMessage {
        id: m.id,
        source: m.source,
        return_address: m.return_address,
        sent_at: m.sent_at,
        received_at: m.received_at,
        payload: WirePayload {
            type_name: catalog.bare_name(m.payload.descriptor()),
            body: m.payload.body().clone(),
        },
    }
}

fn message_from_wire(catalog: &TypeCatalog, w: WireMessage) -> Result<Message> {
    let descriptor = catalog.resolve(&w.payload.type_name)?;
    Ok(Message {
        id: w.id,
        source: w.source,
        return_address: w.return_address,
        sent_at: w.sent_at,
        received_at: w.received_at,
        payload: Payload::from_parts(descriptor, w.payload.body),
    })
}

/// Serialize `frame` to its wire string.
pub fn encode(catalog: &TypeCatalog, frame: &Frame) -> Result<String> {
    let wire = match frame {
        Frame::Message(m) => WireFrame::Message(message_to_wire(catalog, m)),
        Frame::Envelope(e) => WireFrame::Envelope(WireEnvelope {
            id: e.id,
            source: e.source,
            return_address: e.return_address,
            sent_at: e.sent_at,
            received_at: e.received_at,
            messages: e
                .messages
                .iter()
                .map(|m| message_to_wire(catalog, m))
                .collect(),
        }),
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Parse a wire string, resolving every payload type through `catalog`.
///
/// Any unresolvable payload type fails the whole frame.
pub fn decode(catalog: &TypeCatalog, raw: &str) -> Result<Frame> {
    let frame = match serde_json::from_str::<WireFrame>(raw)? {
        WireFrame::Message(w) => Frame::Message(message_from_wire(catalog, w)?),
        WireFrame::Envelope(w) => Frame::Envelope(Envelope {
            id: w.id,
            source: w.source,
            return_address: w.return_address,
            sent_at: w.sent_at,
            received_at: w.received_at,
            messages: w
                .messages
                .into_iter()
                .map(|m| message_from_wire(catalog, m))
                .collect::<Result<Vec<_>>>()?,
        }),
    };
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{NamedType, TypeDescriptor};
    use crate::errors::{MessagingError, ResolveError};
    use crate::payload::PayloadType;
    use assert_matches::assert_matches;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        sku: String,
        qty: u32,
    }

    impl PayloadType for Order {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::Named(NamedType::new("shop", "acme.shop", "Order"))
        }
    }

    fn catalog() -> TypeCatalog {
        let mut c = TypeCatalog::new();
        let _ = c.register(NamedType::new("shop", "acme.shop", "Order"));
        c
    }

    #[test]
    fn message_wire_shape() {
        let c = catalog();
        let src = EntityRef::new(1, 2);
        let m = Message::from_value(&vec![Order { sku: "a".into(), qty: 1 }])
            .unwrap()
            .with_source(src)
            .with_return_address(src.slot(7));
        let json: Value = serde_json::from_str(&encode(&c, &Frame::Message(m)).unwrap()).unwrap();
        assert_eq!(json["kind"], "message");
        assert_eq!(json["source"], serde_json::json!({"systemId": 1, "entityId": 2}));
        assert_eq!(
            json["returnAddress"],
            serde_json::json!({"systemId": 1, "entityId": 2, "slotId": 7})
        );
        assert_eq!(json["payload"]["type"], "List[Order]");
        assert_eq!(json["payload"]["body"][0]["qty"], 1);
        assert!(json.get("sentAt").is_none());
    }

    #[test]
    fn envelope_survives_the_wire() {
        let c = catalog();
        let env = Envelope::new()
            .with_return_address(EntityRef::new(3, 3).slot(1))
            .with_message(Message::from_value(&Order { sku: "x".into(), qty: 2 }).unwrap())
            .with_message(Message::from_value(&42i64).unwrap());
        let frame = Frame::Envelope(env);
        let decoded = decode(&c, &encode(&c, &frame).unwrap()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(
            decoded.messages()[0].decode::<Order>().unwrap(),
            Order { sku: "x".into(), qty: 2 }
        );
    }

    #[test]
    fn unknown_payload_type_fails_frame() {
        let raw = r#"{"kind":"envelope","id":"0192d3c4-0000-7000-8000-000000000000",
            "messages":[{"id":"0192d3c4-0000-7000-8000-000000000001",
                         "payload":{"type":"Mystery","body":null}}]}"#;
        assert_matches!(
            decode(&catalog(), raw),
            Err(MessagingError::Resolve(ResolveError::Unresolved(n))) if n == "Mystery"
        );
    }

    #[test]
    fn deeply_nested_payload_type_fails_frame() {
        let depth = 200_000;
        let ty = format!("{}int{}", "List[".repeat(depth), "]".repeat(depth));
        let raw = format!(
            r#"{{"kind":"envelope","id":"0192d3c4-0000-7000-8000-000000000000",
                "messages":[{{"id":"0192d3c4-0000-7000-8000-000000000001",
                             "payload":{{"type":"{ty}","body":null}}}}]}}"#
        );
        assert_matches!(
            decode(&catalog(), &raw),
            Err(MessagingError::Resolve(ResolveError::Malformed { .. }))
        );
    }

    #[test]
    fn garbage_is_serialization_error() {
        assert_matches!(
            decode(&catalog(), "not json"),
            Err(MessagingError::Serialization(_))
        );
    }
}
