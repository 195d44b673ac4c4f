//! Messages, envelopes and the frames that carry them.

use chrono::{DateTime, Utc};
use slotlink_core::{EntityRef, SlotAddress};
use uuid::Uuid;

use crate::errors::Result;
use crate::payload::{Payload, PayloadType};

/// One typed payload with its correlation id and routing hints.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Correlation id. A reply reuses the id of the request it answers.
    pub id: Uuid,
    /// Originating entity.
    pub source: Option<EntityRef>,
    /// Slot that replies should be written to.
    pub return_address: Option<SlotAddress>,
    /// When the message was written.
    pub sent_at: Option<DateTime<Utc>>,
    /// When the message was decoded on the receiving side.
    pub received_at: Option<DateTime<Utc>>,
    /// The payload.
    pub payload: Payload,
}

impl Message {
    /// A message with a fresh correlation id.
    pub fn new(payload: Payload) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: None,
            return_address: None,
            sent_at: None,
            received_at: None,
            payload,
        }
    }

    /// A message carrying `value`.
    pub fn from_value<T: PayloadType>(value: &T) -> Result<Self> {
        Ok(Self::new(Payload::new(value)?))
    }

    /// Set the correlation id.
    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Set the originating entity.
    #[must_use]
    pub fn with_source(mut self, source: EntityRef) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the reply slot.
    #[must_use]
    pub fn with_return_address(mut self, address: SlotAddress) -> Self {
        self.return_address = Some(address);
        self
    }

    /// Decode the payload as `T`.
    pub fn decode<T: PayloadType>(&self) -> Result<T> {
        self.payload.decode()
    }
}

/// An ordered batch of messages sharing one source and return address.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// The envelope's own id.
    pub id: Uuid,
    /// Originating entity.
    pub source: Option<EntityRef>,
    /// Slot that replies should be written to.
    pub return_address: Option<SlotAddress>,
    /// When the envelope was written.
    pub sent_at: Option<DateTime<Utc>>,
    /// When the envelope was decoded on the receiving side.
    pub received_at: Option<DateTime<Utc>>,
    /// Contained messages, in order.
    pub messages: Vec<Message>,
}

impl Envelope {
    /// An empty envelope with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            source: None,
            return_address: None,
            sent_at: None,
            received_at: None,
            messages: Vec::new(),
        }
    }

    /// Append a message.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set the originating entity.
    #[must_use]
    pub fn with_source(mut self, source: EntityRef) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the reply slot.
    #[must_use]
    pub fn with_return_address(mut self, address: SlotAddress) -> Self {
        self.return_address = Some(address);
        self
    }

    /// Copy the envelope's source and return address into every contained
    /// message that lacks its own.
    pub fn bubble_down(&mut self) {
        for message in &mut self.messages {
            if message.source.is_none() {
                message.source = self.source;
            }
            if message.return_address.is_none() {
                message.return_address = self.return_address;
            }
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

/// The unit written to a slot.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// A single message.
    Message(Message),
    /// A batch of messages.
    Envelope(Envelope),
}

impl Frame {
    /// Frame id.
    pub fn id(&self) -> Uuid {
        match self {
            Self::Message(m) => m.id,
            Self::Envelope(e) => e.id,
        }
    }

    /// Ids that replies to this frame will carry.
    pub fn correlation_ids(&self) -> Vec<Uuid> {
        match self {
            Self::Message(m) => vec![m.id],
            Self::Envelope(e) => e.messages.iter().map(|m| m.id).collect(),
        }
    }

    /// Frame-level return address.
    pub fn return_address(&self) -> Option<SlotAddress> {
        match self {
            Self::Message(m) => m.return_address,
            Self::Envelope(e) => e.return_address,
        }
    }

    /// Frame-level source.
    pub fn source(&self) -> Option<EntityRef> {
        match self {
            Self::Message(m) => m.source,
            Self::Envelope(e) => e.source,
        }
    }

    /// Propagate envelope routing hints into its messages.
    pub fn bubble_down(&mut self) {
        if let Self::Envelope(e) = self {
            e.bubble_down();
        }
    }

    /// Stamp the send time.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        match self {
            Self::Message(m) => m.sent_at = Some(at),
            Self::Envelope(e) => e.sent_at = Some(at),
        }
    }

    /// Stamp the receive time on the frame and every message in it.
    pub fn mark_received(&mut self, at: DateTime<Utc>) {
        match self {
            Self::Message(m) => m.received_at = Some(at),
            Self::Envelope(e) => {
                e.received_at = Some(at);
                for m in &mut e.messages {
                    m.received_at = Some(at);
                }
            }
        }
    }

    /// The messages carried by this frame.
    pub fn messages(&self) -> &[Message] {
        match self {
            Self::Message(m) => std::slice::from_ref(m),
            Self::Envelope(e) => &e.messages,
        }
    }

    /// Consume the frame, yielding its messages.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Message(m) => vec![m],
            Self::Envelope(e) => e.messages,
        }
    }
}

impl From<Message> for Frame {
    fn from(m: Message) -> Self {
        Self::Message(m)
    }
}

impl From<Envelope> for Frame {
    fn from(e: Envelope) -> Self {
        Self::Envelope(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> Message {
        Message::from_value(&text.to_string()).unwrap()
    }

    #[test]
    fn bubble_down_fills_only_missing_fields() {
        let own = EntityRef::new(9, 9).slot(1);
        let env_ret = EntityRef::new(1, 1).slot(5);
        let mut env = Envelope::new()
            .with_source(EntityRef::new(1, 1))
            .with_return_address(env_ret)
            .with_message(msg("a"))
            .with_message(msg("b").with_return_address(own));
        env.bubble_down();
        assert_eq!(env.messages[0].return_address, Some(env_ret));
        assert_eq!(env.messages[0].source, Some(EntityRef::new(1, 1)));
        assert_eq!(env.messages[1].return_address, Some(own));
    }

    #[test]
    fn envelope_correlates_by_message_ids() {
        let a = msg("a");
        let b = msg("b");
        let ids = vec![a.id, b.id];
        let frame: Frame = Envelope::new().with_message(a).with_message(b).into();
        assert_eq!(frame.correlation_ids(), ids);
        assert_ne!(frame.id(), ids[0]);
    }

    #[test]
    fn mark_received_reaches_contained_messages() {
        let mut frame: Frame = Envelope::new().with_message(msg("a")).into();
        let now = Utc::now();
        frame.mark_received(now);
        assert!(frame.messages().iter().all(|m| m.received_at == Some(now)));
    }
}
