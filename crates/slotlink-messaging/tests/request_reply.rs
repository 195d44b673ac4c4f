//! Request/reply between two entities over the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use slotlink_core::{EntityKind, EntityRef, EntityState, MemoryTransport, Transport};
use slotlink_messaging::{
    Envelope, Message, Messenger, NamedType, PayloadType, ReplyOutcome, TypeCatalog,
    TypeDescriptor,
};
use slotlink_settings::{LoggingSettings, MessagingSettings};
use slotlink_subscriptions::SubscriptionHub;
use tokio::time::{Instant, sleep};

const CLIENT: EntityRef = EntityRef::new(1, 10);
const SERVER: EntityRef = EntityRef::new(2, 20);
const INBOX: u32 = 1;
const RETURN: u32 = 9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Quote {
    sku: String,
    qty: u32,
}

impl PayloadType for Quote {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Named(NamedType::new("pricing", "acme.pricing", "Quote"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Price {
    sku: String,
    cents: i64,
}

impl PayloadType for Price {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Named(NamedType::new("pricing", "acme.pricing", "Price"))
    }
}

fn catalog() -> TypeCatalog {
    let mut catalog = TypeCatalog::new();
    let _ = catalog.register(NamedType::new("pricing", "acme.pricing", "Quote"));
    let _ = catalog.register(NamedType::new("pricing", "acme.pricing", "Price"));
    catalog
}

struct Link {
    transport: Arc<MemoryTransport>,
    hub: SubscriptionHub,
    messenger: Messenger,
}

fn link() -> Link {
    let _ = slotlink_core::logging::init_from_settings(&LoggingSettings::default());
    let transport = Arc::new(MemoryTransport::new());
    transport.add_entity(CLIENT, EntityKind::Element, EntityState::Active);
    transport.add_entity(SERVER, EntityKind::Service, EntityState::Active);
    let hub = SubscriptionHub::new(transport.clone());
    let settings = MessagingSettings {
        default_timeout_ms: 2_000,
        ..MessagingSettings::default()
    };
    let messenger = Messenger::with_settings(&hub, catalog(), settings);
    Link {
        transport,
        hub,
        messenger,
    }
}

/// Answers each quote with a price after `delay`, multiplying qty by 100.
fn serve(messenger: &Messenger, delay: Duration) -> slotlink_messaging::Inbox {
    let server = messenger.clone();
    messenger
        .listen(SERVER.slot(INBOX), move |request| {
            let server = server.clone();
            drop(tokio::spawn(async move {
                sleep(delay).await;
                let quote: Quote = request.decode().unwrap();
                let price = Price {
                    sku: quote.sku,
                    cents: i64::from(quote.qty) * 100,
                };
                let reply = Message::from_value(&price).unwrap().with_source(SERVER);
                server.reply(&request, reply).await.unwrap();
            }));
        })
        .unwrap()
}

fn quote(sku: &str, qty: u32) -> Message {
    Message::from_value(&Quote {
        sku: sku.into(),
        qty,
    })
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn custom_payload_round_trip() {
    let link = link();
    let _inbox = serve(&link.messenger, Duration::from_millis(20));

    let request = quote("widget", 3)
        .with_source(CLIENT)
        .with_return_address(CLIENT.slot(RETURN));
    let outcome = link
        .messenger
        .send_and_wait(request, SERVER.slot(INBOX), None)
        .await
        .unwrap();

    let ReplyOutcome::Reply(reply) = outcome else {
        panic!("expected a reply");
    };
    assert_eq!(reply.source, Some(SERVER));
    assert_eq!(
        reply.decode::<Price>().unwrap(),
        Price {
            sku: "widget".into(),
            cents: 300
        }
    );
    assert!(reply.sent_at.is_some());
    assert!(reply.received_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn envelope_collects_every_reply() {
    let link = link();
    let _inbox = serve(&link.messenger, Duration::from_millis(10));

    let envelope = Envelope::new()
        .with_source(CLIENT)
        .with_return_address(CLIENT.slot(RETURN))
        .with_message(quote("a", 1))
        .with_message(quote("b", 2))
        .with_message(quote("c", 3));

    let collected = link
        .messenger
        .send_and_collect(envelope, SERVER.slot(INBOX), None)
        .await
        .unwrap();

    assert!(collected.complete);
    let mut cents: Vec<i64> = collected
        .replies
        .iter()
        .map(|m| m.decode::<Price>().unwrap().cents)
        .collect();
    cents.sort_unstable();
    assert_eq!(cents, vec![100, 200, 300]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_share_a_return_slot() {
    let link = link();
    let _inbox = serve(&link.messenger, Duration::from_millis(30));

    let requests = (1..=5).map(|qty| {
        let messenger = link.messenger.clone();
        async move {
            let request = quote(&format!("sku-{qty}"), qty).with_return_address(CLIENT.slot(RETURN));
            let id = request.id;
            let reply = messenger
                .send_and_wait(request, SERVER.slot(INBOX), None)
                .await
                .unwrap()
                .into_reply()
                .unwrap();
            (id, reply)
        }
    });

    for (id, reply) in join_all(requests).await {
        assert_eq!(reply.id, id);
    }
    // Only the inbox remains once every waiter is released.
    assert_eq!(link.transport.registration_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_server_times_out_and_late_reply_is_ignored() {
    let link = link();
    let _inbox = serve(&link.messenger, Duration::from_millis(500));

    let start = Instant::now();
    let outcome = link
        .messenger
        .send_and_wait(
            quote("late", 1).with_return_address(CLIENT.slot(RETURN)),
            SERVER.slot(INBOX),
            Some(Duration::from_millis(200)),
        )
        .await
        .unwrap();
    assert_eq!(outcome, ReplyOutcome::TimedOut);
    assert_eq!(start.elapsed(), Duration::from_millis(200));

    // The reply still lands in the slot, but nobody is waiting for it.
    sleep(Duration::from_millis(400)).await;
    assert!(link.transport.read_slot(CLIENT.slot(RETURN)).await.is_ok());
    assert_eq!(link.transport.registration_count(), 1);
}

#[tokio::test]
async fn deleted_server_loses_its_inbox() {
    let link = link();
    let seen = Arc::new(Mutex::new(0usize));
    let sink = seen.clone();
    let inbox = link
        .messenger
        .listen(SERVER.slot(INBOX), move |_| *sink.lock() += 1)
        .unwrap();
    let _ = link
        .hub
        .monitor()
        .watch_source(SERVER, EntityKind::Service)
        .unwrap();

    link.messenger
        .send(quote("x", 1), SERVER.slot(INBOX))
        .await
        .unwrap();
    assert_eq!(*seen.lock(), 1);

    link.transport
        .set_state(SERVER, EntityState::Deleted)
        .unwrap();
    assert!(!link.hub.registry().contains(SERVER, inbox.set_id()));

    let raw = link.messenger.encode(&quote("y", 2).into()).unwrap();
    link.transport.set_slot(SERVER.slot(INBOX), &raw).unwrap();
    assert_eq!(*seen.lock(), 1);

    drop(inbox);
    assert_eq!(link.transport.registration_count(), 0);
}
