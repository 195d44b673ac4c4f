//! End-to-end lifecycle cleanup over the in-memory transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use slotlink_core::{
    EntityKind, EntityRef, EntityState, EventFilter, EventHandler, MemoryTransport, TransportEvent,
};
use slotlink_subscriptions::{
    CleanupConfig, Destination, SOURCE_WATCHER_ID, SubscriptionEntry, SubscriptionHub,
    transport_key,
};
use tokio::time::sleep;

const SRC: EntityRef = EntityRef::new(10, 1);
const DEST: EntityRef = EntityRef::new(20, 5);

fn hub_with(config: CleanupConfig) -> (Arc<MemoryTransport>, SubscriptionHub) {
    let transport = Arc::new(MemoryTransport::new());
    transport.add_entity(SRC, EntityKind::Element, EntityState::Active);
    transport.add_entity(DEST, EntityKind::Service, EntityState::Active);
    let hub = SubscriptionHub::with_settings(
        transport.clone(),
        &slotlink_settings::CleanupSettings {
            slice_ms: 50,
            ..Default::default()
        },
    );
    hub.configs().set(SRC, config);
    (transport, hub)
}

fn counting_entry(id: &str, hits: &Arc<AtomicUsize>) -> SubscriptionEntry {
    let hits = hits.clone();
    let handler: EventHandler = Arc::new(move |_: &TransportEvent| {
        let _ = hits.fetch_add(1, Ordering::SeqCst);
    });
    SubscriptionEntry::new(id, vec![EventFilter::slot(DEST.slot(3))], handler)
        .with_destination(Destination::new(DEST, EntityKind::Service))
}

fn stopped_after_200ms() -> CleanupConfig {
    CleanupConfig::new(Duration::ZERO, Duration::ZERO, Duration::from_millis(200))
}

#[tokio::test(start_paused = true)]
async fn reactivation_within_delay_keeps_subscriptions() {
    let (transport, hub) = hub_with(stopped_after_200ms());
    let hits = Arc::new(AtomicUsize::new(0));
    let _ = hub
        .monitor()
        .register(SRC, EntityKind::Element, counting_entry("feed", &hits), false)
        .unwrap();

    transport.set_state(SRC, EntityState::Stopped).unwrap();
    assert_eq!(hub.monitor().pending_cleanups(), 1);

    sleep(Duration::from_millis(100)).await;
    transport.set_state(SRC, EntityState::Active).unwrap();
    assert_eq!(hub.monitor().pending_cleanups(), 0);

    sleep(Duration::from_millis(300)).await;
    assert!(hub.registry().contains(SRC, "feed"));
    assert_eq!(transport.unsubscribe_calls(), 0);

    transport.set_slot(DEST.slot(3), "still flowing").unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn staying_stopped_removes_exactly_once() {
    let (transport, hub) = hub_with(stopped_after_200ms());
    let hits = Arc::new(AtomicUsize::new(0));
    let _ = hub
        .monitor()
        .register(SRC, EntityKind::Element, counting_entry("feed", &hits), false)
        .unwrap();
    let registered = hub.registry().subscriptions(SRC).len();

    transport.set_state(SRC, EntityState::Stopped).unwrap();
    sleep(Duration::from_millis(150)).await;
    assert!(hub.registry().contains(SRC, "feed"));

    sleep(Duration::from_millis(100)).await;
    assert_eq!(hub.registry().source_count(), 0);
    assert_eq!(transport.unsubscribe_calls(), registered);
    assert!(!transport.is_subscribed(&transport_key(SRC, SOURCE_WATCHER_ID)));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.unsubscribe_calls(), registered);
    assert_eq!(hub.monitor().pending_cleanups(), 0);

    transport.set_slot(DEST.slot(3), "ignored").unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn state_reverted_before_expiry_skips_removal() {
    let (transport, hub) = hub_with(stopped_after_200ms());
    let hits = Arc::new(AtomicUsize::new(0));
    let _ = hub
        .monitor()
        .register(SRC, EntityKind::Element, counting_entry("feed", &hits), false)
        .unwrap();

    transport.set_state(SRC, EntityState::Stopped).unwrap();
    // Drop the watcher so the Active event is never observed, then revert.
    hub.registry()
        .remove_subscription(SRC, SOURCE_WATCHER_ID, false)
        .unwrap();
    transport.set_state(SRC, EntityState::Active).unwrap();
    assert_eq!(hub.monitor().pending_cleanups(), 1);

    sleep(Duration::from_millis(300)).await;
    assert!(hub.registry().contains(SRC, "feed"));
    assert_eq!(hub.monitor().pending_cleanups(), 0);
}

#[tokio::test(start_paused = true)]
async fn destination_deletion_after_delay_removes_dependents_only() {
    let config = CleanupConfig::new(Duration::from_millis(120), Duration::ZERO, Duration::ZERO);
    let (transport, hub) = hub_with(config);
    let hits = Arc::new(AtomicUsize::new(0));
    let _ = hub
        .monitor()
        .register(SRC, EntityKind::Element, counting_entry("feed", &hits), false)
        .unwrap();
    let local = SubscriptionEntry::new(
        "local",
        vec![EventFilter::slot(SRC.slot(1))],
        Arc::new(|_: &TransportEvent| {}),
    );
    let _ = hub
        .monitor()
        .register(SRC, EntityKind::Element, local, false)
        .unwrap();

    transport.set_state(DEST, EntityState::Deleted).unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(hub.registry().contains(SRC, "feed"));

    sleep(Duration::from_millis(100)).await;
    assert!(!hub.registry().contains(SRC, "feed"));
    assert!(hub.registry().contains(SRC, "local"));
    assert!(hub.registry().contains(SRC, SOURCE_WATCHER_ID));
}
