//! Outbox relay: delivery, backoff on failure, per-entity order, competing relays.

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use search_sync::bus::ENTITY_ID_HEADER;
use search_sync::{
    AuctionPatch, AuctionStore, EventType, InMemoryTransport, OutboxRelay, OutboxStatus,
    OutboxStore, RelayHandle, SyncEvent,
};

use crate::support::{eventually, new_auction, relay_config, FlakyPublisher};

#[tokio::test]
async fn drain_publishes_each_row_once() {
    let store = Arc::new(AuctionStore::new());
    let transport = InMemoryTransport::new();
    let relay = OutboxRelay::new(Arc::clone(&store), Arc::new(transport.clone()), relay_config());

    let auction = store.create(new_auction("Ford", "White"), "bob").unwrap();
    store
        .update(
            auction.id,
            &AuctionPatch {
                color: Some("Blue".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let result = relay.drain_once().await.unwrap();
    assert_eq!((result.claimed, result.published, result.released), (2, 2, 0));

    let again = relay.drain_once().await.unwrap();
    assert_eq!(again.claimed, 0);
    assert_eq!(transport.published().len(), 2);
    assert_eq!(store.undelivered_count().unwrap(), 0);

    let rows = store.outbox_messages().unwrap();
    assert!(rows.iter().all(|r| r.status == OutboxStatus::Delivered && r.delivered_at.is_some()));

    let published = transport.published();
    assert_eq!(published[0].0, EventType::Created.destination());
    assert_eq!(published[1].0, EventType::Updated.destination());
    let message = &published[1].1;
    assert_eq!(message.header(ENTITY_ID_HEADER), Some(auction.id.to_string().as_str()));
    let event = SyncEvent::decode_declared(&message.event_type, &message.payload).unwrap();
    assert_eq!(event.event_type(), EventType::Updated);
}

#[tokio::test]
async fn failed_publish_keeps_row_pending_with_backoff() {
    let store = Arc::new(AuctionStore::new());
    let publisher = FlakyPublisher::new(InMemoryTransport::new());
    let relay = OutboxRelay::new(Arc::clone(&store), Arc::new(publisher.clone()), relay_config());

    let auction = store.create(new_auction("Ford", "White"), "bob").unwrap();
    store
        .update(
            auction.id,
            &AuctionPatch {
                mileage: Some(1),
                ..Default::default()
            },
        )
        .unwrap();

    publisher.set_down(true);
    let before = Utc::now();
    let result = relay.drain_once().await.unwrap();

    assert_eq!(result.claimed, 2);
    assert_eq!(result.released, 1);
    assert_eq!(result.deferred, 1);
    assert_eq!(publisher.attempts.load(Ordering::SeqCst), 1);

    let rows = store.outbox_messages().unwrap();
    let first = &rows[0];
    assert_eq!(first.status, OutboxStatus::Pending);
    assert_eq!(first.attempt_count, 1);
    assert!(first.last_error.is_some());
    assert!(first.next_attempt_at >= before + TimeDelta::seconds(9));

    // The row behind it was handed back without counting an attempt.
    assert_eq!(rows[1].status, OutboxStatus::Pending);
    assert_eq!(rows[1].attempt_count, 0);

    // Not due yet: nothing is claimed while the first row backs off.
    publisher.set_down(false);
    let idle = relay.drain_once().await.unwrap();
    assert_eq!(idle.claimed, 0);
    assert!(publisher.inner.published().is_empty());
    assert_eq!(store.undelivered_count().unwrap(), 2);
}

#[tokio::test]
async fn other_entities_are_not_held_back_by_a_failure() {
    let store = Arc::new(AuctionStore::new());
    let publisher = FlakyPublisher::new(InMemoryTransport::new());
    let relay = OutboxRelay::new(Arc::clone(&store), Arc::new(publisher.clone()), relay_config());

    store.create(new_auction("Ford", "White"), "bob").unwrap();
    publisher.set_down(true);
    relay.drain_once().await.unwrap();

    publisher.set_down(false);
    store.create(new_auction("Audi", "Black"), "alice").unwrap();
    let result = relay.drain_once().await.unwrap();

    assert_eq!(result.published, 1);
    assert_eq!(publisher.inner.published().len(), 1);
    assert_eq!(store.undelivered_count().unwrap(), 1);
}

#[tokio::test]
async fn competing_relays_never_publish_the_same_row() {
    let store = Arc::new(AuctionStore::new());
    let transport = InMemoryTransport::new();
    for i in 0..50 {
        store
            .create(new_auction(&format!("Make{i}"), "White"), "bob")
            .unwrap();
    }

    let mut config = relay_config();
    config.batch_size = 7;
    let first = OutboxRelay::new(Arc::clone(&store), Arc::new(transport.clone()), config.clone())
        .with_worker_id("relay-a");
    let second = OutboxRelay::new(Arc::clone(&store), Arc::new(transport.clone()), config)
        .with_worker_id("relay-b");

    let drain = |relay: OutboxRelay<AuctionStore, InMemoryTransport>| async move {
        let mut published = 0;
        loop {
            let result = relay.drain_once().await.unwrap();
            if result.claimed == 0 {
                return published;
            }
            published += result.published;
        }
    };

    let (a, b) = tokio::join!(tokio::spawn(drain(first)), tokio::spawn(drain(second)));
    assert_eq!(a.unwrap() + b.unwrap(), 50);

    let ids: Vec<String> = transport.published().into_iter().map(|(_, m)| m.id).collect();
    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(ids.len(), 50);
    assert_eq!(unique.len(), 50);
}

#[tokio::test]
async fn delivered_rows_are_purged_after_retention() {
    let store = Arc::new(AuctionStore::new());
    let publisher = FlakyPublisher::new(InMemoryTransport::new());
    let mut config = relay_config();
    config.retention_seconds = 0.0;
    let relay = OutboxRelay::new(Arc::clone(&store), Arc::new(publisher.clone()), config);

    store.create(new_auction("Ford", "White"), "bob").unwrap();
    relay.drain_once().await.unwrap();
    publisher.set_down(true);
    store.create(new_auction("Audi", "Black"), "alice").unwrap();
    relay.drain_once().await.unwrap();

    assert_eq!(relay.purge_delivered().unwrap(), 1);
    let rows = store.outbox_messages().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, OutboxStatus::Pending);
    assert_eq!(rows[0].attempt_count, 1);
    assert_eq!(store.undelivered_count().unwrap(), 1);
}

#[tokio::test]
async fn relay_handle_runs_until_stopped() {
    let store = Arc::new(AuctionStore::new());
    let transport = InMemoryTransport::new();
    let handle = RelayHandle::spawn(OutboxRelay::new(
        Arc::clone(&store),
        Arc::new(transport.clone()),
        relay_config(),
    ));

    store.create(new_auction("Ford", "White"), "bob").unwrap();
    store.create(new_auction("Audi", "Black"), "alice").unwrap();

    assert!(eventually(|| transport.published().len() == 2).await);
    assert!(!handle.is_finished());

    let stats = handle.stop().await;
    assert_eq!(stats.published, 2);
    assert!(stats.polls >= 1);
}
