//! Behaviour under real parallelism: racing writers and shutdown during retry.

use std::sync::Arc;

use chrono::TimeDelta;
use search_sync::{
    shutdown_channel, AuctionStore, Consumer, ConsumerConfig, FaultRouter,
    InMemoryProjectionStore, InMemoryQuarantineStore, InMemoryTransport, OutboxRelay,
    ProjectionRecord, ProjectionStore, Projector, RetryConfig,
};
use tokio::sync::Barrier;

use crate::support::{eventually, new_auction, relay_config, SwitchableStore};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_writers_for_one_auction_keep_the_newest() {
    const WRITERS: usize = 64;

    let store = AuctionStore::new();
    let base = store
        .create(new_auction("Ford", "White"), "bob")
        .unwrap()
        .to_snapshot();
    let projection = Arc::new(InMemoryProjectionStore::new());
    let barrier = Arc::new(Barrier::new(WRITERS + 1));

    let mut tasks = Vec::new();
    // Spawn newest first so stale writes tend to land after fresh ones.
    for i in (0..WRITERS).rev() {
        let mut snapshot = base.clone();
        snapshot.updated_at = base.updated_at + TimeDelta::milliseconds(i as i64);
        snapshot.color = format!("color-{i}");
        let record = ProjectionRecord::from_snapshot(&snapshot);
        let projection = Arc::clone(&projection);
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            projection.upsert_if_newer(record).unwrap()
        }));
    }

    // A delete in the middle of the range races with the upserts.
    let (id, delete_at) = (base.id, base.updated_at + TimeDelta::microseconds(31_500));
    let deleter = {
        let projection = Arc::clone(&projection);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            projection.delete_if_not_newer(id, delete_at).unwrap()
        })
    };
    drop(barrier);

    for task in tasks {
        task.await.unwrap();
    }
    deleter.await.unwrap();

    let stored = projection.get(id).unwrap().unwrap();
    assert_eq!(stored.color, format!("color-{}", WRITERS - 1));
    assert_eq!(
        stored.updated_at,
        base.updated_at + TimeDelta::milliseconds(WRITERS as i64 - 1)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_finishes_a_delivery_that_is_mid_retry() {
    let store = Arc::new(AuctionStore::new());
    let transport = InMemoryTransport::new();
    let projection = Arc::new(SwitchableStore::default());
    let router = Arc::new(FaultRouter::new(Arc::new(InMemoryQuarantineStore::new())));
    let config = ConsumerConfig {
        retry: RetryConfig {
            interval_seconds: 0.02,
            max_attempts: 50,
        },
        lanes: 2,
        poll_timeout_seconds: 0.02,
    };
    let consumer = Arc::new(Consumer::new(
        Projector::new(Arc::clone(&projection)),
        Arc::clone(&router),
        config,
    ));
    let subscription = Arc::new(transport.subscribe(&consumer.destinations()));
    let relay = OutboxRelay::new(Arc::clone(&store), Arc::new(transport.clone()), relay_config());

    projection.set_available(false);
    let (trigger, signal) = shutdown_channel();
    let task = tokio::spawn(Arc::clone(&consumer).run(Arc::clone(&subscription), signal));

    let auction = store.create(new_auction("Ford", "White"), "bob").unwrap();
    relay.drain_once().await.unwrap();
    assert!(eventually(|| subscription.in_flight() == 1).await);

    // Stop while the lane is still retrying, then let the store recover.
    trigger.trigger();
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    assert!(!task.is_finished());
    projection.set_available(true);

    let stats = task.await.unwrap();
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.quarantined, 0);
    assert_eq!(subscription.acknowledged().len(), 1);
    assert_eq!(subscription.in_flight(), 0);
    assert!(projection.inner.get(auction.id).unwrap().is_some());
    assert!(router.list().unwrap().is_empty());
}
