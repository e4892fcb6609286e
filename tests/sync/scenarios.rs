//! End-to-end: write side, relay, transport, consumer and catch-up together.

use std::sync::Arc;

use search_sync::{
    AuctionPatch, AuctionStore, Consumer, FaultRouter, InMemoryProjectionStore,
    InMemoryQuarantineStore, InMemoryTransport, OutboxRelay, ProjectionStore, ProjectorService,
    Projector, ReconcileConfig, Reconciler, RelayHandle, ShutdownSignal, Watermark,
};

use crate::support::{consumer_config, eventually, new_auction, relay_config};

type Service = ProjectorService<InMemoryProjectionStore, AuctionStore>;

struct Pipeline {
    store: Arc<AuctionStore>,
    transport: InMemoryTransport,
    projection: Arc<InMemoryProjectionStore>,
    router: Arc<FaultRouter<InMemoryQuarantineStore>>,
}

impl Pipeline {
    fn new() -> Self {
        Self {
            store: Arc::new(AuctionStore::new()),
            transport: InMemoryTransport::new(),
            projection: Arc::new(InMemoryProjectionStore::new()),
            router: Arc::new(FaultRouter::new(Arc::new(InMemoryQuarantineStore::new()))),
        }
    }

    fn relay(&self) -> RelayHandle {
        RelayHandle::spawn(OutboxRelay::new(
            Arc::clone(&self.store),
            Arc::new(self.transport.clone()),
            relay_config(),
        ))
    }

    fn reconciler(&self) -> Arc<Reconciler<InMemoryProjectionStore, AuctionStore>> {
        Arc::new(Reconciler::new(
            Projector::new(Arc::clone(&self.projection)),
            Arc::clone(&self.store),
            ReconcileConfig::default(),
        ))
    }

    async fn start_projector(&self) -> Service {
        let consumer = Arc::new(Consumer::new(
            Projector::new(Arc::clone(&self.projection)),
            Arc::clone(&self.router),
            consumer_config(),
        ));
        let subscription = Arc::new(self.transport.subscribe(&consumer.destinations()));
        ProjectorService::start(self.reconciler(), consumer, subscription)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn create_update_delete_flow_through_to_the_projection() {
    let pipeline = Pipeline::new();
    let service = pipeline.start_projector().await;
    let relay = pipeline.relay();
    let projection = Arc::clone(&pipeline.projection);

    let created = pipeline.store.create(new_auction("Ford", "White"), "bob").unwrap();
    assert!(eventually(|| projection.get(created.id).unwrap().is_some()).await);
    assert_eq!(projection.watermark().unwrap(), Watermark::at(created.updated_at));

    let updated = pipeline
        .store
        .update(
            created.id,
            &AuctionPatch {
                color: Some("Red".into()),
                mileage: Some(30_000),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(updated.updated_at > created.updated_at);
    assert!(
        eventually(|| projection
            .get(created.id)
            .unwrap()
            .is_some_and(|r| r.color == "Red" && r.mileage == 30_000))
        .await
    );
    assert_eq!(projection.watermark().unwrap(), Watermark::at(updated.updated_at));

    pipeline.store.delete(created.id).unwrap();
    assert!(eventually(|| projection.get(created.id).unwrap().is_none()).await);

    let relay_stats = relay.stop().await;
    let consumer_stats = service.shutdown().await;
    assert_eq!(relay_stats.published, 3);
    assert_eq!(consumer_stats.applied, 3);
    assert!(pipeline.router.list().unwrap().is_empty());
}

#[tokio::test]
async fn empty_projection_catches_up_with_everything() {
    let pipeline = Pipeline::new();
    let ids: Vec<_> = ["Ford", "Audi", "Bmw"]
        .iter()
        .map(|make| pipeline.store.create(new_auction(make, "White"), "bob").unwrap().id)
        .collect();

    let report = pipeline
        .reconciler()
        .reconcile(&ShutdownSignal::never())
        .await
        .unwrap();

    assert!(report.watermark.is_beginning());
    assert_eq!((report.fetched, report.applied), (3, 3));
    for id in ids {
        assert!(pipeline.projection.get(id).unwrap().is_some());
    }
}

#[tokio::test]
async fn restart_fetches_only_what_changed_after_the_watermark() {
    let pipeline = Pipeline::new();
    let first = pipeline.store.create(new_auction("Ford", "White"), "bob").unwrap();
    pipeline.store.create(new_auction("Audi", "Black"), "alice").unwrap();

    let reconciler = pipeline.reconciler();
    reconciler.reconcile(&ShutdownSignal::never()).await.unwrap();
    let stored = pipeline.projection.watermark().unwrap();

    // Projector is down: these changes never reach a subscription.
    let relay = OutboxRelay::new(
        Arc::clone(&pipeline.store),
        Arc::new(pipeline.transport.clone()),
        relay_config(),
    );
    let updated = pipeline
        .store
        .update(
            first.id,
            &AuctionPatch {
                color: Some("Green".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let late = pipeline.store.create(new_auction("Bmw", "Blue"), "tom").unwrap();
    relay.drain_once().await.unwrap();

    let service = pipeline.start_projector().await;
    let report = service.startup_report();

    assert_eq!(report.watermark, stored);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.applied, 2);
    assert_eq!(pipeline.projection.len().unwrap(), 3);
    assert_eq!(pipeline.projection.get(first.id).unwrap().unwrap().color, "Green");
    assert_eq!(
        pipeline.projection.watermark().unwrap(),
        Watermark::at(late.updated_at)
    );
    assert!(late.updated_at > updated.updated_at);

    // Running it again is a no-op.
    let again = service.reconcile().await.unwrap();
    assert_eq!((again.fetched, again.applied), (0, 0));
    service.shutdown().await;
}

#[tokio::test]
async fn redelivery_after_catch_up_is_skipped() {
    let pipeline = Pipeline::new();
    let consumer = Arc::new(Consumer::new(
        Projector::new(Arc::clone(&pipeline.projection)),
        Arc::clone(&pipeline.router),
        consumer_config(),
    ));
    // Subscribed before the writes, so the transport holds every event.
    let subscription = Arc::new(pipeline.transport.subscribe(&consumer.destinations()));

    let relay = OutboxRelay::new(
        Arc::clone(&pipeline.store),
        Arc::new(pipeline.transport.clone()),
        relay_config(),
    );
    let auction = pipeline.store.create(new_auction("Ford", "White"), "bob").unwrap();
    pipeline
        .store
        .update(
            auction.id,
            &AuctionPatch {
                year: Some(2021),
                ..Default::default()
            },
        )
        .unwrap();
    relay.drain_once().await.unwrap();

    let service = ProjectorService::start(pipeline.reconciler(), consumer, Arc::clone(&subscription))
        .await
        .unwrap();
    assert_eq!(service.startup_report().applied, 1);

    assert!(eventually(|| subscription.acknowledged().len() == 2).await);
    let stats = service.shutdown().await;

    assert_eq!(stats.applied, 0);
    assert_eq!(stats.skipped, 2);
    assert_eq!(pipeline.projection.get(auction.id).unwrap().unwrap().year, 2021);
}
