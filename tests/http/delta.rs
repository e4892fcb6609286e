use std::sync::Arc;

use axum::Router;
use chrono::SecondsFormat;
use search_sync::http::authority_router;
use search_sync::{
    AuctionSnapshot, AuctionStore, AuthoritativeSource, HttpAuthoritativeSource,
    InMemoryProjectionStore, NewAuction, ProjectionStore, Projector, ReconcileConfig,
    ReconcileError, Reconciler, ShutdownSignal, SourceError,
};

async fn start_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn new_auction(make: &str) -> NewAuction {
    NewAuction {
        make: make.into(),
        model: "Model".into(),
        year: 2019,
        color: "Silver".into(),
        mileage: 40_000,
        image_url: String::new(),
        reserve_price: 5_000,
        auction_end: chrono::Utc::now() + chrono::TimeDelta::days(3),
    }
}

#[tokio::test]
async fn health_reports_auction_count() {
    let store = AuctionStore::new();
    store.create(new_auction("Ford"), "bob").unwrap();
    let base = start_server(authority_router(store)).await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["auctions"], 1);
}

#[tokio::test]
async fn since_is_strictly_greater() {
    let store = AuctionStore::new();
    let first = store.create(new_auction("Ford"), "bob").unwrap();
    let second = store.create(new_auction("Audi"), "alice").unwrap();
    let base = start_server(authority_router(store)).await;
    let client = reqwest::Client::new();

    let all: Vec<AuctionSnapshot> = client
        .get(format!("{base}/entities"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, first.id);

    let since = first.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    let delta: Vec<AuctionSnapshot> = client
        .get(format!("{base}/entities"))
        .query(&[("since", since)])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0].id, second.id);
    assert_eq!(delta[0].updated_at, second.updated_at);

    let resp = client
        .get(format!("{base}/entities?since=yesterday"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn reconciles_over_http() {
    let store = AuctionStore::new();
    let ids: Vec<_> = ["Ford", "Audi", "Bmw"]
        .iter()
        .map(|make| store.create(new_auction(make), "bob").unwrap().id)
        .collect();
    let base = start_server(authority_router(store.clone())).await;

    let projection = Arc::new(InMemoryProjectionStore::new());
    let source = Arc::new(HttpAuthoritativeSource::new(format!("{base}/")));
    assert_eq!(source.base_url(), base);

    let reconciler = Reconciler::new(
        Projector::new(Arc::clone(&projection)),
        Arc::clone(&source),
        ReconcileConfig::default(),
    );
    let report = reconciler.reconcile(&ShutdownSignal::never()).await.unwrap();
    assert_eq!((report.fetched, report.applied), (3, 3));
    for id in &ids {
        assert!(projection.get(*id).unwrap().is_some());
    }

    store.create(new_auction("Kia"), "tom").unwrap();
    let report = reconciler.reconcile(&ShutdownSignal::never()).await.unwrap();
    assert_eq!((report.fetched, report.applied), (1, 1));
    assert_eq!(projection.len().unwrap(), 4);
}

#[tokio::test]
async fn unreachable_service_exhausts_bounded_retries() {
    // Bind then drop so nothing is listening on the port.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = Arc::new(HttpAuthoritativeSource::new(format!("http://{addr}")));
    assert!(matches!(
        source.changed_since(None).await,
        Err(SourceError::Unavailable(_))
    ));

    let config = ReconcileConfig {
        interval_seconds: 0.01,
        max_delay_seconds: 0.02,
        max_attempts: 3,
        ..ReconcileConfig::default()
    };
    let reconciler = Reconciler::new(
        Projector::new(Arc::new(InMemoryProjectionStore::new())),
        source,
        config,
    );
    let err = reconciler.reconcile(&ShutdownSignal::never()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Exhausted { attempts: 3, .. }));
}
