use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use search_sync::http::search_router;
use search_sync::{
    AuctionStore, InMemoryProjectionStore, NewAuction, Projector, SearchPage, SyncEvent,
};

async fn start_server(projection: Arc<InMemoryProjectionStore>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, search_router(projection)).await.unwrap();
    });
    format!("http://{addr}")
}

/// Project auctions straight from the write side.
fn seeded_projection() -> Arc<InMemoryProjectionStore> {
    let store = AuctionStore::new();
    let listings = [
        ("Ford", "White", "bob", TimeDelta::hours(3)),
        ("Audi", "Black", "alice", TimeDelta::days(2)),
        ("Bmw", "White", "bob", TimeDelta::days(5)),
        ("Kia", "Red", "tom", TimeDelta::days(-1)),
    ];
    for (make, color, seller, ends_in) in listings {
        store
            .create(
                NewAuction {
                    make: make.into(),
                    model: "Model".into(),
                    year: 2020,
                    color: color.into(),
                    mileage: 1_000,
                    image_url: String::new(),
                    reserve_price: 0,
                    auction_end: Utc::now() + ends_in,
                },
                seller,
            )
            .unwrap();
    }

    let projection = Arc::new(InMemoryProjectionStore::new());
    let projector = Projector::new(Arc::clone(&projection));
    for snapshot in store.changed_since(None).unwrap() {
        projector.apply(&SyncEvent::Created(snapshot)).unwrap();
    }
    projection
}

async fn search(base: &str, query: &str) -> SearchPage {
    reqwest::get(format!("{base}/api/search?{query}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn default_search_lists_live_auctions_ending_soonest() {
    let base = start_server(seeded_projection()).await;

    let page = search(&base, "").await;
    assert_eq!(page.total_count, 3);
    assert_eq!(page.page_count, 1);
    let makes: Vec<&str> = page.results.iter().map(|r| r.make.as_str()).collect();
    assert_eq!(makes, vec!["Ford", "Audi", "Bmw"]);
}

#[tokio::test]
async fn filters_combine_with_term_and_paging() {
    let base = start_server(seeded_projection()).await;

    let page = search(&base, "searchTerm=white&seller=bob&orderBy=make").await;
    let makes: Vec<&str> = page.results.iter().map(|r| r.make.as_str()).collect();
    assert_eq!(makes, vec!["Bmw", "Ford"]);

    let page = search(&base, "filterBy=finished").await;
    assert_eq!(page.total_count, 1);
    assert_eq!(page.results[0].make, "Kia");

    let page = search(&base, "filterBy=endingSoon").await;
    assert_eq!(page.total_count, 1);
    assert_eq!(page.results[0].make, "Ford");

    let page = search(&base, "pageSize=2&pageNumber=2").await;
    assert_eq!(page.page_count, 2);
    assert_eq!(page.results.len(), 1);
}

#[tokio::test]
async fn health_reports_watermark() {
    let projection = seeded_projection();
    let base = start_server(Arc::clone(&projection)).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["records"], 4);
    assert!(body["watermark"].is_string());
}
