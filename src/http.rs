//! HTTP surfaces. Requires the `http` feature.
//!
//! ## Routes
//!
//! Authoritative side ([`authority_router`]):
//! - `GET /entities?since=<RFC 3339>` - snapshots with `updatedAt` strictly
//!   after `since`, oldest first; every auction when `since` is omitted.
//! - `GET /health` - `{ "ok": true, "auctions": <count> }`.
//!
//! Search side ([`search_router`]):
//! - `GET /api/search?searchTerm=&seller=&winner=&orderBy=&filterBy=&pageNumber=&pageSize=`
//! - `GET /health` - `{ "ok": true, "records": <count>, "watermark": <RFC 3339 or null> }`.
//!
//! ## Example
//!
//! ```ignore
//! let store = AuctionStore::new();
//! http::serve(http::authority_router(store.clone()), "0.0.0.0:7001").await?;
//! ```

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::entity::AuctionStore;
use crate::projection::{InMemoryProjectionStore, ProjectionStore, SearchParams};

pub fn authority_router(store: AuctionStore) -> Router {
    Router::new()
        .route("/entities", get(entities_handler))
        .route("/health", get(authority_health_handler))
        .with_state(store)
}

pub fn search_router(store: Arc<InMemoryProjectionStore>) -> Router {
    Router::new()
        .route("/api/search", get(search_handler))
        .route("/health", get(search_health_handler))
        .with_state(store)
}

/// Serve `app` at the given address (e.g. `"0.0.0.0:7001"`).
pub async fn serve(app: Router, addr: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

#[derive(Debug, Deserialize)]
struct DeltaQuery {
    since: Option<String>,
}

/// `GET /entities?since=` - the delta query used by the reconciler.
async fn entities_handler(
    State(store): State<AuctionStore>,
    Query(query): Query<DeltaQuery>,
) -> Response {
    let since = match query.since.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(err) => {
                return error_response(StatusCode::BAD_REQUEST, format!("invalid since: {err}"))
            }
        },
    };

    match store.changed_since(since) {
        Ok(snapshots) => Json(snapshots).into_response(),
        Err(err) => {
            warn!(error = %err, "delta query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err)
        }
    }
}

async fn authority_health_handler(State(store): State<AuctionStore>) -> Response {
    match store.len() {
        Ok(auctions) => Json(json!({ "ok": true, "auctions": auctions })).into_response(),
        Err(err) => {
            warn!(error = %err, "health check failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, err)
        }
    }
}

/// `GET /api/search` - filtered, ordered and paged projection records.
async fn search_handler(
    State(store): State<Arc<InMemoryProjectionStore>>,
    Query(params): Query<SearchParams>,
) -> Response {
    match store.search(&params) {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(StatusCode::SERVICE_UNAVAILABLE, err),
    }
}

async fn search_health_handler(State(store): State<Arc<InMemoryProjectionStore>>) -> Response {
    let health = store.len().and_then(|records| Ok((records, store.watermark()?)));
    match health {
        Ok((records, watermark)) => Json(json!({
            "ok": true,
            "records": records,
            "watermark": watermark.as_datetime(),
        }))
        .into_response(),
        Err(err) => error_response(StatusCode::SERVICE_UNAVAILABLE, err),
    }
}
