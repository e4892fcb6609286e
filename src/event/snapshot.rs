//! Wire payloads carried inside an [`Envelope`](super::Envelope).
//!
//! Every field added after version 1 must be optional (or carry a serde
//! default) so old producers and new consumers keep understanding each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current snapshot schema version written by producers.
pub const SNAPSHOT_VERSION: u16 = 1;

fn default_version() -> u16 {
    SNAPSHOT_VERSION
}

/// Lifecycle state of an auction as seen on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    #[default]
    Live,
    Finished,
    ReserveNotMet,
}

/// Full entity snapshot carried by `Created` and `Updated` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionSnapshot {
    #[serde(default = "default_version")]
    pub version: u16,
    pub id: Uuid,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    #[serde(default)]
    pub image_url: String,
    pub seller: String,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub reserve_price: i32,
    #[serde(default)]
    pub sold_amount: Option<i32>,
    #[serde(default)]
    pub current_high_bid: Option<i32>,
    #[serde(default)]
    pub status: AuctionStatus,
    pub created_at: DateTime<Utc>,
    pub auction_end: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload of a `Deleted` event: identity plus the deletion watermark.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedAuction {
    pub id: Uuid,
    pub updated_at: DateTime<Utc>,
}
