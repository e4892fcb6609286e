use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{AuctionSnapshot, AuctionStatus};

/// Denormalized auction document in the search projection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionRecord {
    pub id: Uuid,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub image_url: String,
    pub seller: String,
    pub winner: Option<String>,
    pub reserve_price: i32,
    pub sold_amount: Option<i32>,
    pub current_high_bid: Option<i32>,
    pub status: AuctionStatus,
    pub created_at: DateTime<Utc>,
    pub auction_end: DateTime<Utc>,
    /// Watermark used for conflict resolution.
    pub updated_at: DateTime<Utc>,
}

impl ProjectionRecord {
    /// Conversion from the wire snapshot (any version; absent fields already defaulted).
    pub fn from_snapshot(snapshot: &AuctionSnapshot) -> Self {
        Self {
            id: snapshot.id,
            make: snapshot.make.clone(),
            model: snapshot.model.clone(),
            year: snapshot.year,
            color: snapshot.color.clone(),
            mileage: snapshot.mileage,
            image_url: snapshot.image_url.clone(),
            seller: snapshot.seller.clone(),
            winner: snapshot.winner.clone(),
            reserve_price: snapshot.reserve_price,
            sold_amount: snapshot.sold_amount,
            current_high_bid: snapshot.current_high_bid,
            status: snapshot.status,
            created_at: snapshot.created_at,
            auction_end: snapshot.auction_end,
            updated_at: snapshot.updated_at,
        }
    }
}

/// Scalar cursor: the newest `updated_at` the projection holds.
///
/// Orders before every real timestamp when at the beginning of time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(Option<DateTime<Utc>>);

impl Watermark {
    pub fn beginning() -> Self {
        Watermark(None)
    }

    pub fn at(at: DateTime<Utc>) -> Self {
        Watermark(Some(at))
    }

    pub fn is_beginning(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Whether `at` is strictly newer than this watermark.
    pub fn is_before(&self, at: DateTime<Utc>) -> bool {
        self.0.map_or(true, |watermark| watermark < at)
    }
}
