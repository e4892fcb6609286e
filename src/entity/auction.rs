use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{AuctionSnapshot, AuctionStatus, SNAPSHOT_VERSION};

/// The vehicle being auctioned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub image_url: String,
}

/// Authoritative auction record, owned by the write side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    pub id: Uuid,
    pub reserve_price: i32,
    pub seller: String,
    pub winner: Option<String>,
    pub sold_amount: Option<i32>,
    pub current_high_bid: Option<i32>,
    pub created_at: DateTime<Utc>,
    /// Advanced on every mutation; the projection's watermark source.
    pub updated_at: DateTime<Utc>,
    pub auction_end: DateTime<Utc>,
    pub status: AuctionStatus,
    pub item: Item,
}

impl Auction {
    /// Version 1 wire snapshot of this auction.
    pub fn to_snapshot(&self) -> AuctionSnapshot {
        AuctionSnapshot {
            version: SNAPSHOT_VERSION,
            id: self.id,
            make: self.item.make.clone(),
            model: self.item.model.clone(),
            year: self.item.year,
            color: self.item.color.clone(),
            mileage: self.item.mileage,
            image_url: self.item.image_url.clone(),
            seller: self.seller.clone(),
            winner: self.winner.clone(),
            reserve_price: self.reserve_price,
            sold_amount: self.sold_amount,
            current_high_bid: self.current_high_bid,
            status: self.status,
            created_at: self.created_at,
            auction_end: self.auction_end,
            updated_at: self.updated_at,
        }
    }
}

/// Input for creating an auction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuction {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub mileage: i32,
    pub image_url: String,
    pub reserve_price: i32,
    pub auction_end: DateTime<Utc>,
}

/// Partial update of the item fields. `None` keeps the current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionPatch {
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub mileage: Option<i32>,
    pub year: Option<i32>,
}

impl AuctionPatch {
    /// Apply to `item`, returning whether anything changed.
    pub fn apply(&self, item: &mut Item) -> bool {
        let before = item.clone();
        if let Some(make) = &self.make {
            item.make = make.clone();
        }
        if let Some(model) = &self.model {
            item.model = model.clone();
        }
        if let Some(color) = &self.color {
            item.color = color.clone();
        }
        if let Some(mileage) = self.mileage {
            item.mileage = mileage;
        }
        if let Some(year) = self.year {
            item.year = year;
        }
        *item != before
    }
}
