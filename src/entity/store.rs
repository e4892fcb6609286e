use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Auction, AuctionPatch, EntityError, Item, NewAuction};
use crate::clock::MonotonicClock;
use crate::event::{AuctionSnapshot, AuctionStatus, DeletedAuction, SyncEvent};
use crate::outbox::{claim_rows, purge_rows, with_held_row, OutboxError, OutboxMessage, OutboxStore};

#[derive(Default)]
struct State {
    auctions: HashMap<Uuid, Auction>,
    outbox: Vec<OutboxMessage>,
    next_outbox_id: u64,
}

impl State {
    /// Insert the outbox row for a mutation that is being committed.
    fn stage(&mut self, event: &SyncEvent, payload: String, at: DateTime<Utc>) {
        self.next_outbox_id += 1;
        self.outbox.push(OutboxMessage::new(
            self.next_outbox_id,
            event.entity_id(),
            event.event_type(),
            payload,
            at,
        ));
    }
}

/// Authoritative auction store with a co-located outbox table.
///
/// Each mutation and its outbox row are written under a single write lock:
/// either both become visible or neither does. Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct AuctionStore {
    state: Arc<RwLock<State>>,
    clock: Arc<MonotonicClock>,
}

/// Serialize the event for the outbox before anything is mutated.
fn encode(event: &SyncEvent) -> Result<String, EntityError> {
    let bytes = event.encode()?;
    String::from_utf8(bytes).map_err(|e| EntityError::Serialization(e.to_string()))
}

impl AuctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, EntityError> {
        self.state
            .read()
            .map_err(|_| EntityError::LockPoisoned("read"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, EntityError> {
        self.state
            .write()
            .map_err(|_| EntityError::LockPoisoned("write"))
    }

    pub fn create(&self, input: NewAuction, seller: &str) -> Result<Auction, EntityError> {
        let mut state = self.write()?;
        let now = self.clock.now();

        let auction = Auction {
            id: Uuid::new_v4(),
            reserve_price: input.reserve_price,
            seller: seller.to_string(),
            winner: None,
            sold_amount: None,
            current_high_bid: None,
            created_at: now,
            updated_at: now,
            auction_end: input.auction_end,
            status: AuctionStatus::Live,
            item: Item {
                make: input.make,
                model: input.model,
                year: input.year,
                color: input.color,
                mileage: input.mileage,
                image_url: input.image_url,
            },
        };

        let event = SyncEvent::Created(auction.to_snapshot());
        let payload = encode(&event)?;

        state.auctions.insert(auction.id, auction.clone());
        state.stage(&event, payload, now);

        info!(auction_id = %auction.id, seller, "auction created");
        Ok(auction)
    }

    pub fn update(&self, id: Uuid, patch: &AuctionPatch) -> Result<Auction, EntityError> {
        let mut state = self.write()?;

        let mut auction = state
            .auctions
            .get(&id)
            .cloned()
            .ok_or(EntityError::NotFound(id))?;

        if !patch.apply(&mut auction.item) {
            return Err(EntityError::NoChanges(id));
        }

        let now = self.clock.now();
        auction.updated_at = now;

        let event = SyncEvent::Updated(auction.to_snapshot());
        let payload = encode(&event)?;

        state.auctions.insert(id, auction.clone());
        state.stage(&event, payload, now);

        info!(auction_id = %id, "auction updated");
        Ok(auction)
    }

    pub fn delete(&self, id: Uuid) -> Result<(), EntityError> {
        let mut state = self.write()?;

        if !state.auctions.contains_key(&id) {
            return Err(EntityError::NotFound(id));
        }

        let now = self.clock.now();
        let event = SyncEvent::Deleted(DeletedAuction { id, updated_at: now });
        let payload = encode(&event)?;

        state.auctions.remove(&id);
        state.stage(&event, payload, now);

        info!(auction_id = %id, "auction deleted");
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Auction>, EntityError> {
        Ok(self.read()?.auctions.get(&id).cloned())
    }

    pub fn len(&self) -> Result<usize, EntityError> {
        Ok(self.read()?.auctions.len())
    }

    pub fn is_empty(&self) -> Result<bool, EntityError> {
        Ok(self.len()? == 0)
    }

    /// Snapshots of every auction with `updated_at` strictly after `since`
    /// (all auctions when `since` is `None`), oldest first.
    pub fn changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuctionSnapshot>, EntityError> {
        let state = self.read()?;
        let mut snapshots: Vec<AuctionSnapshot> = state
            .auctions
            .values()
            .filter(|auction| since.map_or(true, |since| auction.updated_at > since))
            .map(Auction::to_snapshot)
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.updated_at);

        debug!(since = ?since, count = snapshots.len(), "delta query");
        Ok(snapshots)
    }
}

impl OutboxStore for AuctionStore {
    fn claim_pending(
        &self,
        worker_id: &str,
        max: usize,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxMessage>, OutboxError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| OutboxError::LockPoisoned("claim"))?;
        Ok(claim_rows(&mut state.outbox, worker_id, max, lease, now))
    }

    fn mark_delivered(
        &self,
        id: u64,
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, OutboxError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| OutboxError::LockPoisoned("mark delivered"))?;
        Ok(with_held_row(&mut state.outbox, id, worker_id, |row| {
            row.complete(at)
        }))
    }

    fn release(
        &self,
        id: u64,
        worker_id: &str,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<bool, OutboxError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| OutboxError::LockPoisoned("release"))?;
        Ok(with_held_row(&mut state.outbox, id, worker_id, |row| {
            row.release(error, retry_at)
        }))
    }

    fn unclaim(
        &self,
        id: u64,
        worker_id: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<bool, OutboxError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| OutboxError::LockPoisoned("unclaim"))?;
        Ok(with_held_row(&mut state.outbox, id, worker_id, |row| {
            row.unclaim(retry_at)
        }))
    }

    fn purge_delivered(&self, before: DateTime<Utc>) -> Result<usize, OutboxError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| OutboxError::LockPoisoned("purge"))?;
        Ok(purge_rows(&mut state.outbox, before))
    }

    fn outbox_messages(&self) -> Result<Vec<OutboxMessage>, OutboxError> {
        let state = self
            .state
            .read()
            .map_err(|_| OutboxError::LockPoisoned("read"))?;
        Ok(state.outbox.clone())
    }
}
