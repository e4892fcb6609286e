//! Authoritative write side: the auction entity and its store.
//!
//! Mutations commit together with their outbox row. The HTTP CRUD surface,
//! validation and authorization live outside this crate and call into
//! [`AuctionStore`].

mod auction;
mod store;

use uuid::Uuid;

use crate::event::EventError;

pub use auction::{Auction, AuctionPatch, Item, NewAuction};
pub use store::AuctionStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    #[error("auction {0} not found")]
    NotFound(Uuid),
    #[error("no changes to save for auction {0}")]
    NoChanges(Uuid),
    #[error("could not serialize event: {0}")]
    Serialization(String),
    #[error("entity store lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

impl From<EventError> for EntityError {
    fn from(err: EventError) -> Self {
        EntityError::Serialization(err.to_string())
    }
}
