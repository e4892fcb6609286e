use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entity::AuctionStore;
use crate::event::AuctionSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("authoritative source unavailable: {0}")]
    Unavailable(String),
    #[error("authoritative source answered with status {0}")]
    Status(u16),
    #[error("could not decode delta response: {0}")]
    Decode(String),
}

/// The service that owns the auctions, queried directly for catch-up.
#[async_trait]
pub trait AuthoritativeSource: Send + Sync {
    /// Every auction with `updated_at` strictly after `since`; all of them
    /// when `since` is `None`.
    async fn changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuctionSnapshot>, SourceError>;
}

/// In-process source for deployments that embed the write side.
#[async_trait]
impl AuthoritativeSource for AuctionStore {
    async fn changed_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuctionSnapshot>, SourceError> {
        AuctionStore::changed_since(self, since).map_err(|e| SourceError::Unavailable(e.to_string()))
    }
}
