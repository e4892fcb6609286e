use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ProjectionRecord, Watermark};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("projection store unavailable: {0}")]
    Unavailable(String),
    #[error("projection store lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The store already holds this or a newer version. Not an error.
    Skipped,
}

/// Projection storage with watermark-guarded writes.
///
/// The compare against the stored watermark and the write happen atomically,
/// so concurrent writers to one identity cannot lose a newer update.
pub trait ProjectionStore: Send + Sync {
    fn get(&self, id: Uuid) -> Result<Option<ProjectionRecord>, StoreError>;

    /// Write `record` unless a record (or delete) with an equal or newer
    /// watermark is already stored.
    fn upsert_if_newer(&self, record: ProjectionRecord) -> Result<ApplyOutcome, StoreError>;

    /// Remove the record unless a newer update is stored.
    fn delete_if_not_newer(
        &self,
        id: Uuid,
        watermark: DateTime<Utc>,
    ) -> Result<ApplyOutcome, StoreError>;

    /// Maximum `updated_at` across stored records.
    fn watermark(&self) -> Result<Watermark, StoreError>;

    fn records(&self) -> Result<Vec<ProjectionRecord>, StoreError>;

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records()?.len())
    }

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}
