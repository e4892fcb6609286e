//! InMemoryProjectionStore - HashMap-backed projection store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use super::search::{self, SearchPage, SearchParams};
use super::{ApplyOutcome, ProjectionRecord, ProjectionStore, StoreError, Watermark};

#[derive(Default)]
struct State {
    records: HashMap<Uuid, ProjectionRecord>,
    /// Watermark of the last applied delete per identity.
    tombstones: HashMap<Uuid, DateTime<Utc>>,
}

/// How long a delete tombstone is kept by default.
pub const DEFAULT_TOMBSTONE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// In-memory projection store.
///
/// Deletes leave a tombstone so a late, older Created or Updated for the same
/// identity cannot bring the record back. Tombstones do not count toward the
/// store watermark. They are dropped once they fall more than the retention
/// window behind the newest delete. Clone-friendly via Arc.
#[derive(Clone)]
pub struct InMemoryProjectionStore {
    state: Arc<RwLock<State>>,
    tombstone_retention: TimeDelta,
}

impl Default for InMemoryProjectionStore {
    fn default() -> Self {
        Self::with_tombstone_retention(DEFAULT_TOMBSTONE_RETENTION)
    }
}

impl InMemoryProjectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tombstone_retention(retention: Duration) -> Self {
        Self {
            state: Arc::default(),
            tombstone_retention: TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Drop tombstones of deletes at or before `before`. Returns how many went.
    pub fn purge_tombstones(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut state = self.write()?;
        Ok(prune(&mut state.tombstones, before))
    }

    pub fn tombstone_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.tombstones.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))
    }

    /// Full-text, filtered and paged query over the projection.
    pub fn search(&self, params: &SearchParams) -> Result<SearchPage, StoreError> {
        let state = self.read()?;
        Ok(search::search(state.records.values(), params, Utc::now()))
    }
}

impl ProjectionStore for InMemoryProjectionStore {
    fn get(&self, id: Uuid) -> Result<Option<ProjectionRecord>, StoreError> {
        Ok(self.read()?.records.get(&id).cloned())
    }

    fn upsert_if_newer(&self, record: ProjectionRecord) -> Result<ApplyOutcome, StoreError> {
        let mut state = self.write()?;

        if let Some(deleted_at) = state.tombstones.get(&record.id) {
            if *deleted_at >= record.updated_at {
                return Ok(ApplyOutcome::Skipped);
            }
        }
        if let Some(existing) = state.records.get(&record.id) {
            if existing.updated_at >= record.updated_at {
                return Ok(ApplyOutcome::Skipped);
            }
        }

        state.tombstones.remove(&record.id);
        state.records.insert(record.id, record);
        Ok(ApplyOutcome::Applied)
    }

    fn delete_if_not_newer(
        &self,
        id: Uuid,
        watermark: DateTime<Utc>,
    ) -> Result<ApplyOutcome, StoreError> {
        let mut state = self.write()?;

        if let Some(existing) = state.records.get(&id) {
            if existing.updated_at > watermark {
                return Ok(ApplyOutcome::Skipped);
            }
        }
        if let Some(deleted_at) = state.tombstones.get(&id) {
            if *deleted_at >= watermark {
                return Ok(ApplyOutcome::Skipped);
            }
        }

        state.records.remove(&id);
        state.tombstones.insert(id, watermark);
        if let Some(cutoff) = watermark.checked_sub_signed(self.tombstone_retention) {
            prune(&mut state.tombstones, cutoff);
        }
        Ok(ApplyOutcome::Applied)
    }

    fn watermark(&self) -> Result<Watermark, StoreError> {
        Ok(self
            .read()?
            .records
            .values()
            .map(|record| record.updated_at)
            .max()
            .map(Watermark::at)
            .unwrap_or_else(Watermark::beginning))
    }

    fn records(&self) -> Result<Vec<ProjectionRecord>, StoreError> {
        Ok(self.read()?.records.values().cloned().collect())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.records.len())
    }
}

fn prune(tombstones: &mut HashMap<Uuid, DateTime<Utc>>, before: DateTime<Utc>) -> usize {
    let count = tombstones.len();
    tombstones.retain(|_, deleted_at| *deleted_at > before);
    count - tombstones.len()
}
