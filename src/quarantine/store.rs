use std::sync::{Arc, RwLock};

use super::{QuarantineError, QuarantineRecord};

/// Storage for quarantined messages, keyed by message id.
pub trait QuarantineStore: Send + Sync {
    /// Store `record` unless one with the same message id exists.
    /// Returns `false` when the record was already there, and
    /// [`QuarantineError::Conflict`] when that id holds a different payload.
    fn insert(&self, record: QuarantineRecord) -> Result<bool, QuarantineError>;

    fn get(&self, message_id: &str) -> Result<Option<QuarantineRecord>, QuarantineError>;

    /// All records, oldest first.
    fn list(&self) -> Result<Vec<QuarantineRecord>, QuarantineError>;

    fn remove(&self, message_id: &str) -> Result<Option<QuarantineRecord>, QuarantineError>;

    fn len(&self) -> Result<usize, QuarantineError> {
        Ok(self.list()?.len())
    }

    fn is_empty(&self) -> Result<bool, QuarantineError> {
        Ok(self.len()? == 0)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryQuarantineStore {
    records: Arc<RwLock<Vec<QuarantineRecord>>>,
}

impl InMemoryQuarantineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuarantineStore for InMemoryQuarantineStore {
    fn insert(&self, record: QuarantineRecord) -> Result<bool, QuarantineError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| QuarantineError::LockPoisoned("insert"))?;
        if let Some(existing) = records.iter().find(|r| r.message_id == record.message_id) {
            if existing.original_payload != record.original_payload {
                return Err(QuarantineError::Conflict(record.message_id));
            }
            return Ok(false);
        }
        records.push(record);
        Ok(true)
    }

    fn get(&self, message_id: &str) -> Result<Option<QuarantineRecord>, QuarantineError> {
        let records = self
            .records
            .read()
            .map_err(|_| QuarantineError::LockPoisoned("read"))?;
        Ok(records.iter().find(|r| r.message_id == message_id).cloned())
    }

    fn list(&self) -> Result<Vec<QuarantineRecord>, QuarantineError> {
        let records = self
            .records
            .read()
            .map_err(|_| QuarantineError::LockPoisoned("read"))?;
        Ok(records.clone())
    }

    fn remove(&self, message_id: &str) -> Result<Option<QuarantineRecord>, QuarantineError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| QuarantineError::LockPoisoned("remove"))?;
        let position = records.iter().position(|r| r.message_id == message_id);
        Ok(position.map(|i| records.remove(i)))
    }
}
