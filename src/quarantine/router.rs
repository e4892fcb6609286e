use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{QuarantineError, QuarantineRecord, QuarantineStore};
use crate::bus::{Message, Publisher};
use crate::event::EventType;

/// Moves poisoned messages into quarantine and exposes operator controls.
///
/// Nothing here retries on its own: a quarantined message only goes back to
/// the transport through [`FaultRouter::replay`].
pub struct FaultRouter<Q> {
    store: Arc<Q>,
    counters: Mutex<BTreeMap<String, u64>>,
}

impl<Q: QuarantineStore> FaultRouter<Q> {
    pub fn new(store: Arc<Q>) -> Self {
        Self {
            store,
            counters: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<Q> {
        &self.store
    }

    /// Quarantine `message`. Returns `false` if it was already quarantined;
    /// the first record is kept and the counter is not bumped again.
    pub fn quarantine(
        &self,
        message: &Message,
        reason_kind: &str,
        reason: &str,
        attempt_count: u32,
        first_failed_at: DateTime<Utc>,
    ) -> Result<bool, QuarantineError> {
        let record =
            QuarantineRecord::new(message, reason_kind, reason, attempt_count, first_failed_at);
        if !self.store.insert(record)? {
            return Ok(false);
        }

        let total = {
            let mut counters = self
                .counters
                .lock()
                .map_err(|_| QuarantineError::LockPoisoned("counters"))?;
            let count = counters.entry(reason_kind.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        warn!(
            message_id = %message.id,
            event_type = %message.event_type,
            entity_id = message.entity_id().unwrap_or("-"),
            reason_kind,
            reason,
            attempt_count,
            total,
            "message quarantined"
        );
        Ok(true)
    }

    /// Number of messages quarantined with `reason_kind` since start.
    pub fn count(&self, reason_kind: &str) -> u64 {
        self.counters
            .lock()
            .map(|c| c.get(reason_kind).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Snapshot of every per-label counter.
    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.counters.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn list(&self) -> Result<Vec<QuarantineRecord>, QuarantineError> {
        self.store.list()
    }

    /// Re-publish the original message to its destination.
    ///
    /// The record leaves the store before the publish, so a replayed message
    /// that fails again is quarantined afresh. A failed publish puts the
    /// record back.
    pub async fn replay<P>(&self, message_id: &str, publisher: &P) -> Result<(), QuarantineError>
    where
        P: Publisher + ?Sized,
    {
        let record = self
            .store
            .get(message_id)?
            .ok_or_else(|| QuarantineError::NotFound(message_id.to_string()))?;

        let event_type: EventType = record
            .event_type
            .parse()
            .map_err(|_| QuarantineError::Unroutable(record.event_type.clone()))?;

        let record = self
            .store
            .remove(message_id)?
            .ok_or_else(|| QuarantineError::NotFound(message_id.to_string()))?;

        if let Err(err) = publisher
            .publish(event_type.destination(), record.to_message())
            .await
        {
            warn!(message_id, error = %err, "replay failed, record kept");
            self.store.insert(record)?;
            return Err(err.into());
        }

        info!(message_id, %event_type, "quarantined message replayed");
        Ok(())
    }

    pub fn discard(&self, message_id: &str) -> Result<QuarantineRecord, QuarantineError> {
        let record = self
            .store
            .remove(message_id)?
            .ok_or_else(|| QuarantineError::NotFound(message_id.to_string()))?;
        info!(message_id, reason_kind = %record.reason_kind, "quarantined message discarded");
        Ok(record)
    }
}
