use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::OutboxMessage;
use crate::clock::add_duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutboxError {
    #[error("outbox lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("outbox storage error: {0}")]
    Storage(String),
}

/// Durable outbox table, co-located with the authoritative entity store.
///
/// Claims are exclusive: a row claimed by one worker is not handed to another
/// until the lease expires, so concurrent relays publish disjoint rows.
pub trait OutboxStore: Send + Sync {
    /// Claim up to `max` due rows in creation order.
    fn claim_pending(
        &self,
        worker_id: &str,
        max: usize,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxMessage>, OutboxError>;

    /// Mark a row delivered. Returns false if `worker_id` no longer holds it.
    fn mark_delivered(
        &self,
        id: u64,
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, OutboxError>;

    /// Return a row to pending after a failed publish, counting the attempt.
    fn release(
        &self,
        id: u64,
        worker_id: &str,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> Result<bool, OutboxError>;

    /// Return a row to pending without counting an attempt.
    fn unclaim(&self, id: u64, worker_id: &str, retry_at: DateTime<Utc>)
        -> Result<bool, OutboxError>;

    /// Drop delivered rows whose `delivered_at` is at or before `before`.
    /// Returns the number of rows removed.
    fn purge_delivered(&self, before: DateTime<Utc>) -> Result<usize, OutboxError>;

    /// Snapshot of every row, in creation order.
    fn outbox_messages(&self) -> Result<Vec<OutboxMessage>, OutboxError>;

    fn undelivered_count(&self) -> Result<usize, OutboxError> {
        Ok(self
            .outbox_messages()?
            .iter()
            .filter(|m| !m.is_delivered())
            .count())
    }
}

/// Claim rows from a creation-ordered table.
///
/// Once a row of some entity is skipped (not due, or leased elsewhere), later
/// rows of the same entity are skipped too, so one relay never publishes an
/// entity's events out of order.
pub(crate) fn claim_rows(
    rows: &mut [OutboxMessage],
    worker_id: &str,
    max: usize,
    lease: Duration,
    now: DateTime<Utc>,
) -> Vec<OutboxMessage> {
    let until = add_duration(now, lease);
    let mut blocked: HashSet<Uuid> = HashSet::new();
    let mut claimed = Vec::new();

    for row in rows.iter_mut() {
        if claimed.len() >= max {
            break;
        }
        if row.is_delivered() {
            continue;
        }
        if blocked.contains(&row.entity_id) || !row.is_claimable(now) {
            blocked.insert(row.entity_id);
            continue;
        }

        row.claim(worker_id, until);
        claimed.push(row.clone());
    }

    claimed
}

/// Remove delivered rows older than `before` from a creation-ordered table.
pub(crate) fn purge_rows(rows: &mut Vec<OutboxMessage>, before: DateTime<Utc>) -> usize {
    let count = rows.len();
    rows.retain(|row| !row.delivered_at.is_some_and(|at| at <= before));
    count - rows.len()
}

/// Apply `f` to the row `id` if `worker_id` holds it.
pub(crate) fn with_held_row(
    rows: &mut [OutboxMessage],
    id: u64,
    worker_id: &str,
    f: impl FnOnce(&mut OutboxMessage),
) -> bool {
    match rows.iter_mut().find(|row| row.id == id) {
        Some(row) if row.is_held_by(worker_id) => {
            f(row);
            true
        }
        _ => false,
    }
}
