use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::{Message, ENTITY_ID_HEADER};
use crate::event::EventType;

/// Delivery state of an outbox row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    InFlight,
    Delivered,
}

/// A staged event, committed in the same transaction as the mutation it describes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Row sequence, local to the store.
    pub id: u64,
    /// Transport message id, unique across stores and restarts.
    pub message_id: Uuid,
    pub entity_id: Uuid,
    pub event_type: EventType,
    /// Serialized [`Envelope`](crate::event::Envelope).
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub status: OutboxStatus,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl OutboxMessage {
    pub fn new(
        id: u64,
        entity_id: Uuid,
        event_type: EventType,
        payload: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            message_id: Uuid::new_v4(),
            entity_id,
            event_type,
            payload: payload.into(),
            created_at,
            delivered_at: None,
            attempt_count: 0,
            status: OutboxStatus::Pending,
            locked_by: None,
            locked_until: None,
            next_attempt_at: created_at,
            last_error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OutboxStatus::Pending
    }

    pub fn is_in_flight(&self) -> bool {
        self.status == OutboxStatus::InFlight
    }

    pub fn is_delivered(&self) -> bool {
        self.status == OutboxStatus::Delivered
    }

    /// Pending and due, or in flight with an expired lease.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            OutboxStatus::Pending => self.next_attempt_at <= now,
            OutboxStatus::InFlight => self.locked_until.map(|until| until <= now).unwrap_or(true),
            OutboxStatus::Delivered => false,
        }
    }

    pub fn is_held_by(&self, worker_id: &str) -> bool {
        self.is_in_flight() && self.locked_by.as_deref() == Some(worker_id)
    }

    pub fn claim(&mut self, worker_id: &str, until: DateTime<Utc>) {
        self.status = OutboxStatus::InFlight;
        self.locked_by = Some(worker_id.to_string());
        self.locked_until = Some(until);
    }

    pub fn complete(&mut self, at: DateTime<Utc>) {
        if self.is_in_flight() {
            self.status = OutboxStatus::Delivered;
            self.delivered_at = Some(at);
            self.locked_by = None;
            self.locked_until = None;
            self.last_error = None;
        }
    }

    /// Return to pending after a failed publish.
    pub fn release(&mut self, error: &str, retry_at: DateTime<Utc>) {
        if self.is_in_flight() {
            self.attempt_count = self.attempt_count.saturating_add(1);
            self.last_error = Some(error.to_string());
            self.unlock(retry_at);
        }
    }

    /// Return to pending without counting an attempt.
    pub fn unclaim(&mut self, retry_at: DateTime<Utc>) {
        if self.is_in_flight() {
            self.unlock(retry_at);
        }
    }

    fn unlock(&mut self, retry_at: DateTime<Utc>) {
        self.status = OutboxStatus::Pending;
        self.locked_by = None;
        self.locked_until = None;
        self.next_attempt_at = retry_at;
    }

    /// Transport message for this row, identified by `message_id`.
    pub fn to_transport(&self) -> Message {
        Message::with_string_payload(
            self.message_id.to_string(),
            self.event_type.as_str(),
            self.payload.clone(),
        )
        .with_metadata(ENTITY_ID_HEADER, self.entity_id.to_string())
    }
}
