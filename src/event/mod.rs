//! Events exchanged between the authoritative store and the projection.
//!
//! An event travels as an [`Envelope`]: the declared [`EventType`] plus a JSON
//! payload. [`SyncEvent`] is the decoded, typed form used by the projector.

mod envelope;
mod snapshot;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use envelope::{Envelope, EventType};
pub use snapshot::{AuctionSnapshot, AuctionStatus, DeletedAuction, SNAPSHOT_VERSION};

/// Error decoding or validating an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("malformed event payload: {0}")]
    Malformed(String),
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
    #[error("declared event type {declared} does not match envelope type {actual}")]
    TypeMismatch { declared: String, actual: EventType },
}

impl EventError {
    pub(crate) fn malformed(err: serde_json::Error) -> Self {
        EventError::Malformed(err.to_string())
    }
}

/// A decoded change to one auction.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    Created(AuctionSnapshot),
    Updated(AuctionSnapshot),
    Deleted(DeletedAuction),
}

impl SyncEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            SyncEvent::Created(_) => EventType::Created,
            SyncEvent::Updated(_) => EventType::Updated,
            SyncEvent::Deleted(_) => EventType::Deleted,
        }
    }

    pub fn entity_id(&self) -> Uuid {
        match self {
            SyncEvent::Created(snapshot) | SyncEvent::Updated(snapshot) => snapshot.id,
            SyncEvent::Deleted(deleted) => deleted.id,
        }
    }

    /// The `updatedAt` of the entity at emission time.
    pub fn watermark(&self) -> DateTime<Utc> {
        match self {
            SyncEvent::Created(snapshot) | SyncEvent::Updated(snapshot) => snapshot.updated_at,
            SyncEvent::Deleted(deleted) => deleted.updated_at,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, EventError> {
        let payload = match self {
            SyncEvent::Created(snapshot) | SyncEvent::Updated(snapshot) => {
                serde_json::to_value(snapshot)
            }
            SyncEvent::Deleted(deleted) => serde_json::to_value(deleted),
        }
        .map_err(EventError::malformed)?;

        Ok(Envelope {
            event_type: self.event_type(),
            payload,
        })
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, EventError> {
        let event = match envelope.event_type {
            EventType::Created => SyncEvent::Created(
                serde_json::from_value(envelope.payload).map_err(EventError::malformed)?,
            ),
            EventType::Updated => SyncEvent::Updated(
                serde_json::from_value(envelope.payload).map_err(EventError::malformed)?,
            ),
            EventType::Deleted => SyncEvent::Deleted(
                serde_json::from_value(envelope.payload).map_err(EventError::malformed)?,
            ),
        };
        Ok(event)
    }

    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        self.to_envelope()?.to_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EventError> {
        Self::from_envelope(Envelope::from_bytes(bytes)?)
    }

    /// Decode and check that the envelope matches the type the transport declared.
    pub fn decode_declared(declared: &str, bytes: &[u8]) -> Result<Self, EventError> {
        let declared_type: EventType = declared.parse()?;
        let envelope = Envelope::from_bytes(bytes)?;
        if envelope.event_type != declared_type {
            return Err(EventError::TypeMismatch {
                declared: declared.to_string(),
                actual: envelope.event_type,
            });
        }
        Self::from_envelope(envelope)
    }
}
