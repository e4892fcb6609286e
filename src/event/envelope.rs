use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EventError;

/// Kind of change an event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

impl EventType {
    pub const ALL: [EventType; 3] = [EventType::Created, EventType::Updated, EventType::Deleted];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "Created",
            EventType::Updated => "Updated",
            EventType::Deleted => "Deleted",
        }
    }

    /// Transport destination for this event type. Consumers subscribe by type.
    pub fn destination(&self) -> &'static str {
        match self {
            EventType::Created => "search-auction-created",
            EventType::Updated => "search-auction-updated",
            EventType::Deleted => "search-auction-deleted",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(EventType::Created),
            "Updated" => Ok(EventType::Updated),
            "Deleted" => Ok(EventType::Deleted),
            other => Err(EventError::UnknownEventType(other.to_string())),
        }
    }
}

/// Publish envelope: `{"eventType": ..., "payload": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub event_type: EventType,
    pub payload: Value,
}

impl Envelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(EventError::malformed)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(EventError::malformed)
    }
}
