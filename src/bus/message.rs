/// Metadata key carrying the identity of the entity an event is about.
pub const ENTITY_ID_HEADER: &str = "entity-id";

/// A message travelling through the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Unique identifier for this message (the outbox message id on publish)
    pub id: String,
    /// Declared event type (e.g., "Created", "Deleted")
    pub event_type: String,
    /// Serialized envelope
    pub payload: Vec<u8>,
    /// Headers such as the entity id
    pub metadata: Vec<(String, String)>,
    /// How many times the transport has handed this message out, starting at 1
    pub delivery_count: u32,
}

impl Message {
    pub fn new(id: impl Into<String>, event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload,
            metadata: Vec::new(),
            delivery_count: 0,
        }
    }

    pub fn with_string_payload(
        id: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::new(id, event_type, payload.into().into_bytes())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.header(ENTITY_ID_HEADER)
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
