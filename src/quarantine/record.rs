use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bus::Message;

/// A message that was pulled off the active path after exhausting its retry
/// budget. Kept verbatim so an operator can inspect and replay it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineRecord {
    pub message_id: String,
    pub event_type: String,
    /// Raw payload bytes, base64 on the wire
    #[serde(with = "payload_serde")]
    pub original_payload: Vec<u8>,
    #[serde(default)]
    pub metadata: Vec<(String, String)>,
    /// Human readable cause of the last failure
    pub reason: String,
    /// Stable label, e.g. `malformed_payload` or `store_unavailable`
    pub reason_kind: String,
    pub attempt_count: u32,
    pub first_failed_at: DateTime<Utc>,
    pub quarantined_at: DateTime<Utc>,
}

impl QuarantineRecord {
    pub fn new(
        message: &Message,
        reason_kind: &str,
        reason: impl Into<String>,
        attempt_count: u32,
        first_failed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: message.id.clone(),
            event_type: message.event_type.clone(),
            original_payload: message.payload.clone(),
            metadata: message.metadata.clone(),
            reason: reason.into(),
            reason_kind: reason_kind.to_string(),
            attempt_count,
            first_failed_at,
            quarantined_at: Utc::now(),
        }
    }

    /// Payload as text, for display. `None` when it is not valid UTF-8.
    pub fn payload_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.original_payload).ok()
    }

    /// Rebuild the transport message for a replay.
    pub fn to_message(&self) -> Message {
        let mut message = Message::new(
            self.message_id.clone(),
            self.event_type.clone(),
            self.original_payload.clone(),
        );
        message.metadata = self.metadata.clone();
        message
    }
}

mod payload_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(payload).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(&encoded).map_err(serde::de::Error::custom)
    }
}
