//! Publisher and subscriber traits for the transport.

use std::time::Duration;

use async_trait::async_trait;

use super::Message;

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("message rejected: {0}")]
    Rejected(String),
    #[error("publish timeout")]
    Timeout,
    #[error("unknown delivery: {0}")]
    UnknownDelivery(String),
}

/// Publishes messages to a durable transport.
///
/// `Ok(())` means the transport acknowledged the message.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish a single message to the given destination.
    async fn publish(&self, destination: &str, message: Message) -> Result<(), PublishError>;
}

/// Pull-based subscription with explicit acknowledgement.
///
/// Unacknowledged messages are redelivered, which gives at-least-once delivery.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Wait up to `timeout` for the next message.
    async fn poll(&self, timeout: Duration) -> Result<Option<Message>, PublishError>;

    /// Acknowledge that a message has been handled.
    async fn ack(&self, message_id: &str) -> Result<(), PublishError>;

    /// Return a message for redelivery.
    async fn nack(&self, message_id: &str, reason: &str) -> Result<(), PublishError>;
}
