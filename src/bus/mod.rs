//! Transport abstractions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  publish(destination, msg)  ┌────────────────────┐
//! │ OutboxRelay  │ ──────────────────────────▶ │     Transport      │
//! └──────────────┘                             │ (at-least-once)    │
//!                                              └────────────────────┘
//!                                                        │ poll / ack / nack
//!                                                        ▼
//!                                              ┌────────────────────┐
//!                                              │     Consumer       │
//!                                              └────────────────────┘
//! ```
//!
//! One destination per event type; consumers subscribe by type. Anything
//! implementing [`Publisher`] and [`Subscriber`] (RabbitMQ, NATS, Kafka, ...)
//! can replace the bundled [`InMemoryTransport`].

mod in_memory;
mod message;
mod publisher;

pub use in_memory::{InMemorySubscription, InMemoryTransport, DEFAULT_HISTORY_LIMIT};
pub use message::{Message, ENTITY_ID_HEADER};
pub use publisher::{PublishError, Publisher, Subscriber};
