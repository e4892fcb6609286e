//! Transactional outbox: staged events and the relay that publishes them.

mod message;
mod relay;
mod store;

pub use message::{OutboxMessage, OutboxStatus};
pub use relay::{DrainResult, OutboxRelay, RelayConfig, RelayStats};
pub use store::{OutboxError, OutboxStore};

pub(crate) use store::{claim_rows, purge_rows, with_held_row};
