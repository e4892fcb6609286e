//! Quarantine for messages the consumer could not apply.
//!
//! The [`FaultRouter`] records each poisoned message once, counts it per
//! reason label and logs it. Operators list, replay or discard records.

mod record;
mod router;
mod store;

pub use record::QuarantineRecord;
pub use router::FaultRouter;
pub use store::{InMemoryQuarantineStore, QuarantineStore};

use crate::bus::PublishError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuarantineError {
    #[error("no quarantined message with id {0}")]
    NotFound(String),
    #[error("message id {0} is already quarantined with a different payload")]
    Conflict(String),
    #[error("cannot route event type {0}")]
    Unroutable(String),
    #[error("replay failed: {0}")]
    Publish(#[from] PublishError),
    #[error("quarantine store lock poisoned during {0}")]
    LockPoisoned(&'static str),
}
