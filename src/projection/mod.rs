//! The read side: a search projection of auctions.
//!
//! Records are written only through watermark-guarded conditional writes, so
//! the projection converges no matter how often or in which order the
//! transport and the reconciler deliver the same changes.

mod in_memory;
mod projector;
mod record;
pub mod search;
mod store;

pub use in_memory::{InMemoryProjectionStore, DEFAULT_TOMBSTONE_RETENTION};
pub use projector::{ApplyError, Projector};
pub use record::{ProjectionRecord, Watermark};
pub use search::{FilterBy, OrderBy, SearchPage, SearchParams};
pub use store::{ApplyOutcome, ProjectionStore, StoreError};
