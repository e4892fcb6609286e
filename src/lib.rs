//! Keeps a search projection of auctions eventually consistent with the
//! authoritative auction store.
//!
//! ```text
//! AuctionStore ──(same lock)──▶ outbox rows ──▶ OutboxRelay ──▶ transport
//!                                                                  │
//!             Reconciler ◀── delta query ── authoritative service  ▼
//!                  │                                          Consumer
//!                  └──────────────▶ Projector ◀────────────────────┘
//!                                      │            (failures ▶ FaultRouter)
//!                                      ▼
//!                              ProjectionStore
//! ```

pub mod backoff;
pub mod bus;
pub mod clock;
pub mod config;
pub mod consumer;
pub mod entity;
pub mod event;
#[cfg(feature = "http")]
pub mod http;
pub mod logging;
pub mod outbox;
pub mod projection;
pub mod quarantine;
pub mod reconcile;
pub mod runtime;

pub use backoff::BackoffConfig;
pub use bus::{InMemorySubscription, InMemoryTransport, Message, PublishError, Publisher, Subscriber};
pub use config::{ConfigError, SyncConfig};
pub use consumer::{Consumer, ConsumerConfig, ConsumerStats, HandleOutcome, RetryConfig};
pub use entity::{Auction, AuctionPatch, AuctionStore, EntityError, NewAuction};
pub use event::{AuctionSnapshot, EventError, EventType, SyncEvent};
pub use outbox::{DrainResult, OutboxError, OutboxMessage, OutboxRelay, OutboxStatus, OutboxStore, RelayConfig, RelayStats};
pub use projection::{
    ApplyError, ApplyOutcome, InMemoryProjectionStore, ProjectionRecord, ProjectionStore, Projector,
    SearchPage, SearchParams, StoreError, Watermark,
};
pub use quarantine::{FaultRouter, InMemoryQuarantineStore, QuarantineError, QuarantineRecord, QuarantineStore};
#[cfg(feature = "http")]
pub use reconcile::HttpAuthoritativeSource;
pub use reconcile::{
    AuthoritativeSource, CircuitBreaker, ReconcileConfig, ReconcileError, ReconcileReport, Reconciler,
    SourceError,
};
pub use runtime::{shutdown_channel, ProjectorService, RelayHandle, ShutdownSignal, ShutdownTrigger};
