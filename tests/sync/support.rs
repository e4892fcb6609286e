//! Shared fixtures: auction inputs, failure-injecting publisher and projection store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use search_sync::{
    ApplyOutcome, BackoffConfig, ConsumerConfig, InMemoryProjectionStore, InMemoryTransport, Message,
    NewAuction, ProjectionRecord, ProjectionStore, PublishError, Publisher, RelayConfig,
    RetryConfig, StoreError, Watermark,
};
use uuid::Uuid;

pub fn new_auction(make: &str, color: &str) -> NewAuction {
    NewAuction {
        make: make.into(),
        model: "Model".into(),
        year: 2020,
        color: color.into(),
        mileage: 25_000,
        image_url: format!("https://img.example.com/{make}.jpg"),
        reserve_price: 10_000,
        auction_end: Utc::now() + TimeDelta::days(7),
    }
}

pub fn relay_config() -> RelayConfig {
    RelayConfig {
        poll_interval_seconds: 0.02,
        batch_size: 100,
        lease_seconds: 30.0,
        backoff: BackoffConfig::without_jitter(Duration::from_secs(10), Duration::from_secs(300)),
        retention_seconds: 3600.0,
    }
}

pub fn consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        retry: RetryConfig {
            interval_seconds: 0.01,
            max_attempts: 3,
        },
        lanes: 4,
        poll_timeout_seconds: 0.02,
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Publisher that rejects every publish while `down` is set.
#[derive(Clone, Default)]
pub struct FlakyPublisher {
    pub inner: InMemoryTransport,
    down: Arc<AtomicBool>,
    pub attempts: Arc<AtomicUsize>,
}

impl FlakyPublisher {
    pub fn new(inner: InMemoryTransport) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl Publisher for FlakyPublisher {
    async fn publish(&self, destination: &str, message: Message) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(PublishError::ConnectionFailed("broker unreachable".into()));
        }
        self.inner.publish(destination, message).await
    }
}

/// Projection store whose writes fail while it is marked unavailable.
#[derive(Clone, Default)]
pub struct SwitchableStore {
    pub inner: InMemoryProjectionStore,
    unavailable: Arc<AtomicBool>,
}

impl SwitchableStore {
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("projection database down".into()));
        }
        Ok(())
    }
}

impl ProjectionStore for SwitchableStore {
    fn get(&self, id: Uuid) -> Result<Option<ProjectionRecord>, StoreError> {
        self.inner.get(id)
    }

    fn upsert_if_newer(&self, record: ProjectionRecord) -> Result<ApplyOutcome, StoreError> {
        self.check()?;
        self.inner.upsert_if_newer(record)
    }

    fn delete_if_not_newer(
        &self,
        id: Uuid,
        watermark: DateTime<Utc>,
    ) -> Result<ApplyOutcome, StoreError> {
        self.check()?;
        self.inner.delete_if_not_newer(id, watermark)
    }

    fn watermark(&self) -> Result<Watermark, StoreError> {
        self.inner.watermark()
    }

    fn records(&self) -> Result<Vec<ProjectionRecord>, StoreError> {
        self.inner.records()
    }
}
