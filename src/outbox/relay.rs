//! Outbox relay
//!
//! Background loop that reads undelivered outbox rows, publishes them to the
//! transport and marks them delivered once the transport acknowledges.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{OutboxError, OutboxStore};
use crate::backoff::{self, BackoffConfig};
use crate::bus::Publisher;
use crate::clock::add_duration;
use crate::runtime::ShutdownSignal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    /// How often to poll when the previous batch was not full
    pub poll_interval_seconds: f64,
    /// Maximum rows claimed per drain
    pub batch_size: usize,
    /// How long a claim is held before another relay may take it over
    pub lease_seconds: f64,
    /// Delay before a row that failed to publish is retried
    pub backoff: BackoffConfig,
    /// How long delivered rows are kept before they are purged
    pub retention_seconds: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 10.0,
            batch_size: 100,
            lease_seconds: 60.0,
            backoff: BackoffConfig::default(),
            retention_seconds: 3600.0,
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        backoff::seconds(self.poll_interval_seconds)
    }

    pub fn lease(&self) -> Duration {
        backoff::seconds(self.lease_seconds)
    }

    pub fn retention(&self) -> Duration {
        backoff::seconds(self.retention_seconds)
    }
}

/// Result of one drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainResult {
    pub claimed: usize,
    pub published: usize,
    /// Rows whose publish failed and were released for a later retry.
    pub released: usize,
    /// Rows handed back unpublished because an earlier row of the same entity failed.
    pub deferred: usize,
}

/// Totals over the lifetime of a running relay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub polls: usize,
    pub published: usize,
    pub failed: usize,
    /// Delivered rows removed after the retention window
    pub purged: usize,
}

/// Publishes staged outbox rows to the transport.
pub struct OutboxRelay<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
    config: RelayConfig,
    worker_id: String,
}

impl<S, P> OutboxRelay<S, P> {
    pub fn new(store: Arc<S>, publisher: Arc<P>, config: RelayConfig) -> Self {
        Self {
            store,
            publisher,
            config,
            worker_id: format!("relay-{}-{}", std::process::id(), Uuid::new_v4()),
        }
    }

    /// Set the worker ID (used for lease ownership).
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

impl<S: OutboxStore, P: Publisher> OutboxRelay<S, P> {
    /// Claim due rows, publish them and record the outcome of each.
    ///
    /// A failed publish never drops a row: it goes back to pending with its
    /// attempt count incremented and a backoff delay before the next try.
    pub async fn drain_once(&self) -> Result<DrainResult, OutboxError> {
        let claimed = self.store.claim_pending(
            &self.worker_id,
            self.config.batch_size,
            self.config.lease(),
            Utc::now(),
        )?;

        let mut result = DrainResult {
            claimed: claimed.len(),
            ..Default::default()
        };
        if claimed.is_empty() {
            return Ok(result);
        }

        debug!(worker_id = %self.worker_id, count = claimed.len(), "claimed outbox rows");

        let mut failed_entities: HashMap<Uuid, DateTime<Utc>> = HashMap::new();

        for message in claimed {
            if let Some(retry_at) = failed_entities.get(&message.entity_id) {
                self.store.unclaim(message.id, &self.worker_id, *retry_at)?;
                result.deferred += 1;
                continue;
            }

            let destination = message.event_type.destination();
            match self
                .publisher
                .publish(destination, message.to_transport())
                .await
            {
                Ok(()) => {
                    if self
                        .store
                        .mark_delivered(message.id, &self.worker_id, Utc::now())?
                    {
                        result.published += 1;
                        debug!(
                            outbox_id = message.id,
                            entity_id = %message.entity_id,
                            event_type = %message.event_type,
                            destination,
                            "outbox row delivered"
                        );
                    } else {
                        // Lease expired mid-publish; another relay will publish it again.
                        warn!(outbox_id = message.id, "lost lease on published outbox row");
                    }
                }
                Err(err) => {
                    let attempt = message.attempt_count.saturating_add(1);
                    let delay = self.config.backoff.delay(attempt);
                    let retry_at = add_duration(Utc::now(), delay);
                    warn!(
                        outbox_id = message.id,
                        entity_id = %message.entity_id,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "publish failed, backing off"
                    );
                    self.store
                        .release(message.id, &self.worker_id, &err.to_string(), retry_at)?;
                    failed_entities.insert(message.entity_id, retry_at);
                    result.released += 1;
                }
            }
        }

        Ok(result)
    }

    /// Remove rows delivered longer ago than the retention window.
    pub fn purge_delivered(&self) -> Result<usize, OutboxError> {
        let before = TimeDelta::from_std(self.config.retention())
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));
        match before {
            Some(before) => self.store.purge_delivered(before),
            None => Ok(0),
        }
    }

    /// Drain until shutdown is requested.
    ///
    /// Shutdown is observed between drains, so every claimed row is either
    /// delivered or released before the loop exits.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> RelayStats {
        info!(worker_id = %self.worker_id, "outbox relay starting");
        let mut stats = RelayStats::default();

        loop {
            if shutdown.is_triggered() {
                break;
            }

            stats.polls += 1;
            let batch_full = match self.drain_once().await {
                Ok(result) => {
                    stats.published += result.published;
                    stats.failed += result.released;
                    result.claimed >= self.config.batch_size && result.released == 0
                }
                Err(err) => {
                    error!(worker_id = %self.worker_id, error = %err, "outbox drain failed");
                    false
                }
            };

            if batch_full {
                continue;
            }

            match self.purge_delivered() {
                Ok(0) => {}
                Ok(purged) => {
                    stats.purged += purged;
                    debug!(worker_id = %self.worker_id, purged, "purged delivered outbox rows");
                }
                Err(err) => warn!(worker_id = %self.worker_id, error = %err, "outbox purge failed"),
            }

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        info!(
            worker_id = %self.worker_id,
            published = stats.published,
            failed = stats.failed,
            "outbox relay stopped"
        );
        stats
    }
}
