//! Consumer side of the transport.
//!
//! [`Consumer::handle`] turns one delivery into a projection write, retrying
//! transient store faults on a fixed interval and handing anything it cannot
//! apply to the [`FaultRouter`]. [`Consumer::run`] feeds deliveries into
//! per-entity lanes so two events for the same auction are never applied
//! concurrently.

mod lanes;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backoff;
use crate::bus::Message;
use crate::event::SyncEvent;
use crate::projection::{ApplyError, ApplyOutcome, ProjectionStore, Projector};
use crate::quarantine::{FaultRouter, QuarantineError, QuarantineStore};

pub use lanes::lane_for;

/// Fixed-interval retry budget for transient apply failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub interval_seconds: f64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5.0,
            max_attempts: 5,
        }
    }
}

impl RetryConfig {
    pub fn interval(&self) -> Duration {
        backoff::seconds(self.interval_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsumerConfig {
    pub retry: RetryConfig,
    /// Number of sequential lanes deliveries are spread over
    pub lanes: usize,
    /// How long one poll waits for a delivery
    pub poll_timeout_seconds: f64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            lanes: 4,
            poll_timeout_seconds: 1.0,
        }
    }
}

impl ConsumerConfig {
    pub fn poll_timeout(&self) -> Duration {
        backoff::seconds(self.poll_timeout_seconds)
    }
}

/// What happened to a delivery. Every variant is acked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Applied,
    /// Stale or duplicate; the projection already had it.
    Skipped,
    Quarantined,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: usize,
    pub applied: usize,
    pub skipped: usize,
    pub quarantined: usize,
    /// Deliveries handed back to the transport because quarantine itself failed.
    pub redelivered: usize,
}

impl ConsumerStats {
    fn record(&mut self, outcome: HandleOutcome) {
        match outcome {
            HandleOutcome::Applied => self.applied += 1,
            HandleOutcome::Skipped => self.skipped += 1,
            HandleOutcome::Quarantined => self.quarantined += 1,
        }
    }

    fn merge(&mut self, other: ConsumerStats) {
        self.received += other.received;
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.quarantined += other.quarantined;
        self.redelivered += other.redelivered;
    }
}

pub struct Consumer<S, Q> {
    projector: Projector<S>,
    router: Arc<FaultRouter<Q>>,
    config: ConsumerConfig,
}

impl<S: ProjectionStore, Q: QuarantineStore> Consumer<S, Q> {
    pub fn new(projector: Projector<S>, router: Arc<FaultRouter<Q>>, config: ConsumerConfig) -> Self {
        Self {
            projector,
            router,
            config,
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<FaultRouter<Q>> {
        &self.router
    }

    /// Transport destinations this consumer needs a subscription to.
    pub fn destinations(&self) -> Vec<&'static str> {
        self.projector
            .event_types()
            .into_iter()
            .map(|t| t.destination())
            .collect()
    }

    /// Process one delivery to completion.
    ///
    /// Only a failure to record the quarantine is returned as an error; the
    /// caller should then leave the message to be redelivered.
    pub async fn handle(&self, message: &Message) -> Result<HandleOutcome, QuarantineError> {
        let event = match SyncEvent::decode_declared(&message.event_type, &message.payload) {
            Ok(event) => event,
            Err(err) => {
                let err = ApplyError::from(err);
                self.router
                    .quarantine(message, err.kind(), &err.to_string(), 1, Utc::now())?;
                return Ok(HandleOutcome::Quarantined);
            }
        };

        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut first_failed_at = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.projector.apply(&event) {
                Ok(ApplyOutcome::Applied) => return Ok(HandleOutcome::Applied),
                Ok(ApplyOutcome::Skipped) => {
                    debug!(message_id = %message.id, "stale or duplicate delivery skipped");
                    return Ok(HandleOutcome::Skipped);
                }
                Err(err) => err,
            };

            let first = *first_failed_at.get_or_insert_with(Utc::now);
            if err.is_transient() && attempt < max_attempts {
                warn!(
                    message_id = %message.id,
                    auction_id = %event.entity_id(),
                    attempt,
                    max_attempts,
                    error = %err,
                    "apply failed, retrying"
                );
                tokio::time::sleep(self.config.retry.interval()).await;
                continue;
            }

            self.router
                .quarantine(message, err.kind(), &err.to_string(), attempt, first)?;
            return Ok(HandleOutcome::Quarantined);
        }
    }
}
