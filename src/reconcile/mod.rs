//! Catch-up reconciler.
//!
//! Closes gaps the transport left (downtime, lost messages) by asking the
//! authoritative service for everything changed since the projection
//! watermark and applying it through the same idempotent projector.

mod breaker;
#[cfg(feature = "http")]
mod http_source;
mod source;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backoff::{self, BackoffConfig};
use crate::event::{AuctionSnapshot, SyncEvent};
use crate::projection::{
    ApplyError, ApplyOutcome, ProjectionStore, Projector, StoreError, Watermark,
};
use crate::runtime::ShutdownSignal;

pub use breaker::{BreakerState, CircuitBreaker};
#[cfg(feature = "http")]
pub use http_source::HttpAuthoritativeSource;
pub use source::{AuthoritativeSource, SourceError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileConfig {
    /// First retry delay; doubles per attempt
    pub interval_seconds: f64,
    pub max_delay_seconds: f64,
    pub max_attempts: u32,
    /// Overall deadline for fetching the delta; unbounded when absent
    pub max_wait_seconds: Option<f64>,
    pub breaker_threshold: u32,
    pub breaker_cooldown_seconds: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 3.0,
            max_delay_seconds: 60.0,
            max_attempts: 10,
            max_wait_seconds: None,
            breaker_threshold: 5,
            breaker_cooldown_seconds: 30.0,
        }
    }
}

impl ReconcileConfig {
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_seconds.map(backoff::seconds)
    }

    fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            base_delay_seconds: self.interval_seconds,
            max_delay_seconds: self.max_delay_seconds,
            jitter_factor: 0.0,
        }
    }

    fn breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            self.breaker_threshold,
            backoff::seconds(self.breaker_cooldown_seconds),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("a reconcile is already running")]
    AlreadyRunning,
    #[error("reconcile did not finish within {0:?}")]
    Timeout(Duration),
    #[error("reconcile cancelled")]
    Cancelled,
    #[error("authoritative source still failing after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: SourceError },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// Outcome of one successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Projection watermark the delta was requested from
    pub watermark: Watermark,
    pub fetched: usize,
    pub applied: usize,
    pub skipped: usize,
}

/// Clears the running flag when a reconcile ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Reconciler<S, A> {
    projector: Projector<S>,
    source: Arc<A>,
    config: ReconcileConfig,
    breaker: CircuitBreaker,
    running: AtomicBool,
}

impl<S: ProjectionStore, A: AuthoritativeSource> Reconciler<S, A> {
    pub fn new(projector: Projector<S>, source: Arc<A>, config: ReconcileConfig) -> Self {
        let breaker = config.breaker();
        Self {
            projector,
            source,
            config,
            breaker,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Bring the projection up to date with the authoritative source.
    pub async fn reconcile(
        &self,
        shutdown: &ShutdownSignal,
    ) -> Result<ReconcileReport, ReconcileError> {
        let _guard = RunGuard::acquire(&self.running).ok_or(ReconcileError::AlreadyRunning)?;

        let watermark = self.projector.store().watermark()?;
        info!(watermark = ?watermark.as_datetime(), "reconcile started");

        let mut shutdown = shutdown.clone();
        let fetch = self.fetch(watermark.as_datetime());
        let snapshots = match self.config.max_wait() {
            Some(max_wait) => tokio::select! {
                biased;
                _ = shutdown.wait() => return Err(ReconcileError::Cancelled),
                fetched = tokio::time::timeout(max_wait, fetch) => {
                    fetched.map_err(|_| ReconcileError::Timeout(max_wait))??
                }
            },
            None => tokio::select! {
                biased;
                _ = shutdown.wait() => return Err(ReconcileError::Cancelled),
                fetched = fetch => fetched?,
            },
        };

        let report = self.apply_all(watermark, snapshots)?;
        info!(
            fetched = report.fetched,
            applied = report.applied,
            skipped = report.skipped,
            "reconcile finished"
        );
        Ok(report)
    }

    fn apply_all(
        &self,
        watermark: Watermark,
        snapshots: Vec<AuctionSnapshot>,
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport {
            watermark,
            fetched: snapshots.len(),
            applied: 0,
            skipped: 0,
        };

        for snapshot in snapshots {
            if !watermark.is_before(snapshot.updated_at) {
                report.skipped += 1;
                continue;
            }
            match self.projector.apply(&SyncEvent::Updated(snapshot))? {
                ApplyOutcome::Applied => report.applied += 1,
                ApplyOutcome::Skipped => report.skipped += 1,
            }
        }
        Ok(report)
    }

    /// Delta query with exponential backoff, gated by the circuit breaker.
    async fn fetch(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuctionSnapshot>, ReconcileError> {
        let backoff = self.config.backoff();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let cooldown = self.breaker.remaining_cooldown();
            if !cooldown.is_zero() {
                debug!(?cooldown, "circuit open, waiting");
                tokio::time::sleep(cooldown).await;
            }

            attempt += 1;
            let err = match self.source.changed_since(since).await {
                Ok(snapshots) => {
                    self.breaker.record_success();
                    return Ok(snapshots);
                }
                Err(err) => err,
            };

            if self.breaker.record_failure() {
                warn!(attempt, error = %err, "authoritative source circuit opened");
            }
            if attempt >= max_attempts {
                return Err(ReconcileError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = backoff.delay(attempt);
            warn!(attempt, max_attempts, ?delay, error = %err, "delta query failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
