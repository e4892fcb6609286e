//! Task ownership for the background loops.
//!
//! Every loop is spawned by a handle that keeps its [`ShutdownTrigger`] and
//! `JoinHandle`. Stopping a handle signals the loop, waits for the work in
//! progress to finish, and returns the loop's statistics.

mod shutdown;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bus::{Publisher, Subscriber};
use crate::consumer::{Consumer, ConsumerStats};
use crate::outbox::{OutboxRelay, OutboxStore, RelayStats};
use crate::projection::ProjectionStore;
use crate::quarantine::QuarantineStore;
use crate::reconcile::{AuthoritativeSource, ReconcileError, ReconcileReport, Reconciler};

pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};

/// A relay running on the tokio runtime.
///
/// ## Example
///
/// ```ignore
/// let relay = OutboxRelay::new(Arc::new(store), Arc::new(transport), RelayConfig::default());
/// let handle = RelayHandle::spawn(relay);
///
/// // ... serve writes ...
///
/// let stats = handle.stop().await;
/// info!(published = stats.published, "relay stopped");
/// ```
pub struct RelayHandle {
    trigger: ShutdownTrigger,
    task: JoinHandle<RelayStats>,
}

impl RelayHandle {
    pub fn spawn<S, P>(relay: OutboxRelay<S, P>) -> Self
    where
        S: OutboxStore + 'static,
        P: Publisher + 'static,
    {
        let (trigger, signal) = shutdown_channel();
        let task = tokio::spawn(relay.run(signal));
        Self { trigger, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the relay and wait for the current drain to complete.
    pub async fn stop(self) -> RelayStats {
        self.trigger.trigger();
        match self.task.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "outbox relay task failed");
                RelayStats::default()
            }
        }
    }
}

/// The projector side: reconcile first, then consume.
///
/// [`ProjectorService::start`] returns only once the projection has caught up
/// with the authoritative source, so a started service is ready to serve
/// reads. Deliveries that arrive meanwhile wait in the subscription.
pub struct ProjectorService<S, A> {
    reconciler: Arc<Reconciler<S, A>>,
    startup: ReconcileReport,
    trigger: ShutdownTrigger,
    consumer: JoinHandle<ConsumerStats>,
}

impl<S, A> ProjectorService<S, A>
where
    S: ProjectionStore + 'static,
    A: AuthoritativeSource + 'static,
{
    pub async fn start<Q, T>(
        reconciler: Arc<Reconciler<S, A>>,
        consumer: Arc<Consumer<S, Q>>,
        subscriber: Arc<T>,
    ) -> Result<Self, ReconcileError>
    where
        Q: QuarantineStore + 'static,
        T: Subscriber + 'static,
    {
        let (trigger, signal) = shutdown_channel();

        let startup = reconciler.reconcile(&signal).await?;
        info!(
            applied = startup.applied,
            fetched = startup.fetched,
            "projection caught up, starting consumer"
        );

        let consumer = tokio::spawn(consumer.run(subscriber, signal));
        Ok(Self {
            reconciler,
            startup,
            trigger,
            consumer,
        })
    }

    /// Report of the reconcile that gated startup.
    pub fn startup_report(&self) -> ReconcileReport {
        self.startup
    }

    /// Run another catch-up while the consumer keeps going.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        self.reconciler.reconcile(&self.trigger.subscribe()).await
    }

    /// Stop polling, drain the lanes and join the consumer.
    pub async fn shutdown(self) -> ConsumerStats {
        self.trigger.trigger();
        match self.consumer.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "consumer task failed");
                ConsumerStats::default()
            }
        }
    }
}
