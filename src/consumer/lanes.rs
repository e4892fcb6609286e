use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{Consumer, ConsumerStats};
use crate::bus::{Message, Subscriber};
use crate::projection::ProjectionStore;
use crate::quarantine::QuarantineStore;
use crate::runtime::ShutdownSignal;

/// Deliveries buffered per lane before the poll loop waits.
const LANE_CAPACITY: usize = 64;

/// Lane index for a delivery. Keyed by entity id when the message carries one,
/// otherwise by message id.
pub fn lane_for(message: &Message, lanes: usize) -> usize {
    let key = message.entity_id().unwrap_or(&message.id);
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % lanes.max(1) as u64) as usize
}

impl<S, Q> Consumer<S, Q>
where
    S: ProjectionStore + 'static,
    Q: QuarantineStore + 'static,
{
    /// Poll `subscriber` until `shutdown` fires.
    ///
    /// On shutdown the poll loop stops first, then every lane finishes the
    /// deliveries it already holds and is joined. Anything still unacked on
    /// the transport is redelivered to the next consumer.
    pub async fn run<T>(
        self: Arc<Self>,
        subscriber: Arc<T>,
        mut shutdown: ShutdownSignal,
    ) -> ConsumerStats
    where
        T: Subscriber + 'static,
    {
        let lanes = self.config.lanes.max(1);
        let mut senders = Vec::with_capacity(lanes);
        let mut workers = Vec::with_capacity(lanes);

        for lane in 0..lanes {
            let (tx, rx) = mpsc::channel(LANE_CAPACITY);
            senders.push(tx);
            workers.push(tokio::spawn(Arc::clone(&self).run_lane(
                lane,
                rx,
                Arc::clone(&subscriber),
            )));
        }

        info!(lanes, "consumer started");
        let mut stats = ConsumerStats::default();

        loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                polled = subscriber.poll(self.config.poll_timeout()) => polled,
            };

            match polled {
                Ok(Some(message)) => {
                    stats.received += 1;
                    let lane = lane_for(&message, lanes);
                    if senders[lane].send(message).await.is_err() {
                        error!(lane, "consumer lane closed");
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "poll failed");
                    tokio::time::sleep(self.config.poll_timeout()).await;
                }
            }
        }

        drop(senders);
        for worker in workers {
            match worker.await {
                Ok(lane_stats) => stats.merge(lane_stats),
                Err(err) => error!(error = %err, "consumer lane panicked"),
            }
        }

        info!(
            received = stats.received,
            applied = stats.applied,
            skipped = stats.skipped,
            quarantined = stats.quarantined,
            "consumer stopped"
        );
        stats
    }

    async fn run_lane<T>(
        self: Arc<Self>,
        lane: usize,
        mut deliveries: mpsc::Receiver<Message>,
        subscriber: Arc<T>,
    ) -> ConsumerStats
    where
        T: Subscriber + 'static,
    {
        let mut stats = ConsumerStats::default();

        while let Some(message) = deliveries.recv().await {
            match self.handle(&message).await {
                Ok(outcome) => {
                    stats.record(outcome);
                    if let Err(err) = subscriber.ack(&message.id).await {
                        warn!(lane, message_id = %message.id, error = %err, "ack failed");
                    }
                }
                Err(err) => {
                    error!(lane, message_id = %message.id, error = %err, "could not quarantine, returning message");
                    stats.redelivered += 1;
                    if let Err(err) = subscriber.nack(&message.id, &err.to_string()).await {
                        warn!(lane, message_id = %message.id, error = %err, "nack failed");
                    }
                }
            }
        }

        stats
    }
}
