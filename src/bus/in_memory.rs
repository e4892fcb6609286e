//! In-memory transport for testing and single-process deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Message, PublishError, Publisher, Subscriber};

/// Default number of published messages and acks remembered for inspection.
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

#[derive(Default)]
struct SubscriptionState {
    destinations: Vec<String>,
    ready: VecDeque<Message>,
    in_flight: HashMap<String, Message>,
    acked: VecDeque<String>,
    history_limit: usize,
}

struct TransportState {
    published: VecDeque<(String, Message)>,
    subscriptions: Vec<(Arc<Mutex<SubscriptionState>>, Arc<Notify>)>,
    history_limit: usize,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            published: VecDeque::new(),
            subscriptions: Vec::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Append to a bounded history, dropping the oldest entries.
fn remember<T>(history: &mut VecDeque<T>, item: T, limit: usize) {
    history.push_back(item);
    while history.len() > limit {
        history.pop_front();
    }
}

/// In-memory publish/subscribe transport.
///
/// - Thread-safe, shared across tasks via `Clone`
/// - Every subscription receives its own copy of each message published to
///   one of its destinations
/// - Messages stay in flight until acked; nacked messages go back to the
///   front of the subscription queue
/// - The publish log and ack log keep only the most recent entries
///
/// ## Example
///
/// ```
/// use search_sync::bus::InMemoryTransport;
///
/// let transport = InMemoryTransport::new();
/// let subscription = transport.subscribe(&["search-auction-created"]);
/// assert_eq!(subscription.pending(), 0);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<TransportState>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport remembering at most `limit` published messages and, per
    /// subscription, `limit` acked ids.
    pub fn with_history_limit(limit: usize) -> Self {
        let state = TransportState {
            history_limit: limit,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, TransportState>, PublishError> {
        self.state
            .lock()
            .map_err(|_| PublishError::ConnectionFailed("transport lock poisoned".into()))
    }

    /// Create a subscription receiving messages published to any of `destinations`.
    ///
    /// Only messages published after this call are delivered.
    pub fn subscribe(&self, destinations: &[&str]) -> InMemorySubscription {
        let notify = Arc::new(Notify::new());
        let mut subscription = SubscriptionState {
            destinations: destinations.iter().map(|d| d.to_string()).collect(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            ..Default::default()
        };

        if let Ok(state) = self.state.lock() {
            subscription.history_limit = state.history_limit;
        }
        let subscription = Arc::new(Mutex::new(subscription));
        if let Ok(mut state) = self.state.lock() {
            state
                .subscriptions
                .push((Arc::clone(&subscription), Arc::clone(&notify)));
        }

        InMemorySubscription {
            state: subscription,
            notify,
        }
    }

    /// Every message accepted by the transport, with its destination, in order.
    pub fn published(&self) -> Vec<(String, Message)> {
        self.state
            .lock()
            .map(|state| state.published.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of messages accepted for `destination`.
    pub fn published_to(&self, destination: &str) -> usize {
        self.published()
            .iter()
            .filter(|(d, _)| d == destination)
            .count()
    }
}

#[async_trait]
impl Publisher for InMemoryTransport {
    async fn publish(&self, destination: &str, message: Message) -> Result<(), PublishError> {
        let mut state = self.lock()?;
        let limit = state.history_limit;
        remember(
            &mut state.published,
            (destination.to_string(), message.clone()),
            limit,
        );

        for (subscription, notify) in &state.subscriptions {
            let mut subscription = subscription
                .lock()
                .map_err(|_| PublishError::ConnectionFailed("subscription lock poisoned".into()))?;
            if subscription.destinations.iter().any(|d| d == destination) {
                subscription.ready.push_back(message.clone());
                notify.notify_one();
            }
        }

        Ok(())
    }
}

/// A subscription created by [`InMemoryTransport::subscribe`].
#[derive(Clone)]
pub struct InMemorySubscription {
    state: Arc<Mutex<SubscriptionState>>,
    notify: Arc<Notify>,
}

impl InMemorySubscription {
    fn lock(&self) -> Result<MutexGuard<'_, SubscriptionState>, PublishError> {
        self.state
            .lock()
            .map_err(|_| PublishError::ConnectionFailed("subscription lock poisoned".into()))
    }

    fn try_take(&self) -> Result<Option<Message>, PublishError> {
        let mut state = self.lock()?;
        match state.ready.pop_front() {
            Some(mut message) => {
                message.delivery_count += 1;
                state.in_flight.insert(message.id.clone(), message.clone());
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    /// Messages waiting to be delivered.
    pub fn pending(&self) -> usize {
        self.state.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    /// Messages delivered but not yet acked or nacked.
    pub fn in_flight(&self) -> usize {
        self.state.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    /// Ids of acknowledged messages, in ack order.
    pub fn acknowledged(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.acked.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Subscriber for InMemorySubscription {
    async fn poll(&self, timeout: Duration) -> Result<Option<Message>, PublishError> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(message) = self.try_take()? {
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return self.try_take();
            }
        }
    }

    async fn ack(&self, message_id: &str) -> Result<(), PublishError> {
        let mut state = self.lock()?;
        state
            .in_flight
            .remove(message_id)
            .ok_or_else(|| PublishError::UnknownDelivery(message_id.to_string()))?;
        let limit = state.history_limit;
        remember(&mut state.acked, message_id.to_string(), limit);
        Ok(())
    }

    async fn nack(&self, message_id: &str, _reason: &str) -> Result<(), PublishError> {
        let mut state = self.lock()?;
        let message = state
            .in_flight
            .remove(message_id)
            .ok_or_else(|| PublishError::UnknownDelivery(message_id.to_string()))?;
        state.ready.push_front(message);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }
}
