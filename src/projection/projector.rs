use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{ApplyOutcome, ProjectionRecord, ProjectionStore, StoreError};
use crate::event::{EventError, EventType, SyncEvent};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Invalid(#[from] EventError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no handler registered for {0} events")]
    NoHandler(EventType),
}

impl ApplyError {
    /// Whether retrying the same message may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApplyError::Store(StoreError::Unavailable(_)))
    }

    /// Short label used for quarantine reasons and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            ApplyError::Invalid(EventError::Malformed(_)) => "malformed_payload",
            ApplyError::Invalid(EventError::UnknownEventType(_)) => "unknown_event_type",
            ApplyError::Invalid(EventError::TypeMismatch { .. }) => "event_type_mismatch",
            ApplyError::Store(_) => "store_unavailable",
            ApplyError::NoHandler(_) => "no_handler",
        }
    }
}

type Handler<S> = fn(&S, &SyncEvent) -> Result<ApplyOutcome, ApplyError>;

fn upsert<S: ProjectionStore>(store: &S, event: &SyncEvent) -> Result<ApplyOutcome, ApplyError> {
    match event {
        SyncEvent::Created(snapshot) | SyncEvent::Updated(snapshot) => {
            Ok(store.upsert_if_newer(ProjectionRecord::from_snapshot(snapshot))?)
        }
        SyncEvent::Deleted(_) => Err(ApplyError::NoHandler(event.event_type())),
    }
}

fn delete<S: ProjectionStore>(store: &S, event: &SyncEvent) -> Result<ApplyOutcome, ApplyError> {
    match event {
        SyncEvent::Deleted(deleted) => Ok(store.delete_if_not_newer(deleted.id, deleted.updated_at)?),
        _ => Err(ApplyError::NoHandler(event.event_type())),
    }
}

/// Applies events to a projection store through a fixed event type → handler
/// table. Every write is conditional on the record watermark, so applying the
/// same event twice, or an older one after a newer one, is a no-op.
pub struct Projector<S> {
    store: Arc<S>,
    handlers: HashMap<EventType, Handler<S>>,
}

impl<S> Clone for Projector<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            handlers: self.handlers.clone(),
        }
    }
}

impl<S: ProjectionStore> Projector<S> {
    pub fn new(store: Arc<S>) -> Self {
        let mut handlers: HashMap<EventType, Handler<S>> = HashMap::new();
        handlers.insert(EventType::Created, upsert::<S>);
        handlers.insert(EventType::Updated, upsert::<S>);
        handlers.insert(EventType::Deleted, delete::<S>);
        Self { store, handlers }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Event types this projector handles.
    pub fn event_types(&self) -> Vec<EventType> {
        EventType::ALL
            .iter()
            .copied()
            .filter(|t| self.handlers.contains_key(t))
            .collect()
    }

    pub fn apply(&self, event: &SyncEvent) -> Result<ApplyOutcome, ApplyError> {
        let event_type = event.event_type();
        let handler = self
            .handlers
            .get(&event_type)
            .ok_or(ApplyError::NoHandler(event_type))?;

        let outcome = handler(self.store.as_ref(), event)?;
        debug!(
            auction_id = %event.entity_id(),
            event_type = %event_type,
            watermark = %event.watermark(),
            ?outcome,
            "event applied"
        );
        Ok(outcome)
    }

    /// Decode a transport payload against its declared type, then apply it.
    pub fn apply_message(
        &self,
        declared_type: &str,
        payload: &[u8],
    ) -> Result<ApplyOutcome, ApplyError> {
        let event = SyncEvent::decode_declared(declared_type, payload)?;
        self.apply(&event)
    }
}
