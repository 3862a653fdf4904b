use async_trait::async_trait;
use std::sync::{Arc, RwLock};

// ============================================================================
// Event Dispatch
// ============================================================================
//
// The event store announces every persisted batch exactly once. What happens
// next (projections, process managers, outbound messaging) belongs to the
// listeners, not to the store.
//
// ============================================================================

/// Receives each persisted batch of domain events
#[async_trait]
pub trait EventDispatcher<E>: Send + Sync {
    async fn dispatch(&self, events: &[E]);
}

/// Something that reacts to dispatched events (a projection, a process manager)
#[async_trait]
pub trait EventListener<E>: Send + Sync {
    async fn handle(&self, events: &[E]);
}

/// Hands each batch to every listener, in registration order, before returning
pub struct ImmediateEventDispatcher<E> {
    listeners: RwLock<Vec<Arc<dyn EventListener<E>>>>,
}

impl<E> ImmediateEventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener<E>>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    pub fn listener_count(&self) -> usize {
        match self.listeners.read() {
            Ok(listeners) => listeners.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn EventListener<E>>> {
        match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl<E> Default for ImmediateEventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Send + Sync> EventDispatcher<E> for ImmediateEventDispatcher<E> {
    async fn dispatch(&self, events: &[E]) {
        // Lock is not held across await points
        let listeners = self.snapshot();

        tracing::debug!(
            listeners = listeners.len(),
            event_count = events.len(),
            "Dispatching events"
        );

        for listener in listeners {
            listener.handle(events).await;
        }
    }
}
