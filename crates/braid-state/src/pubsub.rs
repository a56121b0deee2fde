use std::collections::HashMap;
use std::sync::Arc;

use braid_core::{Vertex, VertexId};
use parking_lot::Mutex;
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    VertexAccepted,
    BestBlockChanged,
}

/// Notification published by the validation engine.
#[derive(Clone, Debug)]
pub enum Event {
    VertexAccepted(Arc<Vertex>),
    BestBlockChanged {
        block: VertexId,
        accumulated_weight: f64,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::VertexAccepted(_) => EventKind::VertexAccepted,
            Event::BestBlockChanged { .. } => EventKind::BestBlockChanged,
        }
    }
}

/// Handlers run synchronously on the publishing thread, with the engine
/// lock held. They must not call back into the engine.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Event fan-out. A handler is registered at most once per kind, compared by
/// pointer identity.
#[derive(Default)]
pub struct PubSub {
    handlers: Mutex<HashMap<EventKind, Vec<EventHandler>>>,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `handler` was already subscribed to `kind`.
    pub fn subscribe(&self, kind: EventKind, handler: EventHandler) -> bool {
        let mut handlers = self.handlers.lock();
        let list = handlers.entry(kind).or_default();
        if list.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return false;
        }
        list.push(handler);
        true
    }

    /// Returns `false` if `handler` was not subscribed to `kind`.
    pub fn unsubscribe(&self, kind: EventKind, handler: &EventHandler) -> bool {
        let mut handlers = self.handlers.lock();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| !Arc::ptr_eq(h, handler));
        before != list.len()
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.handlers.lock().get(&kind).map_or(0, Vec::len)
    }

    pub fn publish(&self, event: &Event) {
        // Snapshot so handlers may (un)subscribe without deadlocking.
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();
        trace!(kind = ?event.kind(), handlers = handlers.len(), "publish");
        for handler in handlers {
            handler(event);
        }
    }
}
