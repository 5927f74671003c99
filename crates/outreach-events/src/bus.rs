//! The event bus: in-process publish/subscribe with a rolling history. Handlers
//! are looked up by event kind and run concurrently; one handler's failure never
//! blocks its peers. Events tied to a transaction are published only after commit
//! (the store crate enforces that ordering by calling `publish` from inside the
//! same `async fn` that commits, never before).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error};

use crate::types::{DomainEvent, EventKind};

const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// A handler subscribed to one or more event kinds. Implementors should not block;
/// long-running work should hand off to its own task.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);

    /// A short name for logging when a handler panics or errors.
    fn name(&self) -> &str {
        "unnamed_handler"
    }
}

struct OrderedSubscriber {
    sender: mpsc::UnboundedSender<DomainEvent>,
}

/// Central event bus. Cheaply cloneable (`Arc` internals) so every component that
/// needs to publish or subscribe can hold its own handle.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
    history: RwLock<VecDeque<DomainEvent>>,
    history_capacity: usize,
    ordered_subscribers: RwLock<Vec<OrderedSubscriber>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                handlers: RwLock::new(HashMap::new()),
                history: RwLock::new(VecDeque::with_capacity(DEFAULT_HISTORY_CAPACITY)),
                history_capacity: DEFAULT_HISTORY_CAPACITY,
                ordered_subscribers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Subscribe a handler to a specific event kind. Handlers run concurrently with
    /// every other handler registered for the same kind.
    pub async fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.inner.handlers.write().await;
        handlers.entry(kind).or_default().push(handler);
    }

    /// Subscribe to a strictly-ordered stream of every published event, regardless
    /// of kind. Used by the notifier so that within one campaign, events are
    /// observed in publish order — `publish` pushes onto this channel synchronously,
    /// before spawning the concurrent handler fan-out.
    pub async fn subscribe_ordered(&self) -> mpsc::UnboundedReceiver<DomainEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .ordered_subscribers
            .write()
            .await
            .push(OrderedSubscriber { sender: tx });
        rx
    }

    /// Publish an event. Appends to history, delivers to ordered subscribers
    /// synchronously (preserving order), then dispatches to kind-specific handlers
    /// concurrently — one handler's panic or error never prevents its peers from
    /// running.
    pub async fn publish(&self, event: DomainEvent) {
        debug!(kind = ?event.kind, entity = %event.entity_id, "publishing domain event");

        {
            let mut history = self.inner.history.write().await;
            history.push_back(event.clone());
            while history.len() > self.inner.history_capacity {
                history.pop_front();
            }
        }

        {
            let mut subs = self.inner.ordered_subscribers.write().await;
            subs.retain(|s| s.sender.send(event.clone()).is_ok());
        }

        let handlers = {
            let guard = self.inner.handlers.read().await;
            guard.get(&event.kind).cloned().unwrap_or_default()
        };

        if handlers.is_empty() {
            return;
        }

        let mut tasks = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let event = event.clone();
            tasks.push(tokio::spawn(async move {
                let name = handler.name().to_string();
                handler.handle(&event).await;
                name
            }));
        }

        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "event handler task panicked");
            }
        }
    }

    /// Recent history, optionally filtered by kind. Used for debugging and for the
    /// admin surface.
    pub async fn history(&self, limit: usize, kind: Option<EventKind>) -> Vec<DomainEvent> {
        let history = self.inner.history.read().await;
        let mut out: Vec<DomainEvent> = match kind {
            Some(k) => history.iter().filter(|e| e.kind == k).cloned().collect(),
            None => history.iter().cloned().collect(),
        };
        if out.len() > limit {
            let start = out.len() - limit;
            out = out.split_off(start);
        }
        out
    }

    pub async fn events_for_entity(&self, entity_id: &str) -> Vec<DomainEvent> {
        let history = self.inner.history.read().await;
        history
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect()
    }

    pub async fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .read()
            .await
            .get(&kind)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}
