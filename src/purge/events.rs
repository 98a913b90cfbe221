//! Explicit subscription registry for content transition events.
//!
//! The host adapter owns one `ContentEvents` and calls [`ContentEvents::dispatch`]
//! for every notification it receives. Handlers are registered once at
//! startup with an explicit priority instead of relying on hook names.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, trace};

use crate::domain::content::ContentTransitionEvent;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "purge::events";

/// Priority used by the host when none is given; lower runs first.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Receives content transition events.
pub trait ContentEventHandler: Send + Sync {
    fn handle(&self, event: &ContentTransitionEvent);
}

impl<F> ContentEventHandler for F
where
    F: Fn(&ContentTransitionEvent) + Send + Sync,
{
    fn handle(&self, event: &ContentTransitionEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    priority: i32,
    handler: Arc<dyn ContentEventHandler>,
}

#[derive(Default)]
pub struct ContentEvents {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl ContentEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers run in ascending priority; equal
    /// priorities run in subscription order.
    pub fn subscribe(
        &self,
        priority: i32,
        handler: Arc<dyn ContentEventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscriptions = rw_write(&self.subscriptions, SOURCE, "subscribe");
        let position = subscriptions.partition_point(|existing| existing.priority <= priority);
        subscriptions.insert(
            position,
            Subscription {
                id,
                priority,
                handler,
            },
        );
        debug!(subscription = id.0, priority, "Content event handler subscribed");
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = rw_write(&self.subscriptions, SOURCE, "unsubscribe");
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        before != subscriptions.len()
    }

    /// Deliver an event to every subscriber.
    pub fn dispatch(&self, event: &ContentTransitionEvent) {
        // Clone handlers out so a handler may (un)subscribe without deadlocking.
        let handlers: Vec<Arc<dyn ContentEventHandler>> =
            rw_read(&self.subscriptions, SOURCE, "dispatch")
                .iter()
                .map(|subscription| Arc::clone(&subscription.handler))
                .collect();

        trace!(
            content_id = %event.content_id,
            kind = event.kind.as_str(),
            handlers = handlers.len(),
            "Dispatching content event"
        );

        for handler in handlers {
            handler.handle(event);
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.subscriptions, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
