use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::hint::{HintKey, HintOutcome};
use crate::registry::PreloadPerformanceSummary;

/// Events published by the [`Preloader`](crate::Preloader)
#[derive(Debug, Clone, PartialEq)]
pub enum PreloadEvent {
    /// A hint finished loading or failed; carries the summary at that moment
    Complete {
        key: HintKey,
        outcome: HintOutcome,
        summary: PreloadPerformanceSummary,
    },
}

impl PreloadEvent {
    pub fn summary(&self) -> &PreloadPerformanceSummary {
        match self {
            PreloadEvent::Complete { summary, .. } => summary,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Typed publish/subscribe channel.
///
/// `emit` is synchronous and invokes every subscriber in subscription order.
/// Subscribers run outside the internal lock, so they may subscribe, unsubscribe
/// or emit again from inside a callback.
pub struct EventBus<E> {
    subscribers: RwLock<Vec<(SubscriptionId, Callback<E>)>>,
    next_id: AtomicU64,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register `callback` for every future event
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    /// Deliver `event` to every current subscriber
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in snapshot {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
