//! Subscription management for observable collections and evaluators.
//!
//! This module provides subscription IDs and a manager for tracking active
//! subscriptions to any event-broadcasting component.

use hashbrown::HashMap;
use std::sync::Arc;

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback type for change notifications.
pub type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Manages subscriptions for one event broadcaster.
///
/// Callbacks are stored behind `Arc` so a broadcaster can snapshot the
/// current subscriber list under its lock and invoke the callbacks after
/// releasing it.
pub struct SubscriptionManager<E> {
    subscriptions: HashMap<SubscriptionId, Callback<E>>,
    next_id: SubscriptionId,
}

impl<E> Default for SubscriptionManager<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> SubscriptionManager<E> {
    /// Creates a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
            next_id: 1,
        }
    }

    /// Subscribes to events with the given callback.
    ///
    /// Returns the subscription ID that can be used to unsubscribe.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(id, Arc::new(callback));
        id
    }

    /// Unsubscribes by ID.
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Snapshots the current callbacks for dispatch outside the lock.
    pub fn callbacks(&self) -> Vec<Callback<E>> {
        self.subscriptions.values().cloned().collect()
    }

    /// Notifies all active subscriptions inline.
    pub fn notify_all(&self, event: &E) {
        for callback in self.subscriptions.values() {
            callback(event);
        }
    }

    /// Returns the number of active subscriptions.
    #[inline]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns true if there are no subscriptions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Clears all subscriptions.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}
