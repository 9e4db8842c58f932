//! Reactive scalar cell shared by all aggregate and accessor views.

use std::sync::Mutex;
use vista_collections::{lock, FaultSlot, SubscriptionId, SubscriptionManager};
use vista_core::OperationFault;

/// One maintained value plus its operation-fault slot.
///
/// Setting an equal value does not re-notify. The value survives fault
/// transitions untouched, so a faulted cell exposes its last-known value.
pub struct ScalarCell<V> {
    value: Mutex<V>,
    fault: FaultSlot,
    subs: Mutex<SubscriptionManager<V>>,
}

impl<V> ScalarCell<V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates a healthy cell with an initial value.
    pub fn new(initial: V) -> Self {
        Self::with_fault(initial, None)
    }

    /// Creates a cell with an initial value and an initial fault, e.g. a
    /// construction-time condition surfaced as state.
    pub fn with_fault(initial: V, fault: Option<OperationFault>) -> Self {
        Self {
            value: Mutex::new(initial),
            fault: FaultSlot::with_fault(fault),
            subs: Mutex::new(SubscriptionManager::new()),
        }
    }

    /// The current value. Check `fault()` before trusting it.
    pub fn get(&self) -> V {
        lock(&self.value).clone()
    }

    /// The fault slot.
    #[inline]
    pub fn fault(&self) -> &FaultSlot {
        &self.fault
    }

    /// Stores a new value, notifying subscribers when it actually changed.
    pub fn set(&self, new_value: V) {
        {
            let mut value = lock(&self.value);
            if *value == new_value {
                return;
            }
            *value = new_value.clone();
        }
        let callbacks = lock(&self.subs).callbacks();
        for callback in &callbacks {
            callback(&new_value);
        }
    }

    /// Subscribes to value-changed notifications.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        lock(&self.subs).subscribe(callback)
    }

    /// Unsubscribes by ID.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.subs).unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_get_set() {
        let cell = ScalarCell::new(0i64);
        cell.set(5);
        assert_eq!(cell.get(), 5);
    }

    #[test]
    fn test_set_equal_is_silent() {
        let cell = ScalarCell::new(1i64);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        cell.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(1);
        cell.set(2);
        cell.set(2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_value_survives_fault() {
        let cell = ScalarCell::new(7i64);
        cell.fault().set(Some(OperationFault::NoElements));
        assert_eq!(cell.get(), 7);
        assert!(cell.fault().is_faulted());
    }
}
