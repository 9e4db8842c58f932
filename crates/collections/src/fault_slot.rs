//! Settable, observable operation-fault state.

use crate::subscription::{SubscriptionId, SubscriptionManager};
use crate::sync::lock;
use std::sync::Mutex;
use vista_core::OperationFault;

/// A view-level fault cell: settable, clearable, observable.
///
/// Consumers react to the appearance and disappearance of a fault over time
/// instead of catching a thrown error. Setting the same fault twice does not
/// re-notify.
pub struct FaultSlot {
    state: Mutex<Option<OperationFault>>,
    subs: Mutex<SubscriptionManager<Option<OperationFault>>>,
}

impl Default for FaultSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultSlot {
    /// Creates a healthy (fault-free) slot.
    pub fn new() -> Self {
        Self::with_fault(None)
    }

    /// Creates a slot with an initial fault, e.g. a construction-time
    /// condition that surfaces as state rather than a hard failure.
    pub fn with_fault(fault: Option<OperationFault>) -> Self {
        Self {
            state: Mutex::new(fault),
            subs: Mutex::new(SubscriptionManager::new()),
        }
    }

    /// The current fault, if any.
    pub fn get(&self) -> Option<OperationFault> {
        lock(&self.state).clone()
    }

    /// Returns true if a fault is currently set.
    pub fn is_faulted(&self) -> bool {
        lock(&self.state).is_some()
    }

    /// Sets or clears the fault, notifying subscribers on actual change.
    pub fn set(&self, fault: Option<OperationFault>) {
        {
            let mut state = lock(&self.state);
            if *state == fault {
                return;
            }
            *state = fault.clone();
        }
        let callbacks = lock(&self.subs).callbacks();
        for callback in &callbacks {
            callback(&fault);
        }
    }

    /// Subscribes to fault-changed notifications.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Option<OperationFault>) + Send + Sync + 'static,
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
    fn test_set_and_clear() {
        let slot = FaultSlot::new();
        assert!(!slot.is_faulted());

        slot.set(Some(OperationFault::NoElements));
        assert_eq!(slot.get(), Some(OperationFault::NoElements));

        slot.set(None);
        assert!(!slot.is_faulted());
    }

    #[test]
    fn test_notifies_only_on_change() {
        let slot = FaultSlot::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        slot.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        slot.set(Some(OperationFault::NoElements));
        slot.set(Some(OperationFault::NoElements));
        slot.set(None);
        slot.set(None);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_initial_fault() {
        let slot = FaultSlot::with_fault(Some(OperationFault::IndexOutOfRange));
        assert!(slot.is_faulted());
    }
}
