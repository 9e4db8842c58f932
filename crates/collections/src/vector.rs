//! Observable sequence primitive.

use crate::subscription::{SubscriptionId, SubscriptionManager};
use crate::sync::lock;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use vista_core::{Error, NotifyContext, Result, SequenceChange};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an observable collection, used to key shared
/// evaluators.
pub type SourceId = u64;

/// An addressable, ordered sequence that broadcasts one coalesced
/// `SequenceChange` per mutation batch.
///
/// One mutex guards the contents; it is held for the full duration of a
/// batch and released before subscribers are notified. A vector constructed
/// with a `NotifyContext` posts its notifications onto that context.
pub struct ObservableVector<T> {
    id: SourceId,
    items: Mutex<Vec<T>>,
    subs: Mutex<SubscriptionManager<SequenceChange<T>>>,
    context: Option<Arc<dyn NotifyContext>>,
}

impl<T> Default for ObservableVector<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObservableVector<T> {
    /// Stable identity of this vector.
    #[inline]
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// The notification context this vector is pinned to, if any.
    pub fn context(&self) -> Option<Arc<dyn NotifyContext>> {
        self.context.clone()
    }

    /// Subscribes to change notifications.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SequenceChange<T>) + Send + Sync + 'static,
    {
        lock(&self.subs).subscribe(callback)
    }

    /// Unsubscribes by ID. Returns true if the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.subs).unsubscribe(id)
    }

    /// Returns the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subs).len()
    }
}

impl<T> ObservableVector<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    /// Creates a vector with initial contents.
    pub fn with_items(items: Vec<T>) -> Self {
        Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            items: Mutex::new(items),
            subs: Mutex::new(SubscriptionManager::new()),
            context: None,
        }
    }

    /// Creates a vector whose outbound notifications are posted onto `ctx`.
    pub fn with_context(items: Vec<T>, ctx: Arc<dyn NotifyContext>) -> Self {
        Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
            items: Mutex::new(items),
            subs: Mutex::new(SubscriptionManager::new()),
            context: Some(ctx),
        }
    }

    /// Current number of items.
    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    /// Returns true if the vector is empty.
    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    /// The item at `index`, if in bounds.
    pub fn get(&self, index: usize) -> Option<T> {
        lock(&self.items).get(index).cloned()
    }

    /// A copy of the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.items).clone()
    }

    /// Appends one item.
    pub fn push(&self, item: T) {
        let event = {
            let mut items = lock(&self.items);
            let index = items.len();
            items.push(item.clone());
            SequenceChange::Added {
                index,
                items: vec![item],
            }
        };
        self.notify(event);
    }

    /// Appends a batch of items as one notification.
    pub fn push_all(&self, batch: Vec<T>) {
        if batch.is_empty() {
            return;
        }
        let event = {
            let mut items = lock(&self.items);
            let index = items.len();
            items.extend(batch.iter().cloned());
            SequenceChange::Added { index, items: batch }
        };
        self.notify(event);
    }

    /// Inserts a contiguous batch at `index`.
    pub fn insert_all(&self, index: usize, batch: Vec<T>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let event = {
            let mut items = lock(&self.items);
            if index > items.len() {
                return Err(Error::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            let _ = items.splice(index..index, batch.iter().cloned());
            SequenceChange::Added { index, items: batch }
        };
        self.notify(event);
        Ok(())
    }

    /// Removes `count` items starting at `index`, returning them.
    pub fn remove_range(&self, index: usize, count: usize) -> Result<Vec<T>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let (event, removed) = {
            let mut items = lock(&self.items);
            if index + count > items.len() {
                return Err(Error::IndexOutOfRange {
                    index: index + count - 1,
                    len: items.len(),
                });
            }
            let removed: Vec<T> = items.drain(index..index + count).collect();
            (
                SequenceChange::Removed {
                    index,
                    items: removed.clone(),
                },
                removed,
            )
        };
        self.notify(event);
        Ok(removed)
    }

    /// Replaces `count` items at `index` with `new`, returning the old ones.
    pub fn replace_range(&self, index: usize, count: usize, new: Vec<T>) -> Result<Vec<T>> {
        if count == 0 && new.is_empty() {
            return Ok(Vec::new());
        }
        let (event, old) = {
            let mut items = lock(&self.items);
            if index + count > items.len() {
                return Err(Error::IndexOutOfRange {
                    index: index + count.saturating_sub(1),
                    len: items.len(),
                });
            }
            let old: Vec<T> = items
                .splice(index..index + count, new.iter().cloned())
                .collect();
            (
                SequenceChange::Replaced {
                    index,
                    old: old.clone(),
                    new,
                },
                old,
            )
        };
        self.notify(event);
        Ok(old)
    }

    /// Relocates `count` items so the block begins at `to` afterwards.
    pub fn move_range(&self, from: usize, to: usize, count: usize) -> Result<()> {
        if count == 0 || from == to {
            return Ok(());
        }
        let event = {
            let mut items = lock(&self.items);
            let len = items.len();
            if from + count > len {
                return Err(Error::IndexOutOfRange {
                    index: from + count - 1,
                    len,
                });
            }
            if to > len - count {
                return Err(Error::IndexOutOfRange { index: to, len });
            }
            let block: Vec<T> = items.drain(from..from + count).collect();
            let _ = items.splice(to..to, block.iter().cloned());
            SequenceChange::Moved {
                from,
                to,
                items: block,
            }
        };
        self.notify(event);
        Ok(())
    }

    /// Replaces the entire contents, discarding incremental history.
    pub fn reset(&self, new_items: Vec<T>) {
        let event = {
            let mut items = lock(&self.items);
            *items = new_items.clone();
            SequenceChange::Reset { items: new_items }
        };
        self.notify(event);
    }

    fn notify(&self, event: SequenceChange<T>) {
        let callbacks = lock(&self.subs).callbacks();
        if callbacks.is_empty() {
            return;
        }
        match &self.context {
            Some(ctx) => ctx.post(Box::new(move || {
                for callback in &callbacks {
                    callback(&event);
                }
            })),
            None => {
                for callback in &callbacks {
                    callback(&event);
                }
            }
        }
    }
}

impl<T> ObservableVector<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Removes the first occurrence of `item` by value.
    ///
    /// Returns true if an occurrence was found and removed.
    pub fn remove_item(&self, item: &T) -> bool {
        let event = {
            let mut items = lock(&self.items);
            let Some(index) = items.iter().position(|x| x == item) else {
                return false;
            };
            let removed = items.remove(index);
            SequenceChange::Removed {
                index,
                items: vec![removed],
            }
        };
        self.notify(event);
        true
    }

    /// The first position of `item` by value, if present.
    pub fn position_of(&self, item: &T) -> Option<usize> {
        lock(&self.items).iter().position(|x| x == item)
    }
}
