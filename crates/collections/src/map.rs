//! Observable key-value map primitive.

use crate::subscription::{SubscriptionId, SubscriptionManager};
use crate::sync::lock;
use crate::vector::SourceId;
use core::hash::Hash;
use core::sync::atomic::{AtomicU64, Ordering};
use hashbrown::HashMap;
use std::sync::{Arc, Mutex};
use vista_core::{MapChange, NotifyContext};

static NEXT_MAP_ID: AtomicU64 = AtomicU64::new(1);

/// A keyed, addressable map that broadcasts one coalesced `MapChange` per
/// mutation batch.
///
/// Same locking discipline as `ObservableVector`: one mutex per instance,
/// notifications dispatched after it is released.
pub struct ObservableMap<K, V> {
    id: SourceId,
    entries: Mutex<HashMap<K, V>>,
    subs: Mutex<SubscriptionManager<MapChange<K, V>>>,
    context: Option<Arc<dyn NotifyContext>>,
}

impl<K, V> Default for ObservableMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ObservableMap<K, V> {
    /// Stable identity of this map.
    #[inline]
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// The notification context this map is pinned to, if any.
    pub fn context(&self) -> Option<Arc<dyn NotifyContext>> {
        self.context.clone()
    }

    /// Subscribes to change notifications.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&MapChange<K, V>) + Send + Sync + 'static,
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

impl<K, V> ObservableMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::with_entries(Vec::new())
    }

    /// Creates a map with initial entries.
    pub fn with_entries(entries: Vec<(K, V)>) -> Self {
        Self {
            id: NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed),
            entries: Mutex::new(entries.into_iter().collect()),
            subs: Mutex::new(SubscriptionManager::new()),
            context: None,
        }
    }

    /// Creates a map whose outbound notifications are posted onto `ctx`.
    pub fn with_context(entries: Vec<(K, V)>, ctx: Arc<dyn NotifyContext>) -> Self {
        Self {
            id: NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed),
            entries: Mutex::new(entries.into_iter().collect()),
            subs: Mutex::new(SubscriptionManager::new()),
            context: Some(ctx),
        }
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Returns true if the map is empty.
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// The value under `key`, if present.
    pub fn get(&self, key: &K) -> Option<V> {
        lock(&self.entries).get(key).cloned()
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// A copy of the current entries in unspecified order.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        lock(&self.entries)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Inserts one entry, replacing any existing value under the key.
    pub fn insert(&self, key: K, value: V) {
        self.insert_all(vec![(key, value)]);
    }

    /// Inserts a batch of entries.
    ///
    /// Previously absent keys become one `Added` notification; keys whose
    /// value is replaced become one `Replaced` notification.
    pub fn insert_all(&self, batch: Vec<(K, V)>) {
        if batch.is_empty() {
            return;
        }
        let (added_event, replaced_event) = {
            let mut entries = lock(&self.entries);
            let mut added = Vec::new();
            let mut replaced = Vec::new();
            for (key, value) in batch {
                match entries.insert(key.clone(), value.clone()) {
                    None => added.push((key, value)),
                    Some(old) => replaced.push((key, old, value)),
                }
            }
            (
                (!added.is_empty()).then_some(MapChange::Added { entries: added }),
                (!replaced.is_empty()).then_some(MapChange::Replaced { entries: replaced }),
            )
        };
        if let Some(event) = added_event {
            self.notify(event);
        }
        if let Some(event) = replaced_event {
            self.notify(event);
        }
    }

    /// Removes a batch of keys, returning the removed entries.
    pub fn remove_keys(&self, keys: &[K]) -> Vec<(K, V)> {
        let (event, removed) = {
            let mut entries = lock(&self.entries);
            let mut removed = Vec::new();
            for key in keys {
                if let Some(value) = entries.remove(key) {
                    removed.push((key.clone(), value));
                }
            }
            if removed.is_empty() {
                return Vec::new();
            }
            (
                MapChange::Removed {
                    entries: removed.clone(),
                },
                removed,
            )
        };
        self.notify(event);
        removed
    }

    /// Replaces the entire contents, discarding incremental history.
    pub fn reset(&self, new_entries: Vec<(K, V)>) {
        let event = {
            let mut entries = lock(&self.entries);
            *entries = new_entries.iter().cloned().collect();
            MapChange::Reset {
                entries: new_entries,
            }
        };
        self.notify(event);
    }

    fn notify(&self, event: MapChange<K, V>) {
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
