//! Evaluator over an observable map.

use crate::expression::{ExprId, MapExpression};
use core::hash::Hash;
use hashbrown::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use vista_collections::{lock, ObservableMap, SourceId, SubscriptionId, SubscriptionManager};
use vista_core::{ElementFault, EntryEvent, MapChange, ValueChange};

fn read<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|e| e.into_inner())
}

struct MapEvalInner<K, R> {
    results: HashMap<K, R>,
    faults: HashMap<K, ElementFault>,
}

/// Maintains the live per-key results for one source map and one
/// expression, and broadcasts `EntryEvent`s as either changes.
///
/// Keys are unique, so no multiplicity travels on the event stream.
pub struct MapEvaluator<K, V, R> {
    source: Arc<ObservableMap<K, V>>,
    expr: MapExpression<K, V, R>,
    inner: RwLock<MapEvalInner<K, R>>,
    subs: Mutex<SubscriptionManager<EntryEvent<K, R>>>,
    source_sub: Mutex<Option<SubscriptionId>>,
}

impl<K, V, R> MapEvaluator<K, V, R> {
    /// The source this evaluator observes.
    #[inline]
    pub fn source(&self) -> &Arc<ObservableMap<K, V>> {
        &self.source
    }

    /// Identity of the expression this evaluator runs.
    #[inline]
    pub fn expr_id(&self) -> ExprId {
        self.expr.id()
    }

    /// The (source, expression) key identifying this evaluator for sharing.
    pub fn share_key(&self) -> (SourceId, ExprId) {
        (self.source.id(), self.expr.id())
    }

    /// Subscribes to the full entry event stream.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&EntryEvent<K, R>) + Send + Sync + 'static,
    {
        lock(&self.subs).subscribe(callback)
    }

    /// Unsubscribes by ID.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.subs).unsubscribe(id)
    }

    /// Stops observing the source. Idempotent.
    pub fn detach(&self) {
        if let Some(sub) = lock(&self.source_sub).take() {
            self.source.unsubscribe(sub);
            debug!(source = self.source.id(), "map evaluator detached");
        }
    }
}

impl<K, V, R> MapEvaluator<K, V, R>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    R: Clone + PartialEq + Default + Send + Sync + 'static,
{
    /// Builds an evaluator from the source's current snapshot and subscribes
    /// to its changes.
    pub fn new(source: Arc<ObservableMap<K, V>>, expr: MapExpression<K, V, R>) -> Arc<Self> {
        let entries = source.snapshot();
        let mut inner = MapEvalInner {
            results: HashMap::with_capacity(entries.len()),
            faults: HashMap::new(),
        };
        for (key, value) in entries {
            let (result, fault) = Self::eval_one(&expr, &key, &value);
            if let Some(fault) = fault {
                inner.faults.insert(key.clone(), fault);
            }
            inner.results.insert(key, result);
        }

        let evaluator = Arc::new(Self {
            source,
            expr,
            inner: RwLock::new(inner),
            subs: Mutex::new(SubscriptionManager::new()),
            source_sub: Mutex::new(None),
        });

        let weak = Arc::downgrade(&evaluator);
        let sub = evaluator.source.subscribe(move |change| {
            if let Some(evaluator) = weak.upgrade() {
                evaluator.on_source_change(change);
            }
        });
        *lock(&evaluator.source_sub) = Some(sub);
        debug!(source = evaluator.source.id(), "map evaluator constructed");
        evaluator
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        read(&self.inner).results.len()
    }

    /// Returns true if no keys are held.
    pub fn is_empty(&self) -> bool {
        read(&self.inner).results.is_empty()
    }

    /// All current `(key, result)` pairs, under the evaluator's read lock.
    pub fn snapshot(&self) -> Vec<(K, R)> {
        read(&self.inner)
            .results
            .iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect()
    }

    /// All current results in unspecified order.
    pub fn results(&self) -> Vec<R> {
        read(&self.inner).results.values().cloned().collect()
    }

    /// The result recorded for one key, if present.
    pub fn result_of(&self, key: &K) -> Option<R> {
        read(&self.inner).results.get(key).cloned()
    }

    /// The fault recorded for one key, if any.
    pub fn fault_of(&self, key: &K) -> Option<ElementFault> {
        read(&self.inner).faults.get(key).cloned()
    }

    /// Any currently recorded fault, if one exists.
    pub fn first_fault(&self) -> Option<ElementFault> {
        read(&self.inner).faults.values().next().cloned()
    }

    /// Recomputes one key's result from the source's current value,
    /// emitting paired changing/changed events when it actually differs.
    ///
    /// Returns true if anything changed.
    pub fn refresh(&self, key: &K) -> bool {
        let Some(value) = self.source.get(key) else {
            return false;
        };
        let (old_result, old_fault) = {
            let inner = read(&self.inner);
            let Some(old) = inner.results.get(key).cloned() else {
                return false;
            };
            (old, inner.faults.get(key).cloned())
        };

        let (new_result, new_fault) = Self::eval_one(&self.expr, key, &value);
        let result_changed = new_result != old_result;
        let fault_changed = new_fault != old_fault;
        if !result_changed && !fault_changed {
            return false;
        }

        if result_changed {
            self.emit(EntryEvent::ResultChanging {
                key: key.clone(),
                result: old_result,
            });
        }
        if fault_changed {
            self.emit(EntryEvent::FaultChanging {
                key: key.clone(),
                fault: old_fault,
            });
        }

        {
            let mut inner = write(&self.inner);
            inner.results.insert(key.clone(), new_result.clone());
            match &new_fault {
                Some(fault) => {
                    inner.faults.insert(key.clone(), fault.clone());
                }
                None => {
                    inner.faults.remove(key);
                }
            }
        }

        if result_changed {
            self.emit(EntryEvent::ResultChanged {
                key: key.clone(),
                result: new_result,
            });
        }
        if fault_changed {
            self.emit(EntryEvent::FaultChanged {
                key: key.clone(),
                fault: new_fault,
            });
        }
        true
    }

    /// Subscribes to the reduced membership/value stream consumed by
    /// aggregate maintainers.
    pub fn subscribe_values<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ValueChange<R>) + Send + Sync + 'static,
    {
        self.subscribe(move |event| match event {
            EntryEvent::Added { pairs } => {
                callback(&ValueChange::Added(
                    pairs.iter().map(|(_, r)| r.clone()).collect(),
                ));
            }
            EntryEvent::Removed { pairs } => {
                callback(&ValueChange::Removed(
                    pairs.iter().map(|(_, r)| r.clone()).collect(),
                ));
            }
            EntryEvent::Replaced { pairs } => {
                for (_, old, new) in pairs {
                    callback(&ValueChange::Changing {
                        old: old.clone(),
                        count: 1,
                    });
                    callback(&ValueChange::Changed {
                        new: new.clone(),
                        count: 1,
                    });
                }
            }
            EntryEvent::ResultChanging { result, .. } => {
                callback(&ValueChange::Changing {
                    old: result.clone(),
                    count: 1,
                });
            }
            EntryEvent::ResultChanged { result, .. } => {
                callback(&ValueChange::Changed {
                    new: result.clone(),
                    count: 1,
                });
            }
            EntryEvent::Reset { pairs } => {
                callback(&ValueChange::Reset(
                    pairs.iter().map(|(_, r)| r.clone()).collect(),
                ));
            }
            EntryEvent::FaultChanging { .. } | EntryEvent::FaultChanged { .. } => {}
        })
    }

    fn eval_one(expr: &MapExpression<K, V, R>, key: &K, value: &V) -> (R, Option<ElementFault>) {
        match expr.evaluate(key, value) {
            Ok(result) => (result, None),
            Err(err) => (R::default(), Some(ElementFault::from(err))),
        }
    }

    fn on_source_change(&self, change: &MapChange<K, V>) {
        match change {
            MapChange::Added { entries } => {
                let mut pairs = Vec::with_capacity(entries.len());
                let mut fault_events = Vec::new();
                {
                    let mut inner = write(&self.inner);
                    for (key, value) in entries {
                        let (result, fault) = Self::eval_one(&self.expr, key, value);
                        inner.results.insert(key.clone(), result.clone());
                        if let Some(fault) = fault {
                            inner.faults.insert(key.clone(), fault.clone());
                            fault_events.push(EntryEvent::FaultChanged {
                                key: key.clone(),
                                fault: Some(fault),
                            });
                        }
                        pairs.push((key.clone(), result));
                    }
                }
                self.emit(EntryEvent::Added { pairs });
                for event in fault_events {
                    self.emit(event);
                }
            }
            MapChange::Removed { entries } => {
                let mut pairs = Vec::with_capacity(entries.len());
                let mut fault_events = Vec::new();
                {
                    let mut inner = write(&self.inner);
                    for (key, _) in entries {
                        if let Some(result) = inner.results.remove(key) {
                            pairs.push((key.clone(), result));
                        }
                        if inner.faults.remove(key).is_some() {
                            fault_events.push(EntryEvent::FaultChanged {
                                key: key.clone(),
                                fault: None,
                            });
                        }
                    }
                }
                if pairs.is_empty() {
                    return;
                }
                self.emit(EntryEvent::Removed { pairs });
                for event in fault_events {
                    self.emit(event);
                }
            }
            MapChange::Replaced { entries } => {
                let mut pairs = Vec::with_capacity(entries.len());
                let mut fault_events = Vec::new();
                {
                    let mut inner = write(&self.inner);
                    for (key, _, new_value) in entries {
                        let (new_result, new_fault) = Self::eval_one(&self.expr, key, new_value);
                        let old_result = inner
                            .results
                            .insert(key.clone(), new_result.clone())
                            .unwrap_or_default();
                        let old_fault = match &new_fault {
                            Some(fault) => inner.faults.insert(key.clone(), fault.clone()),
                            None => inner.faults.remove(key),
                        };
                        if old_fault != new_fault {
                            fault_events.push(EntryEvent::FaultChanged {
                                key: key.clone(),
                                fault: new_fault,
                            });
                        }
                        pairs.push((key.clone(), old_result, new_result));
                    }
                }
                self.emit(EntryEvent::Replaced { pairs });
                for event in fault_events {
                    self.emit(event);
                }
            }
            MapChange::Reset { entries } => {
                let mut pairs = Vec::with_capacity(entries.len());
                {
                    let mut inner = write(&self.inner);
                    inner.results.clear();
                    inner.faults.clear();
                    for (key, value) in entries {
                        let (result, fault) = Self::eval_one(&self.expr, key, value);
                        inner.results.insert(key.clone(), result.clone());
                        if let Some(fault) = fault {
                            inner.faults.insert(key.clone(), fault);
                        }
                        pairs.push((key.clone(), result));
                    }
                }
                debug!(source = self.source.id(), "map evaluator reset");
                self.emit(EntryEvent::Reset { pairs });
            }
        }
    }

    fn emit(&self, event: EntryEvent<K, R>) {
        let callbacks = lock(&self.subs).callbacks();
        for callback in &callbacks {
            callback(&event);
        }
    }
}
