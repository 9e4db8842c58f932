//! Evaluator over an observable sequence.

use crate::expression::{ExprId, Expression};
use core::hash::Hash;
use hashbrown::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;
use vista_collections::{lock, ObservableVector, SourceId, SubscriptionId, SubscriptionManager};
use vista_core::{ElementEvent, ElementFault, SequenceChange, ValueChange};

fn read<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|e| e.into_inner())
}

struct EvalInner<T, R> {
    /// Current `(element, result)` pairs, aligned with source order.
    pairs: Vec<(T, R)>,
    /// Per logical element fault; absent means healthy.
    faults: HashMap<T, ElementFault>,
}

/// Maintains the live `(element, result)` pairs for one source sequence and
/// one expression, and broadcasts `ElementEvent`s as either changes.
///
/// A faulted element keeps contributing `R::default()` as its stored result
/// so the rest of the view never stalls; the fault itself travels on the
/// `FaultChanging` / `FaultChanged` channel.
///
/// Results are recomputed when the caller invokes `refresh` /
/// `refresh_all`; `ResultChanging` fires before the evaluator mutates its
/// own pairs, `ResultChanged` after, so operators can capture pre-change
/// state in between.
pub struct SequenceEvaluator<T, R> {
    source: Arc<ObservableVector<T>>,
    expr: Expression<T, R>,
    inner: RwLock<EvalInner<T, R>>,
    subs: Mutex<SubscriptionManager<ElementEvent<T, R>>>,
    source_sub: Mutex<Option<SubscriptionId>>,
}

impl<T, R> SequenceEvaluator<T, R> {
    /// The source this evaluator observes.
    #[inline]
    pub fn source(&self) -> &Arc<ObservableVector<T>> {
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

    /// Subscribes to the full element event stream.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ElementEvent<T, R>) + Send + Sync + 'static,
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
            debug!(source = self.source.id(), "sequence evaluator detached");
        }
    }
}

impl<T, R> SequenceEvaluator<T, R>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    R: Clone + PartialEq + Default + Send + Sync + 'static,
{
    /// Builds an evaluator from the source's current snapshot and subscribes
    /// to its changes.
    pub fn new(source: Arc<ObservableVector<T>>, expr: Expression<T, R>) -> Arc<Self> {
        let items = source.snapshot();
        let mut inner = EvalInner {
            pairs: Vec::with_capacity(items.len()),
            faults: HashMap::new(),
        };
        for item in items {
            let (result, fault) = Self::eval_one(&expr, &item);
            if let Some(fault) = fault {
                inner.faults.insert(item.clone(), fault);
            }
            inner.pairs.push((item, result));
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
        debug!(
            source = evaluator.source.id(),
            expr = evaluator.expr.id(),
            "sequence evaluator constructed"
        );
        evaluator
    }

    /// Number of `(element, result)` pairs currently held.
    pub fn len(&self) -> usize {
        read(&self.inner).pairs.len()
    }

    /// Returns true if no pairs are held.
    pub fn is_empty(&self) -> bool {
        read(&self.inner).pairs.is_empty()
    }

    /// All current `(element, result)` pairs, under the evaluator's read
    /// lock.
    pub fn snapshot(&self) -> Vec<(T, R)> {
        read(&self.inner).pairs.clone()
    }

    /// All current results, in source order.
    pub fn results(&self) -> Vec<R> {
        read(&self.inner)
            .pairs
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// The fault recorded for one logical element, if any.
    pub fn fault_of(&self, element: &T) -> Option<ElementFault> {
        read(&self.inner).faults.get(element).cloned()
    }

    /// All currently faulted elements.
    pub fn faults(&self) -> Vec<(T, ElementFault)> {
        read(&self.inner)
            .faults
            .iter()
            .map(|(t, f)| (t.clone(), f.clone()))
            .collect()
    }

    /// The first element-level fault in source order, if any.
    ///
    /// Scalar operators that require every element surface this as their
    /// initial operation fault.
    pub fn first_fault(&self) -> Option<ElementFault> {
        let inner = read(&self.inner);
        inner
            .pairs
            .iter()
            .find_map(|(t, _)| inner.faults.get(t).cloned())
    }

    /// Recomputes one logical element's result, emitting paired
    /// changing/changed events with the occurrence count when the result or
    /// fault actually differs.
    ///
    /// Returns true if anything changed.
    pub fn refresh(&self, element: &T) -> bool {
        let (old_result, old_fault, count) = {
            let inner = read(&self.inner);
            let count = inner.pairs.iter().filter(|(t, _)| t == element).count();
            if count == 0 {
                return false;
            }
            let old_result = inner
                .pairs
                .iter()
                .find(|(t, _)| t == element)
                .map(|(_, r)| r.clone());
            (
                old_result,
                inner.faults.get(element).cloned(),
                count,
            )
        };
        let Some(old_result) = old_result else {
            return false;
        };

        let (new_result, new_fault) = Self::eval_one(&self.expr, element);
        let result_changed = new_result != old_result;
        let fault_changed = new_fault != old_fault;
        if !result_changed && !fault_changed {
            return false;
        }

        if result_changed {
            self.emit(ElementEvent::ResultChanging {
                element: element.clone(),
                result: old_result,
                count,
            });
        }
        if fault_changed {
            self.emit(ElementEvent::FaultChanging {
                element: element.clone(),
                fault: old_fault,
            });
        }

        {
            let mut inner = write(&self.inner);
            for pair in inner.pairs.iter_mut() {
                if &pair.0 == element {
                    pair.1 = new_result.clone();
                }
            }
            match &new_fault {
                Some(fault) => {
                    inner.faults.insert(element.clone(), fault.clone());
                }
                None => {
                    inner.faults.remove(element);
                }
            }
        }

        if result_changed {
            self.emit(ElementEvent::ResultChanged {
                element: element.clone(),
                result: new_result,
                count,
            });
        }
        if fault_changed {
            self.emit(ElementEvent::FaultChanged {
                element: element.clone(),
                fault: new_fault,
            });
        }
        true
    }

    /// Recomputes every logical element. Returns how many changed.
    pub fn refresh_all(&self) -> usize {
        let mut seen = HashSet::new();
        let elements: Vec<T> = read(&self.inner)
            .pairs
            .iter()
            .filter(|(t, _)| seen.insert(t.clone()))
            .map(|(t, _)| t.clone())
            .collect();
        elements.iter().filter(|e| self.refresh(e)).count()
    }

    /// Subscribes to the reduced membership/value stream consumed by
    /// aggregate maintainers.
    pub fn subscribe_values<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ValueChange<R>) + Send + Sync + 'static,
    {
        self.subscribe(move |event| match event {
            ElementEvent::Added { pairs, .. } => {
                callback(&ValueChange::Added(
                    pairs.iter().map(|(_, r)| r.clone()).collect(),
                ));
            }
            ElementEvent::Removed { pairs, .. } => {
                callback(&ValueChange::Removed(
                    pairs.iter().map(|(_, r)| r.clone()).collect(),
                ));
            }
            ElementEvent::ResultChanging { result, count, .. } => {
                callback(&ValueChange::Changing {
                    old: result.clone(),
                    count: *count,
                });
            }
            ElementEvent::ResultChanged { result, count, .. } => {
                callback(&ValueChange::Changed {
                    new: result.clone(),
                    count: *count,
                });
            }
            ElementEvent::Reset { pairs } => {
                callback(&ValueChange::Reset(
                    pairs.iter().map(|(_, r)| r.clone()).collect(),
                ));
            }
            ElementEvent::Moved { .. }
            | ElementEvent::FaultChanging { .. }
            | ElementEvent::FaultChanged { .. } => {}
        })
    }

    fn eval_one(expr: &Expression<T, R>, element: &T) -> (R, Option<ElementFault>) {
        match expr.evaluate(element) {
            Ok(result) => (result, None),
            Err(err) => (R::default(), Some(ElementFault::from(err))),
        }
    }

    fn on_source_change(&self, change: &SequenceChange<T>) {
        match change {
            SequenceChange::Added { index, items } => self.apply_added(*index, items),
            SequenceChange::Removed { index, items } => self.apply_removed(*index, items.len()),
            SequenceChange::Replaced { index, old, new } => {
                // A same-index replace is forwarded as remove-then-add so
                // every operator sees one uniform batch shape.
                self.apply_removed(*index, old.len());
                self.apply_added(*index, new);
            }
            SequenceChange::Moved { from, to, items } => {
                self.apply_moved(*from, *to, items.len())
            }
            SequenceChange::Reset { items } => self.apply_reset(items),
        }
    }

    fn apply_added(&self, index: usize, items: &[T]) {
        if items.is_empty() {
            return;
        }
        let mut new_pairs = Vec::with_capacity(items.len());
        let mut computed = Vec::with_capacity(items.len());
        for item in items {
            let (result, fault) = Self::eval_one(&self.expr, item);
            new_pairs.push((item.clone(), result));
            computed.push((item.clone(), fault));
        }

        let mut fault_events = Vec::new();
        let at;
        {
            let mut inner = write(&self.inner);
            at = index.min(inner.pairs.len());
            let _ = inner.pairs.splice(at..at, new_pairs.iter().cloned());
            for (item, fault) in computed {
                if inner.faults.get(&item).cloned() != fault {
                    match &fault {
                        Some(f) => {
                            inner.faults.insert(item.clone(), f.clone());
                        }
                        None => {
                            inner.faults.remove(&item);
                        }
                    }
                    fault_events.push(ElementEvent::FaultChanged {
                        element: item,
                        fault,
                    });
                }
            }
        }

        self.emit(ElementEvent::Added {
            index: at,
            pairs: new_pairs,
        });
        for event in fault_events {
            self.emit(event);
        }
    }

    fn apply_removed(&self, index: usize, count: usize) {
        if count == 0 {
            return;
        }
        let mut fault_events = Vec::new();
        let removed_pairs: Vec<(T, R)>;
        let start;
        {
            let mut inner = write(&self.inner);
            let end = (index + count).min(inner.pairs.len());
            start = index.min(end);
            removed_pairs = inner.pairs.drain(start..end).collect();
            for (element, _) in &removed_pairs {
                let still_present = inner.pairs.iter().any(|(t, _)| t == element);
                if !still_present && inner.faults.remove(element).is_some() {
                    fault_events.push(ElementEvent::FaultChanged {
                        element: element.clone(),
                        fault: None,
                    });
                }
            }
        }
        if removed_pairs.is_empty() {
            return;
        }
        self.emit(ElementEvent::Removed {
            index: start,
            pairs: removed_pairs,
        });
        for event in fault_events {
            self.emit(event);
        }
    }

    fn apply_moved(&self, from: usize, to: usize, count: usize) {
        let moved: Vec<(T, R)>;
        {
            let mut inner = write(&self.inner);
            let len = inner.pairs.len();
            if count == 0 || from + count > len || to + count > len {
                return;
            }
            let block: Vec<(T, R)> = inner.pairs.drain(from..from + count).collect();
            let _ = inner.pairs.splice(to..to, block.iter().cloned());
            moved = block;
        }
        self.emit(ElementEvent::Moved {
            from,
            to,
            pairs: moved,
        });
    }

    fn apply_reset(&self, items: &[T]) {
        let mut pairs = Vec::with_capacity(items.len());
        let mut faults = HashMap::new();
        for item in items {
            let (result, fault) = Self::eval_one(&self.expr, item);
            if let Some(fault) = fault {
                faults.insert(item.clone(), fault);
            }
            pairs.push((item.clone(), result));
        }
        {
            let mut inner = write(&self.inner);
            inner.pairs = pairs.clone();
            inner.faults = faults;
        }
        debug!(source = self.source.id(), "sequence evaluator reset");
        self.emit(ElementEvent::Reset { pairs });
    }

    fn emit(&self, event: ElementEvent<T, R>) {
        let callbacks = lock(&self.subs).callbacks();
        for callback in &callbacks {
            callback(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_core::Error;

    fn collect_events<T, R>(
        evaluator: &Arc<SequenceEvaluator<T, R>>,
    ) -> Arc<Mutex<Vec<ElementEvent<T, R>>>>
    where
        T: Clone + Eq + Hash + Send + Sync + 'static,
        R: Clone + PartialEq + Default + Send + Sync + 'static,
    {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        evaluator.subscribe(move |event| lock(&sink).push(event.clone()));
        events
    }

    #[test]
    fn test_initial_snapshot() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2, 3]));
        let evaluator = SequenceEvaluator::new(source, Expression::infallible(|x: &i64| x * 10));

        assert_eq!(evaluator.len(), 3);
        assert_eq!(evaluator.results(), vec![10, 20, 30]);
    }

    #[test]
    fn test_source_add_emits_pairs() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let evaluator =
            SequenceEvaluator::new(source.clone(), Expression::infallible(|x: &i64| x + 1));
        let events = collect_events(&evaluator);

        source.push_all(vec![5, 6]);

        assert_eq!(evaluator.results(), vec![2, 6, 7]);
        let events = lock(&events);
        assert_eq!(
            events[0],
            ElementEvent::Added {
                index: 1,
                pairs: vec![(5, 6), (6, 7)]
            }
        );
    }

    #[test]
    fn test_source_remove_and_replace() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2, 3]));
        let evaluator =
            SequenceEvaluator::new(source.clone(), Expression::infallible(|x: &i64| *x));
        let events = collect_events(&evaluator);

        source.replace_range(1, 1, vec![9]).unwrap();

        assert_eq!(evaluator.results(), vec![1, 9, 3]);
        let events = lock(&events);
        assert_eq!(
            events[0],
            ElementEvent::Removed {
                index: 1,
                pairs: vec![(2, 2)]
            }
        );
        assert_eq!(
            events[1],
            ElementEvent::Added {
                index: 1,
                pairs: vec![(9, 9)]
            }
        );
    }

    #[test]
    fn test_source_move_mirrors_pairs() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2, 3]));
        let evaluator =
            SequenceEvaluator::new(source.clone(), Expression::infallible(|x: &i64| *x));

        source.move_range(0, 2, 1).unwrap();

        assert_eq!(evaluator.results(), vec![2, 3, 1]);
    }

    #[test]
    fn test_refresh_emits_paired_events_with_count() {
        use std::sync::atomic::{AtomicI64, Ordering};

        let offset = Arc::new(AtomicI64::new(0));
        let offset_for_expr = offset.clone();
        let source = Arc::new(ObservableVector::with_items(vec![4i64, 4, 7]));
        let evaluator = SequenceEvaluator::new(
            source,
            Expression::infallible(move |x: &i64| x + offset_for_expr.load(Ordering::SeqCst)),
        );
        let events = collect_events(&evaluator);

        offset.store(100, Ordering::SeqCst);
        assert!(evaluator.refresh(&4));

        assert_eq!(evaluator.results(), vec![104, 104, 7]);
        let events = lock(&events);
        assert_eq!(
            events[0],
            ElementEvent::ResultChanging {
                element: 4,
                result: 4,
                count: 2
            }
        );
        assert_eq!(
            events[1],
            ElementEvent::ResultChanged {
                element: 4,
                result: 104,
                count: 2
            }
        );
    }

    #[test]
    fn test_refresh_unchanged_is_silent() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let evaluator = SequenceEvaluator::new(source, Expression::infallible(|x: &i64| *x));
        let events = collect_events(&evaluator);

        assert!(!evaluator.refresh(&1));
        assert!(!evaluator.refresh(&999));
        assert!(lock(&events).is_empty());
    }

    #[test]
    fn test_fault_isolation() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 0, 3]));
        let evaluator = SequenceEvaluator::new(
            source,
            Expression::new(|x: &i64| {
                if *x == 0 {
                    Err(Error::evaluation("zero"))
                } else {
                    Ok(100 / x)
                }
            }),
        );

        // The faulted element holds the default result; others are live.
        assert_eq!(evaluator.results(), vec![100, 0, 33]);
        assert!(evaluator.fault_of(&0).is_some());
        assert!(evaluator.fault_of(&1).is_none());
        assert!(evaluator.first_fault().is_some());
    }

    #[test]
    fn test_fault_clears_on_removal() {
        let source = Arc::new(ObservableVector::with_items(vec![0i64, 2]));
        let evaluator = SequenceEvaluator::new(
            source.clone(),
            Expression::new(|x: &i64| {
                if *x == 0 {
                    Err(Error::evaluation("zero"))
                } else {
                    Ok(*x)
                }
            }),
        );
        let events = collect_events(&evaluator);

        source.remove_range(0, 1).unwrap();

        assert!(evaluator.fault_of(&0).is_none());
        let events = lock(&events);
        assert!(events.iter().any(|e| matches!(
            e,
            ElementEvent::FaultChanged { element: 0, fault: None }
        )));
    }

    #[test]
    fn test_reset_rebuilds() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let evaluator =
            SequenceEvaluator::new(source.clone(), Expression::infallible(|x: &i64| x * 2));
        let events = collect_events(&evaluator);

        source.reset(vec![5, 6]);

        assert_eq!(evaluator.results(), vec![10, 12]);
        assert_eq!(
            lock(&events)[0],
            ElementEvent::Reset {
                pairs: vec![(5, 10), (6, 12)]
            }
        );
    }

    #[test]
    fn test_detach_stops_events() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let evaluator =
            SequenceEvaluator::new(source.clone(), Expression::infallible(|x: &i64| *x));

        evaluator.detach();
        evaluator.detach();
        source.push(2);

        assert_eq!(evaluator.len(), 1);
    }

    #[test]
    fn test_subscribe_values() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let evaluator =
            SequenceEvaluator::new(source.clone(), Expression::infallible(|x: &i64| x * 2));

        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = values.clone();
        evaluator.subscribe_values(move |change| lock(&sink).push(change.clone()));

        source.push(3);
        source.remove_range(0, 1).unwrap();

        let values = lock(&values);
        assert_eq!(values[0], ValueChange::Added(vec![6]));
        assert_eq!(values[1], ValueChange::Removed(vec![2]));
    }
}
