//! Grouping operator (GroupBy).

use core::hash::Hash;
use core::sync::atomic::{AtomicBool, Ordering};
use hashbrown::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use vista_collections::{lock, ObservableVector, SubscriptionId};
use vista_core::ElementEvent;
use vista_eval::SequenceEvaluator;

/// One live group: a key and the observable sub-view of its members.
pub struct Group<K, T> {
    key: K,
    members: Arc<ObservableVector<T>>,
}

impl<K: Clone, T> Clone for Group<K, T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            members: self.members.clone(),
        }
    }
}

impl<K: PartialEq, T> PartialEq for Group<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K, T> Group<K, T> {
    /// The group's identity.
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The live sub-view of members sharing the key.
    #[inline]
    pub fn members(&self) -> &Arc<ObservableVector<T>> {
        &self.members
    }
}

/// Partitions the source into live groups keyed by a live key.
///
/// Groups are created when their first member arrives and disposed when
/// their last member leaves; a group needed again later is recreated, never
/// resurrected.
pub struct GroupedView<K, T> {
    view: Arc<ObservableVector<Group<K, T>>>,
    evaluator: Arc<SequenceEvaluator<T, K>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

struct GroupState<K, T> {
    /// Outer-view order of group keys.
    order: Vec<K>,
    groups: HashMap<K, Arc<ObservableVector<T>>>,
}

impl<K, T> GroupedView<K, T>
where
    K: Clone + Eq + Hash + PartialEq + Default + Send + Sync + 'static,
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Builds the grouped view from the evaluator's current snapshot and
    /// subscribes to its changes.
    pub fn new(evaluator: Arc<SequenceEvaluator<T, K>>) -> Self {
        let mut state = GroupState {
            order: Vec::new(),
            groups: HashMap::new(),
        };
        let view = Arc::new(ObservableVector::new());
        for (element, key) in evaluator.snapshot() {
            add_member(&mut state, &view, &key, &element);
        }

        let state = Arc::new(Mutex::new(state));
        let weak_view = Arc::downgrade(&view);
        let apply_state = state.clone();
        let subscription = evaluator.subscribe(move |event| {
            let Some(view) = weak_view.upgrade() else {
                return;
            };
            let mut state = lock(&apply_state);
            apply(&view, &mut state, event);
        });

        debug!(groups = view.len(), "grouped view constructed");
        Self {
            view,
            evaluator,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// The outer view of groups.
    #[inline]
    pub fn view(&self) -> &Arc<ObservableVector<Group<K, T>>> {
        &self.view
    }

    /// The upstream evaluator.
    #[inline]
    pub fn evaluator(&self) -> &Arc<SequenceEvaluator<T, K>> {
        &self.evaluator
    }

    /// Number of live groups.
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Returns true if no groups exist.
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// The live member view for `key`, if that group exists.
    pub fn group(&self, key: &K) -> Option<Arc<ObservableVector<T>>> {
        self.view
            .snapshot()
            .into_iter()
            .find(|g| g.key() == key)
            .map(|g| g.members.clone())
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.evaluator.unsubscribe(self.subscription);
        debug!("grouped view disposed");
    }
}

impl<K, T> Drop for GroupedView<K, T> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.evaluator.unsubscribe(self.subscription);
        }
    }
}

fn add_member<K, T>(
    state: &mut GroupState<K, T>,
    view: &ObservableVector<Group<K, T>>,
    key: &K,
    element: &T,
) where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    match state.groups.get(key) {
        Some(members) => members.push(element.clone()),
        None => {
            let members = Arc::new(ObservableVector::with_items(vec![element.clone()]));
            state.groups.insert(key.clone(), members.clone());
            state.order.push(key.clone());
            view.push(Group {
                key: key.clone(),
                members,
            });
        }
    }
}

fn remove_member<K, T>(
    state: &mut GroupState<K, T>,
    view: &ObservableVector<Group<K, T>>,
    key: &K,
    element: &T,
) where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let Some(members) = state.groups.get(key) else {
        return;
    };
    members.remove_item(element);
    if members.is_empty() {
        state.groups.remove(key);
        if let Some(position) = state.order.iter().position(|k| k == key) {
            state.order.remove(position);
            let _ = view.remove_range(position, 1);
        }
    }
}

fn apply<K, T>(
    view: &ObservableVector<Group<K, T>>,
    state: &mut GroupState<K, T>,
    event: &ElementEvent<T, K>,
) where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    match event {
        ElementEvent::Added { pairs, .. } => {
            for (element, key) in pairs {
                add_member(state, view, key, element);
            }
        }
        ElementEvent::Removed { pairs, .. } => {
            for (element, key) in pairs {
                remove_member(state, view, key, element);
            }
        }
        // The old key only exists before the evaluator mutates, so the move
        // out of the old group happens on the changing side of the pair.
        ElementEvent::ResultChanging {
            element,
            result: old_key,
            count,
        } => {
            for _ in 0..*count {
                remove_member(state, view, old_key, element);
            }
        }
        ElementEvent::ResultChanged {
            element,
            result: new_key,
            count,
        } => {
            for _ in 0..*count {
                add_member(state, view, new_key, element);
            }
        }
        ElementEvent::Reset { pairs } => {
            state.groups.clear();
            state.order.clear();
            view.reset(Vec::new());
            for (element, key) in pairs {
                add_member(state, view, key, element);
            }
        }
        ElementEvent::Moved { .. }
        | ElementEvent::FaultChanging { .. }
        | ElementEvent::FaultChanged { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_eval::Expression;

    fn parity() -> Expression<i64, i64> {
        Expression::infallible(|x: &i64| x % 2)
    }

    #[test]
    fn test_initial_groups() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2, 3, 4]));
        let grouped = GroupedView::new(SequenceEvaluator::new(source, parity()));

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.group(&1).map(|g| g.snapshot()), Some(vec![1, 3]));
        assert_eq!(grouped.group(&0).map(|g| g.snapshot()), Some(vec![2, 4]));
    }

    #[test]
    fn test_add_creates_group_once() {
        let source: Arc<ObservableVector<i64>> = Arc::new(ObservableVector::new());
        let grouped = GroupedView::new(SequenceEvaluator::new(source.clone(), parity()));

        source.push(2);
        assert_eq!(grouped.len(), 1);

        source.push(4);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped.group(&0).map(|g| g.snapshot()), Some(vec![2, 4]));
    }

    #[test]
    fn test_remove_disposes_empty_group() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2]));
        let grouped = GroupedView::new(SequenceEvaluator::new(source.clone(), parity()));
        assert_eq!(grouped.len(), 2);

        source.remove_item(&2);
        assert_eq!(grouped.len(), 1);
        assert!(grouped.group(&0).is_none());

        // Recreated, not resurrected.
        source.push(6);
        assert_eq!(grouped.group(&0).map(|g| g.snapshot()), Some(vec![6]));
    }

    #[test]
    fn test_key_change_moves_between_groups() {
        use std::sync::atomic::{AtomicI64, Ordering};

        // Element 3's group key can be overridden.
        let override_key = Arc::new(AtomicI64::new(1));
        let o = override_key.clone();
        let expr = Expression::infallible(move |x: &i64| {
            if *x == 3 {
                o.load(Ordering::SeqCst)
            } else {
                x % 2
            }
        });

        let source = Arc::new(ObservableVector::with_items(vec![1i64, 3, 2]));
        let evaluator = SequenceEvaluator::new(source, expr);
        let grouped = GroupedView::new(evaluator.clone());
        assert_eq!(grouped.group(&1).map(|g| g.snapshot()), Some(vec![1, 3]));

        override_key.store(0, Ordering::SeqCst);
        evaluator.refresh(&3);

        assert_eq!(grouped.group(&1).map(|g| g.snapshot()), Some(vec![1]));
        assert_eq!(grouped.group(&0).map(|g| g.snapshot()), Some(vec![2, 3]));
    }

    #[test]
    fn test_key_change_disposes_emptied_group() {
        use std::sync::atomic::{AtomicI64, Ordering};

        let override_key = Arc::new(AtomicI64::new(7));
        let o = override_key.clone();
        let expr = Expression::infallible(move |x: &i64| {
            if *x == 3 {
                o.load(Ordering::SeqCst)
            } else {
                x % 2
            }
        });

        let source = Arc::new(ObservableVector::with_items(vec![2i64, 3]));
        let evaluator = SequenceEvaluator::new(source, expr);
        let grouped = GroupedView::new(evaluator.clone());
        assert_eq!(grouped.len(), 2);

        override_key.store(0, Ordering::SeqCst);
        evaluator.refresh(&3);

        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped.group(&0).map(|g| g.snapshot()), Some(vec![2, 3]));
    }

    #[test]
    fn test_reset() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2]));
        let grouped = GroupedView::new(SequenceEvaluator::new(source.clone(), parity()));

        source.reset(vec![4, 6]);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped.group(&0).map(|g| g.snapshot()), Some(vec![4, 6]));
    }

    #[test]
    fn test_dispose_round_trip() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let grouped = GroupedView::new(SequenceEvaluator::new(source.clone(), parity()));

        grouped.dispose();
        source.push(2);
        assert_eq!(grouped.len(), 1);
    }
}
