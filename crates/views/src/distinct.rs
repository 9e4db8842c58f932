//! Multiset collapse operator (Distinct).

use core::hash::Hash;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use vista_collections::{lock, ObservableVector, SubscriptionId};
use vista_core::{IndexingStrategy, SequenceChange};
use vista_index::MultiplicityMap;

/// Maintains exactly one occurrence per logical element with nonzero
/// multiplicity.
///
/// An element enters the view on its first occurrence (0 -> 1) and leaves
/// when its last occurrence vanishes (1 -> 0). Moves are ignored: they
/// cannot change multiplicity.
pub struct DistinctView<T> {
    view: Arc<ObservableVector<T>>,
    source: Arc<ObservableVector<T>>,
    state: Arc<Mutex<MultiplicityMap<T>>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

impl<T> DistinctView<T>
where
    T: Clone + Eq + Hash + Ord + Send + Sync + 'static,
{
    /// Builds the view from the source's current snapshot and subscribes to
    /// its changes.
    pub fn new(source: Arc<ObservableVector<T>>, strategy: IndexingStrategy) -> Self {
        let mut counts = MultiplicityMap::new(strategy);
        let mut initial = Vec::new();
        for item in source.snapshot() {
            if counts.increment(item.clone()) {
                initial.push(item);
            }
        }
        let view = Arc::new(ObservableVector::with_items(initial));
        let state = Arc::new(Mutex::new(counts));

        let weak_view = Arc::downgrade(&view);
        let apply_state = state.clone();
        let subscription = source.subscribe(move |change| {
            let Some(view) = weak_view.upgrade() else {
                return;
            };
            let mut counts = lock(&apply_state);
            apply(&view, &mut counts, change);
        });

        debug!(len = view.len(), "distinct view constructed");
        Self {
            view,
            source,
            state,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// The derived view of distinct elements.
    #[inline]
    pub fn view(&self) -> &Arc<ObservableVector<T>> {
        &self.view
    }

    /// Current contents of the derived view.
    pub fn snapshot(&self) -> Vec<T> {
        self.view.snapshot()
    }

    /// Number of distinct elements.
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Returns true if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Current multiplicity behind one logical element.
    pub fn multiplicity(&self, element: &T) -> usize {
        lock(&self.state).count(element)
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.source.unsubscribe(self.subscription);
        debug!("distinct view disposed");
    }
}

impl<T> Drop for DistinctView<T> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.source.unsubscribe(self.subscription);
        }
    }
}

fn add_items<T>(view: &ObservableVector<T>, counts: &mut MultiplicityMap<T>, items: &[T])
where
    T: Clone + Eq + Hash + Ord + Send + Sync + 'static,
{
    for item in items {
        if counts.increment(item.clone()) {
            view.push(item.clone());
        }
    }
}

fn remove_items<T>(view: &ObservableVector<T>, counts: &mut MultiplicityMap<T>, items: &[T])
where
    T: Clone + Eq + Hash + Ord + Send + Sync + 'static,
{
    for item in items {
        if counts.decrement(item) {
            view.remove_item(item);
        }
    }
}

fn apply<T>(view: &ObservableVector<T>, counts: &mut MultiplicityMap<T>, change: &SequenceChange<T>)
where
    T: Clone + Eq + Hash + Ord + Send + Sync + 'static,
{
    match change {
        SequenceChange::Added { items, .. } => add_items(view, counts, items),
        SequenceChange::Removed { items, .. } => remove_items(view, counts, items),
        SequenceChange::Replaced { old, new, .. } => {
            remove_items(view, counts, old);
            add_items(view, counts, new);
        }
        SequenceChange::Moved { .. } => {}
        SequenceChange::Reset { items } => {
            counts.clear();
            let mut distinct = Vec::new();
            for item in items {
                if counts.increment(item.clone()) {
                    distinct.push(item.clone());
                }
            }
            view.reset(distinct);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_collapse() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2, 1, 3, 2]));
        let distinct = DistinctView::new(source, IndexingStrategy::HashTable);

        assert_eq!(distinct.snapshot(), vec![1, 2, 3]);
        assert_eq!(distinct.multiplicity(&1), 2);
    }

    #[test]
    fn test_first_occurrence_enters() {
        let source: Arc<ObservableVector<i64>> = Arc::new(ObservableVector::new());
        let distinct = DistinctView::new(source.clone(), IndexingStrategy::HashTable);

        source.push_all(vec![7, 7, 8]);
        assert_eq!(distinct.snapshot(), vec![7, 8]);
    }

    #[test]
    fn test_last_occurrence_leaves() {
        let source = Arc::new(ObservableVector::with_items(vec![5i64, 5, 3]));
        let distinct = DistinctView::new(source.clone(), IndexingStrategy::HashTable);
        assert_eq!(distinct.snapshot(), vec![5, 3]);

        // Removing one of two duplicates changes nothing.
        source.remove_item(&5);
        assert_eq!(distinct.snapshot(), vec![5, 3]);

        // Removing the last occurrence removes exactly one view entry.
        source.remove_item(&5);
        assert_eq!(distinct.snapshot(), vec![3]);
    }

    #[test]
    fn test_moves_ignored() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2, 3]));
        let distinct = DistinctView::new(source.clone(), IndexingStrategy::HashTable);

        source.move_range(0, 2, 1).unwrap();
        assert_eq!(distinct.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn test_replace() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2, 2]));
        let distinct = DistinctView::new(source.clone(), IndexingStrategy::HashTable);

        // 1 -> 2: multiplicity of 2 rises to 3, 1 vanishes.
        source.replace_range(0, 1, vec![2]).unwrap();
        assert_eq!(distinct.snapshot(), vec![2]);
        assert_eq!(distinct.multiplicity(&2), 3);
    }

    #[test]
    fn test_reset() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 1]));
        let distinct = DistinctView::new(source.clone(), IndexingStrategy::HashTable);

        source.reset(vec![9, 9, 8]);
        assert_eq!(distinct.snapshot(), vec![9, 8]);
    }

    #[test]
    fn test_tree_strategy() {
        let source = Arc::new(ObservableVector::with_items(vec![2i64, 1, 2]));
        let distinct =
            DistinctView::new(source, IndexingStrategy::SelfBalancingBinarySearchTree);
        assert_eq!(distinct.snapshot(), vec![2, 1]);
    }

    #[test]
    fn test_dispose_round_trip() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let distinct = DistinctView::new(source.clone(), IndexingStrategy::HashTable);

        distinct.dispose();
        source.push(2);
        assert_eq!(distinct.snapshot(), vec![1]);
    }
}
