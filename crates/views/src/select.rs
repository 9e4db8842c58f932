//! Projection operator (Select).

use core::hash::Hash;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use vista_collections::{lock, ObservableVector, SubscriptionId};
use vista_core::{ElementEvent, IndexingStrategy};
use vista_eval::SequenceEvaluator;
use vista_index::PositionIndex;

/// Maintains per-element results aligned with source positions: the result
/// at output position `i` belongs to the source element at position `i`.
///
/// With `NoneOrInherit` the view re-scans the evaluator snapshot for an
/// element's occurrences; with an indexed strategy it keeps a
/// `PositionIndex` from element to the result positions it occupies
/// (duplicates supported).
pub struct ProjectedView<T, R> {
    view: Arc<ObservableVector<R>>,
    evaluator: Arc<SequenceEvaluator<T, R>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

struct ProjectState<T> {
    index: Option<PositionIndex<T>>,
}

impl<T, R> ProjectedView<T, R>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    R: Clone + PartialEq + Default + Send + Sync + 'static,
{
    /// Builds the view from the evaluator's current snapshot and subscribes
    /// to its changes.
    pub fn new(evaluator: Arc<SequenceEvaluator<T, R>>, strategy: IndexingStrategy) -> Self {
        let snapshot = evaluator.snapshot();
        let results: Vec<R> = snapshot.iter().map(|(_, r)| r.clone()).collect();
        let elements: Vec<T> = snapshot.into_iter().map(|(t, _)| t).collect();

        let view = Arc::new(ObservableVector::with_items(results));
        let state = Arc::new(Mutex::new(ProjectState {
            index: strategy
                .is_indexed()
                .then(|| PositionIndex::from_items(&elements)),
        }));

        let weak_view = Arc::downgrade(&view);
        let weak_eval = Arc::downgrade(&evaluator);
        let apply_state = state.clone();
        let subscription = evaluator.subscribe(move |event| {
            let (Some(view), Some(evaluator)) = (weak_view.upgrade(), weak_eval.upgrade()) else {
                return;
            };
            let mut state = lock(&apply_state);
            apply(&view, &evaluator, &mut state, event);
        });

        debug!(len = view.len(), indexed = strategy.is_indexed(), "projected view constructed");
        Self {
            view,
            evaluator,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// The derived view of results.
    #[inline]
    pub fn view(&self) -> &Arc<ObservableVector<R>> {
        &self.view
    }

    /// The upstream evaluator.
    #[inline]
    pub fn evaluator(&self) -> &Arc<SequenceEvaluator<T, R>> {
        &self.evaluator
    }

    /// Current contents of the derived view.
    pub fn snapshot(&self) -> Vec<R> {
        self.view.snapshot()
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Returns true if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.evaluator.unsubscribe(self.subscription);
        debug!("projected view disposed");
    }
}

impl<T, R> Drop for ProjectedView<T, R> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.evaluator.unsubscribe(self.subscription);
        }
    }
}

fn apply<T, R>(
    view: &ObservableVector<R>,
    evaluator: &SequenceEvaluator<T, R>,
    state: &mut ProjectState<T>,
    event: &ElementEvent<T, R>,
) where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    R: Clone + PartialEq + Default + Send + Sync + 'static,
{
    match event {
        ElementEvent::Added { index, pairs } => {
            let elements: Vec<T> = pairs.iter().map(|(t, _)| t.clone()).collect();
            let results: Vec<R> = pairs.iter().map(|(_, r)| r.clone()).collect();
            if let Some(index_map) = &mut state.index {
                index_map.insert(*index, &elements);
            }
            let _ = view.insert_all(*index, results);
        }
        ElementEvent::Removed { index, pairs } => {
            if let Some(index_map) = &mut state.index {
                index_map.remove(*index, pairs.len());
            }
            let _ = view.remove_range(*index, pairs.len());
        }
        ElementEvent::Moved { from, to, pairs } => {
            if let Some(index_map) = &mut state.index {
                index_map.move_block(*from, *to, pairs.len());
            }
            let _ = view.move_range(*from, *to, pairs.len());
        }
        ElementEvent::ResultChanged {
            element, result, ..
        } => {
            // Replace at the first recorded position and mirror the same
            // value into every other occurrence of a true duplicate.
            let positions: Vec<usize> = match &state.index {
                Some(index_map) => index_map.positions_of(element).to_vec(),
                None => evaluator
                    .snapshot()
                    .iter()
                    .enumerate()
                    .filter(|(_, (t, _))| t == element)
                    .map(|(i, _)| i)
                    .collect(),
            };
            for position in positions {
                let _ = view.replace_range(position, 1, vec![result.clone()]);
            }
        }
        ElementEvent::Reset { pairs } => {
            let elements: Vec<T> = pairs.iter().map(|(t, _)| t.clone()).collect();
            if let Some(index_map) = &mut state.index {
                index_map.rebuild(&elements);
            }
            view.reset(pairs.iter().map(|(_, r)| r.clone()).collect());
        }
        ElementEvent::ResultChanging { .. }
        | ElementEvent::FaultChanging { .. }
        | ElementEvent::FaultChanged { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;
    use vista_eval::Expression;

    fn doubled() -> Expression<i64, i64> {
        Expression::infallible(|x: &i64| x * 2)
    }

    fn strategies() -> [IndexingStrategy; 2] {
        [IndexingStrategy::NoneOrInherit, IndexingStrategy::HashTable]
    }

    #[test]
    fn test_initial_alignment() {
        for strategy in strategies() {
            let source = Arc::new(ObservableVector::with_items(vec![1i64, 2, 3]));
            let projected =
                ProjectedView::new(SequenceEvaluator::new(source, doubled()), strategy);
            assert_eq!(projected.snapshot(), vec![2, 4, 6]);
        }
    }

    #[test]
    fn test_insert_shifts_positions() {
        for strategy in strategies() {
            let source = Arc::new(ObservableVector::with_items(vec![1i64, 4]));
            let projected =
                ProjectedView::new(SequenceEvaluator::new(source.clone(), doubled()), strategy);

            source.insert_all(1, vec![2, 3]).unwrap();
            assert_eq!(projected.snapshot(), vec![2, 4, 6, 8]);
        }
    }

    #[test]
    fn test_remove_and_move() {
        for strategy in strategies() {
            let source = Arc::new(ObservableVector::with_items(vec![1i64, 2, 3, 4]));
            let projected =
                ProjectedView::new(SequenceEvaluator::new(source.clone(), doubled()), strategy);

            source.remove_range(1, 1).unwrap();
            assert_eq!(projected.snapshot(), vec![2, 6, 8]);

            source.move_range(0, 2, 1).unwrap();
            assert_eq!(projected.snapshot(), vec![6, 8, 2]);
        }
    }

    #[test]
    fn test_result_change_mirrors_duplicates() {
        for strategy in strategies() {
            let offset = Arc::new(AtomicI64::new(0));
            let o = offset.clone();
            let expr =
                Expression::infallible(move |x: &i64| x * 2 + o.load(Ordering::SeqCst));

            let source = Arc::new(ObservableVector::with_items(vec![3i64, 1, 3]));
            let evaluator = SequenceEvaluator::new(source, expr);
            let projected = ProjectedView::new(evaluator.clone(), strategy);
            assert_eq!(projected.snapshot(), vec![6, 2, 6]);

            offset.store(1, Ordering::SeqCst);
            evaluator.refresh(&3);

            // Both duplicate positions carry the new value.
            assert_eq!(projected.snapshot(), vec![7, 2, 7]);
        }
    }

    #[test]
    fn test_reset() {
        for strategy in strategies() {
            let source = Arc::new(ObservableVector::with_items(vec![1i64]));
            let projected =
                ProjectedView::new(SequenceEvaluator::new(source.clone(), doubled()), strategy);

            source.reset(vec![10, 20]);
            assert_eq!(projected.snapshot(), vec![20, 40]);
        }
    }

    #[test]
    fn test_dispose_round_trip() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let projected = ProjectedView::new(
            SequenceEvaluator::new(source.clone(), doubled()),
            IndexingStrategy::HashTable,
        );

        projected.dispose();
        source.push(9);
        assert_eq!(projected.snapshot(), vec![2]);
    }
}
