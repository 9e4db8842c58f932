//! Incremental ordering operator (OrderBy).

use core::cmp::Ordering as CmpOrdering;
use core::hash::Hash;
use core::sync::atomic::{AtomicBool, Ordering};
use hashbrown::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use vista_collections::{lock, ObservableVector, SubscriptionId};
use vista_core::{ElementEvent, IndexingStrategy};
use vista_eval::SequenceEvaluator;
use vista_index::{PositionedMultiset, Run};

/// Sort direction for the convenience constructor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

type Comparer<K> = Arc<dyn Fn(&K, &K) -> CmpOrdering + Send + Sync>;

/// Maintains a totally ordered view of the source elements under a live
/// sort key.
///
/// Identical duplicate elements are grouped into one `(start, len)` run.
/// Elements with equal keys otherwise retain their insertion order (stable).
/// With `NoneOrInherit`, a changed element is located at its old slot and
/// bubbled outward one slot at a time; with an indexed strategy the run map
/// provides O(1) amortized relocation, every other run's start being shifted
/// across the affected span.
pub struct SortedView<T, K> {
    view: Arc<ObservableVector<T>>,
    evaluator: Arc<SequenceEvaluator<T, K>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

struct SortState<T, K> {
    comparer: Comparer<K>,
    strategy: IndexingStrategy,
    /// Mirror of the view contents; the authority for scans and splices.
    items: Vec<T>,
    /// Current sort key per logical element.
    keys: HashMap<T, K>,
    runs: PositionedMultiset<T>,
}

impl<T, K> SortedView<T, K>
where
    T: Clone + Eq + Hash + Ord + Send + Sync + 'static,
    K: Clone + PartialEq + Default + Send + Sync + 'static,
{
    /// Builds an ascending or descending view using the key's total order.
    pub fn new(
        evaluator: Arc<SequenceEvaluator<T, K>>,
        order: SortOrder,
        strategy: IndexingStrategy,
    ) -> Self
    where
        K: Ord,
    {
        let comparer: Comparer<K> = match order {
            SortOrder::Ascending => Arc::new(|a: &K, b: &K| a.cmp(b)),
            SortOrder::Descending => Arc::new(|a: &K, b: &K| b.cmp(a)),
        };
        Self::with_comparer(evaluator, comparer, strategy)
    }

    /// Builds a view ordered by an explicit deterministic comparer,
    /// e.g. several ascending/descending key selectors combined
    /// lexicographically.
    pub fn with_comparer(
        evaluator: Arc<SequenceEvaluator<T, K>>,
        comparer: Comparer<K>,
        strategy: IndexingStrategy,
    ) -> Self {
        let mut state = SortState {
            comparer,
            strategy,
            items: Vec::new(),
            keys: HashMap::new(),
            runs: PositionedMultiset::new(strategy),
        };
        state.rebuild(&evaluator.snapshot());
        let view = Arc::new(ObservableVector::with_items(state.items.clone()));
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

        debug!(len = view.len(), indexed = strategy.is_indexed(), "sorted view constructed");
        Self {
            view,
            evaluator,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// The derived, ordered view.
    #[inline]
    pub fn view(&self) -> &Arc<ObservableVector<T>> {
        &self.view
    }

    /// The upstream evaluator.
    #[inline]
    pub fn evaluator(&self) -> &Arc<SequenceEvaluator<T, K>> {
        &self.evaluator
    }

    /// Current contents of the derived view, in order.
    pub fn snapshot(&self) -> Vec<T> {
        self.view.snapshot()
    }

    /// Number of elements.
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
        debug!("sorted view disposed");
    }
}

impl<T, K> Drop for SortedView<T, K> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.evaluator.unsubscribe(self.subscription);
        }
    }
}

fn apply<T, K>(view: &ObservableVector<T>, state: &mut SortState<T, K>, event: &ElementEvent<T, K>)
where
    T: Clone + Eq + Hash + Ord + Send + Sync + 'static,
    K: Clone + PartialEq + Default + Send + Sync + 'static,
{
    match event {
        ElementEvent::Added { pairs, .. } => {
            if state.items.is_empty() {
                // Batch into an empty view: sort once and reset.
                state.rebuild(pairs);
                view.reset(state.items.clone());
            } else {
                for (element, key) in pairs {
                    state.add_one(view, element, key);
                }
            }
        }
        ElementEvent::Removed { pairs, .. } => {
            if pairs.len() >= state.items.len() {
                // Removal covering the entire view: clear bookkeeping.
                state.items.clear();
                state.keys.clear();
                state.runs.clear();
                view.reset(Vec::new());
            } else {
                for (element, _) in pairs {
                    state.remove_one(view, element);
                }
            }
        }
        ElementEvent::ResultChanged {
            element, result, ..
        } => {
            state.relocate(view, element, result);
        }
        ElementEvent::Reset { pairs } => {
            state.rebuild(pairs);
            view.reset(state.items.clone());
        }
        // Source order does not influence a sorted view; pre-change keys are
        // already held in the state's own key map.
        ElementEvent::Moved { .. }
        | ElementEvent::ResultChanging { .. }
        | ElementEvent::FaultChanging { .. }
        | ElementEvent::FaultChanged { .. } => {}
    }
}

impl<T, K> SortState<T, K>
where
    T: Clone + Eq + Hash + Ord + Send + Sync + 'static,
    K: Clone + PartialEq + Default + Send + Sync + 'static,
{
    /// Rebuilds bookkeeping wholesale: stable sort by key, then group
    /// duplicate elements next to their first occurrence.
    fn rebuild(&mut self, pairs: &[(T, K)]) {
        self.keys.clear();
        for (element, key) in pairs {
            self.keys.insert(element.clone(), key.clone());
        }

        let mut sorted: Vec<T> = pairs.iter().map(|(t, _)| t.clone()).collect();
        sorted.sort_by(|a, b| self.compare_elements(a, b));

        let mut grouped: Vec<(T, usize)> = Vec::new();
        let mut slot_of: HashMap<T, usize> = HashMap::new();
        for element in sorted {
            match slot_of.get(&element) {
                Some(&slot) => grouped[slot].1 += 1,
                None => {
                    slot_of.insert(element.clone(), grouped.len());
                    grouped.push((element, 1));
                }
            }
        }

        self.items.clear();
        self.runs.clear();
        let mut position = 0;
        for (element, count) in grouped {
            self.runs.set(element.clone(), Run::new(position, count));
            for _ in 0..count {
                self.items.push(element.clone());
            }
            position += count;
        }
    }

    fn compare_elements(&self, a: &T, b: &T) -> CmpOrdering {
        match (self.keys.get(a), self.keys.get(b)) {
            (Some(ka), Some(kb)) => (self.comparer)(ka, kb),
            _ => CmpOrdering::Equal,
        }
    }

    /// The run occupied by `element`: from the index, or by scanning.
    fn find_run(&self, element: &T) -> Option<Run> {
        if self.runs.is_indexed() {
            self.runs.run(element)
        } else {
            let start = self.items.iter().position(|t| t == element)?;
            let len = self.items[start..]
                .iter()
                .take_while(|t| *t == element)
                .count();
            Some(Run::new(start, len))
        }
    }

    /// First position whose key compares greater than `key` (upper bound).
    fn upper_bound(&self, key: &K) -> usize {
        self.items.partition_point(|t| match self.keys.get(t) {
            Some(k) => (self.comparer)(k, key) != CmpOrdering::Greater,
            None => true,
        })
    }

    /// Outward scan from the old slot, one position at a time, over items
    /// that no longer contain the relocating run.
    fn bubble_target(&self, old_pos: usize, key: &K) -> usize {
        let start = old_pos.min(self.items.len());
        let mut pos = start;
        while pos > 0 {
            match self.keys.get(&self.items[pos - 1]) {
                Some(k) if (self.comparer)(k, key) == CmpOrdering::Greater => pos -= 1,
                _ => break,
            }
        }
        if pos == start {
            while pos < self.items.len() {
                match self.keys.get(&self.items[pos]) {
                    Some(k) if (self.comparer)(k, key) != CmpOrdering::Greater => pos += 1,
                    _ => break,
                }
            }
        }
        pos
    }

    /// Splices one occurrence in: next to its duplicates if the element is
    /// already present, at its key's upper bound otherwise.
    fn add_one(&mut self, view: &ObservableVector<T>, element: &T, key: &K) {
        self.keys.insert(element.clone(), key.clone());
        if let Some(run) = self.find_run(element) {
            self.items.insert(run.start, element.clone());
            self.runs.shift(run.start + 1, 1);
            self.runs
                .set(element.clone(), Run::new(run.start, run.len + 1));
            let _ = view.insert_all(run.start, vec![element.clone()]);
        } else {
            let position = self.upper_bound(key);
            self.items.insert(position, element.clone());
            self.runs.shift(position, 1);
            self.runs.set(element.clone(), Run::new(position, 1));
            let _ = view.insert_all(position, vec![element.clone()]);
        }
    }

    /// Removes one occurrence and compacts surviving run starts.
    fn remove_one(&mut self, view: &ObservableVector<T>, element: &T) {
        let Some(run) = self.find_run(element) else {
            return;
        };
        self.items.remove(run.start);
        let _ = view.remove_range(run.start, 1);
        if run.len == 1 {
            self.runs.remove(element);
            self.keys.remove(element);
        } else {
            self.runs
                .set(element.clone(), Run::new(run.start, run.len - 1));
        }
        self.runs.shift(run.start + 1, -1);
    }

    /// Moves an element's whole run to the slot its new key demands,
    /// issuing a single move on the view if it actually relocated.
    fn relocate(&mut self, view: &ObservableVector<T>, element: &T, new_key: &K) {
        let Some(run) = self.find_run(element) else {
            self.keys.insert(element.clone(), new_key.clone());
            return;
        };
        let old_pos = run.start;
        let len = run.len;

        let _: Vec<T> = self.items.drain(old_pos..old_pos + len).collect();
        self.keys.insert(element.clone(), new_key.clone());

        let target = match self.strategy {
            IndexingStrategy::NoneOrInherit => self.bubble_target(old_pos, new_key),
            _ => self.upper_bound(new_key),
        };

        for offset in 0..len {
            self.items.insert(target + offset, element.clone());
        }
        if self.runs.is_indexed() {
            self.runs.remove(element);
            self.runs.shift(old_pos, -(len as isize));
            self.runs.shift(target, len as isize);
            self.runs.set(element.clone(), Run::new(target, len));
        }

        if target != old_pos {
            let _ = view.move_range(old_pos, target, len);
        }
    }
}
