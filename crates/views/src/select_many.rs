//! Flattening projection operator (SelectMany).

use core::hash::Hash;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use vista_collections::{lock, ObservableVector, SubscriptionId};
use vista_core::{ElementEvent, SequenceChange};
use vista_eval::SequenceEvaluator;

/// A change-notifying result sequence produced per source element.
///
/// Equality is identity: two `Nested` handles compare equal when they wrap
/// the same underlying vector, which is what a flattening view needs to
/// decide whether an element's producer actually changed.
pub struct Nested<U>(pub Arc<ObservableVector<U>>);

impl<U> Nested<U>
where
    U: Clone + Send + Sync + 'static,
{
    /// Wraps an existing observable sequence.
    pub fn new(vector: Arc<ObservableVector<U>>) -> Self {
        Self(vector)
    }

    /// Creates a fresh nested sequence with the given contents.
    pub fn from_items(items: Vec<U>) -> Self {
        Self(Arc::new(ObservableVector::with_items(items)))
    }
}

impl<U> Clone for Nested<U> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<U> PartialEq for Nested<U> {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl<U> Default for Nested<U>
where
    U: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self(Arc::new(ObservableVector::new()))
    }
}

struct NestedEntry<T, U> {
    token: u64,
    element: T,
    vector: Arc<ObservableVector<U>>,
    sub: SubscriptionId,
    /// Starting offset of this producer's results in the flattened output.
    start: usize,
    /// Number of results this producer currently contributes.
    len: usize,
}

struct FlattenState<T, U> {
    entries: Vec<NestedEntry<T, U>>,
    next_token: u64,
}

/// Maintains the concatenation of every source element's nested result
/// sequence, in source order.
///
/// Each producer is listened to independently, so in-place edits to one
/// nested sequence propagate as edits to the flattened output with every
/// other producer's offset adjusted by the length delta. Nested positions
/// resolve into output positions through the per-element `(start, len)`
/// offset table.
pub struct FlattenedView<T, U> {
    view: Arc<ObservableVector<U>>,
    evaluator: Arc<SequenceEvaluator<T, Nested<U>>>,
    state: Arc<Mutex<FlattenState<T, U>>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

impl<T, U> FlattenedView<T, U>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    /// Builds the flattened view from the evaluator's current snapshot and
    /// subscribes to it and to every nested producer.
    pub fn new(evaluator: Arc<SequenceEvaluator<T, Nested<U>>>) -> Self {
        let view = Arc::new(ObservableVector::new());
        let state = Arc::new(Mutex::new(FlattenState {
            entries: Vec::new(),
            next_token: 1,
        }));

        {
            let mut st = lock(&state);
            let mut flat = Vec::new();
            for (element, nested) in evaluator.snapshot() {
                let items = nested.0.snapshot();
                let token = st.next_token;
                st.next_token += 1;
                let sub = subscribe_nested(&state, &view, &nested.0, token);
                st.entries.push(NestedEntry {
                    token,
                    element,
                    vector: nested.0.clone(),
                    sub,
                    start: flat.len(),
                    len: items.len(),
                });
                flat.extend(items);
            }
            view.reset(flat);
        }

        let weak_view = Arc::downgrade(&view);
        let weak_state = Arc::downgrade(&state);
        let subscription = evaluator.subscribe(move |event| {
            let (Some(view), Some(state)) = (weak_view.upgrade(), weak_state.upgrade()) else {
                return;
            };
            apply(&view, &state, event);
        });

        debug!(len = view.len(), "flattened view constructed");
        Self {
            view,
            evaluator,
            state,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// The derived, flattened view.
    #[inline]
    pub fn view(&self) -> &Arc<ObservableVector<U>> {
        &self.view
    }

    /// The upstream evaluator.
    #[inline]
    pub fn evaluator(&self) -> &Arc<SequenceEvaluator<T, Nested<U>>> {
        &self.evaluator
    }

    /// Current contents of the derived view.
    pub fn snapshot(&self) -> Vec<U> {
        self.view.snapshot()
    }

    /// Number of flattened results.
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Returns true if no producer contributes anything.
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// The `(start, len)` span one source position contributes.
    pub fn span_of(&self, source_position: usize) -> Option<(usize, usize)> {
        let st = lock(&self.state);
        st.entries
            .get(source_position)
            .map(|e| (e.start, e.len))
    }

    /// Stops incremental maintenance, including every nested subscription.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.evaluator.unsubscribe(self.subscription);
        let st = lock(&self.state);
        for entry in &st.entries {
            entry.vector.unsubscribe(entry.sub);
        }
        debug!("flattened view disposed");
    }
}

impl<T, U> Drop for FlattenedView<T, U> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.evaluator.unsubscribe(self.subscription);
            let st = lock(&self.state);
            for entry in &st.entries {
                entry.vector.unsubscribe(entry.sub);
            }
        }
    }
}

fn subscribe_nested<T, U>(
    state: &Arc<Mutex<FlattenState<T, U>>>,
    view: &Arc<ObservableVector<U>>,
    vector: &Arc<ObservableVector<U>>,
    token: u64,
) -> SubscriptionId
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    let weak_state = Arc::downgrade(state);
    let weak_view = Arc::downgrade(view);
    vector.subscribe(move |change| {
        let (Some(state), Some(view)) = (weak_state.upgrade(), weak_view.upgrade()) else {
            return;
        };
        let mut st = lock(&state);
        apply_nested(&view, &mut st, token, change);
    })
}

/// Adjusts the starting offsets of every entry after `slot` by `delta`.
fn shift_after<T, U>(st: &mut FlattenState<T, U>, slot: usize, delta: isize) {
    if delta == 0 {
        return;
    }
    for entry in &mut st.entries[slot + 1..] {
        entry.start = (entry.start as isize + delta) as usize;
    }
}

fn apply_nested<T, U>(
    view: &ObservableVector<U>,
    st: &mut FlattenState<T, U>,
    token: u64,
    change: &SequenceChange<U>,
) where
    U: Clone + Send + Sync + 'static,
{
    let Some(slot) = st.entries.iter().position(|e| e.token == token) else {
        return;
    };
    let start = st.entries[slot].start;
    match change {
        SequenceChange::Added { index, items } => {
            let at = start + (*index).min(st.entries[slot].len);
            st.entries[slot].len += items.len();
            shift_after(st, slot, items.len() as isize);
            let _ = view.insert_all(at, items.clone());
        }
        SequenceChange::Removed { index, items } => {
            st.entries[slot].len = st.entries[slot].len.saturating_sub(items.len());
            shift_after(st, slot, -(items.len() as isize));
            let _ = view.remove_range(start + index, items.len());
        }
        SequenceChange::Replaced { index, old, new } => {
            let delta = new.len() as isize - old.len() as isize;
            st.entries[slot].len = (st.entries[slot].len as isize + delta) as usize;
            shift_after(st, slot, delta);
            let _ = view.replace_range(start + index, old.len(), new.clone());
        }
        SequenceChange::Moved { from, to, items } => {
            let _ = view.move_range(start + from, start + to, items.len());
        }
        SequenceChange::Reset { items } => {
            let old_len = st.entries[slot].len;
            st.entries[slot].len = items.len();
            shift_after(st, slot, items.len() as isize - old_len as isize);
            let _ = view.replace_range(start, old_len, items.clone());
        }
    }
}

fn insert_entry<T, U>(
    st: &mut FlattenState<T, U>,
    state: &Arc<Mutex<FlattenState<T, U>>>,
    view: &Arc<ObservableVector<U>>,
    slot: usize,
    element: &T,
    nested: &Nested<U>,
) where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    let items = nested.0.snapshot();
    let start = if slot == 0 {
        0
    } else {
        st.entries[slot - 1].start + st.entries[slot - 1].len
    };
    for entry in &mut st.entries[slot..] {
        entry.start += items.len();
    }
    let token = st.next_token;
    st.next_token += 1;
    let sub = subscribe_nested(state, view, &nested.0, token);
    st.entries.insert(
        slot,
        NestedEntry {
            token,
            element: element.clone(),
            vector: nested.0.clone(),
            sub,
            start,
            len: items.len(),
        },
    );
    let _ = view.insert_all(start, items);
}

fn remove_entry<T, U>(st: &mut FlattenState<T, U>, view: &ObservableVector<U>, slot: usize)
where
    U: Clone + Send + Sync + 'static,
{
    let entry = st.entries.remove(slot);
    entry.vector.unsubscribe(entry.sub);
    for later in &mut st.entries[slot..] {
        later.start -= entry.len;
    }
    let _ = view.remove_range(entry.start, entry.len);
}

fn apply<T, U>(
    view: &Arc<ObservableVector<U>>,
    state: &Arc<Mutex<FlattenState<T, U>>>,
    event: &ElementEvent<T, Nested<U>>,
) where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    match event {
        ElementEvent::Added { index, pairs } => {
            let mut st = lock(state);
            let mut slot = (*index).min(st.entries.len());
            for (element, nested) in pairs {
                insert_entry(&mut st, state, view, slot, element, nested);
                slot += 1;
            }
        }
        ElementEvent::Removed { index, pairs } => {
            let mut st = lock(state);
            for _ in 0..pairs.len() {
                if *index >= st.entries.len() {
                    break;
                }
                remove_entry(&mut st, view, *index);
            }
        }
        ElementEvent::Moved { from, to, pairs } => {
            let count = pairs.len();
            let mut st = lock(state);
            if from + count > st.entries.len() || to + count > st.entries.len() {
                return;
            }
            let flat_from = st.entries[*from].start;
            let total: usize = st.entries[*from..*from + count].iter().map(|e| e.len).sum();
            let block: Vec<NestedEntry<T, U>> = st.entries.drain(*from..*from + count).collect();
            let _ = st.entries.splice(*to..*to, block);
            let mut position = 0;
            for entry in &mut st.entries {
                entry.start = position;
                position += entry.len;
            }
            let flat_to = st.entries[*to].start;
            if flat_from != flat_to {
                let _ = view.move_range(flat_from, flat_to, total);
            }
        }
        ElementEvent::ResultChanged {
            element,
            result: nested,
            ..
        } => {
            let mut st = lock(state);
            let slots: Vec<usize> = st
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| &e.element == element)
                .map(|(slot, _)| slot)
                .collect();
            for slot in slots {
                let old_start = st.entries[slot].start;
                let old_len = st.entries[slot].len;
                let old_vector = st.entries[slot].vector.clone();
                old_vector.unsubscribe(st.entries[slot].sub);

                let items = nested.0.snapshot();
                let delta = items.len() as isize - old_len as isize;
                let token = st.next_token;
                st.next_token += 1;
                let sub = subscribe_nested(state, view, &nested.0, token);
                {
                    let entry = &mut st.entries[slot];
                    entry.token = token;
                    entry.vector = nested.0.clone();
                    entry.sub = sub;
                    entry.len = items.len();
                }
                shift_after(&mut st, slot, delta);
                let _ = view.replace_range(old_start, old_len, items);
            }
        }
        ElementEvent::Reset { pairs } => {
            let mut st = lock(state);
            for entry in &st.entries {
                entry.vector.unsubscribe(entry.sub);
            }
            st.entries.clear();
            let mut flat = Vec::new();
            for (element, nested) in pairs {
                let items = nested.0.snapshot();
                let token = st.next_token;
                st.next_token += 1;
                let sub = subscribe_nested(state, view, &nested.0, token);
                st.entries.push(NestedEntry {
                    token,
                    element: element.clone(),
                    vector: nested.0.clone(),
                    sub,
                    start: flat.len(),
                    len: items.len(),
                });
                flat.extend(items);
            }
            view.reset(flat);
        }
        ElementEvent::ResultChanging { .. }
        | ElementEvent::FaultChanging { .. }
        | ElementEvent::FaultChanged { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;
    use vista_eval::Expression;

    /// Expression that looks each element's producer up in a shared table.
    fn table_expr(
        table: Arc<Mutex<HashMap<i64, Nested<i64>>>>,
    ) -> Expression<i64, Nested<i64>> {
        Expression::infallible(move |x: &i64| {
            lock(&table).get(x).cloned().unwrap_or_default()
        })
    }

    fn setup(
        elements: Vec<i64>,
        producers: Vec<(i64, Vec<i64>)>,
    ) -> (
        Arc<ObservableVector<i64>>,
        Arc<Mutex<HashMap<i64, Nested<i64>>>>,
        Arc<SequenceEvaluator<i64, Nested<i64>>>,
        FlattenedView<i64, i64>,
    ) {
        let mut table = HashMap::new();
        for (element, items) in producers {
            table.insert(element, Nested::from_items(items));
        }
        let table = Arc::new(Mutex::new(table));
        let source = Arc::new(ObservableVector::with_items(elements));
        let evaluator = SequenceEvaluator::new(source.clone(), table_expr(table.clone()));
        let flattened = FlattenedView::new(evaluator.clone());
        (source, table, evaluator, flattened)
    }

    #[test]
    fn test_initial_flatten() {
        let (_, _, _, flattened) = setup(
            vec![1, 2],
            vec![(1, vec![10, 11]), (2, vec![20])],
        );
        assert_eq!(flattened.snapshot(), vec![10, 11, 20]);
        assert_eq!(flattened.span_of(0), Some((0, 2)));
        assert_eq!(flattened.span_of(1), Some((2, 1)));
    }

    #[test]
    fn test_nested_edit_propagates_and_shifts_offsets() {
        let (_, table, _, flattened) = setup(
            vec![1, 2],
            vec![(1, vec![10]), (2, vec![20, 21])],
        );

        let first = lock(&table).get(&1).cloned().unwrap();
        first.0.push(11);

        assert_eq!(flattened.snapshot(), vec![10, 11, 20, 21]);
        assert_eq!(flattened.span_of(1), Some((2, 2)));

        first.0.remove_range(0, 2).unwrap();
        assert_eq!(flattened.snapshot(), vec![20, 21]);
        assert_eq!(flattened.span_of(0), Some((0, 0)));
    }

    #[test]
    fn test_nested_move_resolves_through_offsets() {
        let (_, table, _, flattened) = setup(
            vec![1, 2],
            vec![(1, vec![9]), (2, vec![20, 21, 22])],
        );

        let second = lock(&table).get(&2).cloned().unwrap();
        second.0.move_range(0, 2, 1).unwrap();

        assert_eq!(flattened.snapshot(), vec![9, 21, 22, 20]);
    }

    #[test]
    fn test_source_add_and_remove() {
        let (source, mut_table, _, flattened) = setup(
            vec![1],
            vec![(1, vec![10]), (2, vec![20, 21]), (3, vec![30])],
        );
        let _ = mut_table;

        source.insert_all(0, vec![2]).unwrap();
        assert_eq!(flattened.snapshot(), vec![20, 21, 10]);

        source.push(3);
        assert_eq!(flattened.snapshot(), vec![20, 21, 10, 30]);

        source.remove_item(&2);
        assert_eq!(flattened.snapshot(), vec![10, 30]);
    }

    #[test]
    fn test_source_move() {
        let (source, _, _, flattened) = setup(
            vec![1, 2, 3],
            vec![(1, vec![10, 11]), (2, vec![20]), (3, vec![30, 31])],
        );
        assert_eq!(flattened.snapshot(), vec![10, 11, 20, 30, 31]);

        // Move element 1 to the end: 2 3 1.
        source.move_range(0, 2, 1).unwrap();
        assert_eq!(flattened.snapshot(), vec![20, 30, 31, 10, 11]);
    }

    #[test]
    fn test_result_change_swaps_producer() {
        let (_, table, evaluator, flattened) = setup(
            vec![1, 2],
            vec![(1, vec![10]), (2, vec![20])],
        );

        // Element 1 now produces a different sequence.
        let replacement = Nested::from_items(vec![77, 78]);
        lock(&table).insert(1, replacement.clone());
        evaluator.refresh(&1);

        assert_eq!(flattened.snapshot(), vec![77, 78, 20]);

        // Edits to the old producer are ignored; the new one is live.
        replacement.0.push(79);
        assert_eq!(flattened.snapshot(), vec![77, 78, 79, 20]);
    }

    #[test]
    fn test_reset() {
        let (source, table, _, flattened) = setup(
            vec![1],
            vec![(1, vec![10]), (2, vec![20])],
        );
        let _ = table;

        source.reset(vec![2, 1]);
        assert_eq!(flattened.snapshot(), vec![20, 10]);
    }

    #[test]
    fn test_dispose_round_trip() {
        let (source, table, _, flattened) = setup(vec![1], vec![(1, vec![10])]);

        flattened.dispose();
        source.push(2);
        let first = lock(&table).get(&1).cloned().unwrap();
        first.0.push(11);

        assert_eq!(flattened.snapshot(), vec![10]);
    }
}
