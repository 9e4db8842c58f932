//! Keyed (map) operator variants.
//!
//! Analogues of Where/Select/GroupBy over key-value sources, plus
//! `ToMapView`, which projects a sequence into a keyed view while tracking
//! the two map-level fault conditions: a null-key count and a per-key
//! excess-occurrence (duplicate) count. The null-key fault takes precedence
//! for reporting.

use core::hash::Hash;
use core::sync::atomic::{AtomicBool, Ordering};
use hashbrown::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use vista_collections::{lock, FaultSlot, ObservableMap, ObservableVector, SubscriptionId};
use vista_core::{ElementEvent, EntryEvent, OperationFault};
use vista_eval::{MapEvaluator, SequenceEvaluator};

// ---------------------------------------------------------------------------
// FilteredMapView — Where over key-value pairs
// ---------------------------------------------------------------------------

/// Maintains the entries whose live predicate is true.
pub struct FilteredMapView<K, V> {
    view: Arc<ObservableMap<K, V>>,
    evaluator: Arc<MapEvaluator<K, V, bool>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

impl<K, V> FilteredMapView<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Builds the view from the evaluator's current snapshot and subscribes
    /// to its changes.
    pub fn new(evaluator: Arc<MapEvaluator<K, V, bool>>) -> Self {
        let source = evaluator.source().clone();
        let initial: Vec<(K, V)> = evaluator
            .snapshot()
            .into_iter()
            .filter(|(_, matches)| *matches)
            .filter_map(|(key, _)| source.get(&key).map(|value| (key, value)))
            .collect();
        let view = Arc::new(ObservableMap::with_entries(initial));

        let weak_view = Arc::downgrade(&view);
        let weak_eval = Arc::downgrade(&evaluator);
        let subscription = evaluator.subscribe(move |event| {
            let (Some(view), Some(evaluator)) = (weak_view.upgrade(), weak_eval.upgrade()) else {
                return;
            };
            apply_filter_map(&view, &evaluator, event);
        });

        debug!(len = view.len(), "filtered map view constructed");
        Self {
            view,
            evaluator,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// The derived keyed view.
    #[inline]
    pub fn view(&self) -> &Arc<ObservableMap<K, V>> {
        &self.view
    }

    /// Number of matching entries.
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Returns true if nothing matches.
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.evaluator.unsubscribe(self.subscription);
    }
}

impl<K, V> Drop for FilteredMapView<K, V> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.evaluator.unsubscribe(self.subscription);
        }
    }
}

fn apply_filter_map<K, V>(
    view: &ObservableMap<K, V>,
    evaluator: &MapEvaluator<K, V, bool>,
    event: &EntryEvent<K, bool>,
) where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let source = evaluator.source();
    let entry_for = |key: &K| source.get(key).map(|value| (key.clone(), value));
    match event {
        EntryEvent::Added { pairs } => {
            let entries: Vec<(K, V)> = pairs
                .iter()
                .filter(|(_, matches)| *matches)
                .filter_map(|(key, _)| entry_for(key))
                .collect();
            view.insert_all(entries);
        }
        EntryEvent::Removed { pairs } => {
            let keys: Vec<K> = pairs.iter().map(|(key, _)| key.clone()).collect();
            view.remove_keys(&keys);
        }
        EntryEvent::Replaced { pairs } => {
            for (key, _, matches_now) in pairs {
                if *matches_now {
                    if let Some(entry) = entry_for(key) {
                        view.insert_all(vec![entry]);
                    }
                } else {
                    view.remove_keys(&[key.clone()]);
                }
            }
        }
        EntryEvent::ResultChanged { key, result } => {
            if *result {
                if let Some(entry) = entry_for(key) {
                    view.insert_all(vec![entry]);
                }
            } else {
                view.remove_keys(&[key.clone()]);
            }
        }
        EntryEvent::Reset { pairs } => {
            let entries: Vec<(K, V)> = pairs
                .iter()
                .filter(|(_, matches)| *matches)
                .filter_map(|(key, _)| entry_for(key))
                .collect();
            view.reset(entries);
        }
        EntryEvent::ResultChanging { .. }
        | EntryEvent::FaultChanging { .. }
        | EntryEvent::FaultChanged { .. } => {}
    }
}

// ---------------------------------------------------------------------------
// ProjectedMapView — Select over key-value pairs
// ---------------------------------------------------------------------------

/// Maintains each key's live projected result.
pub struct ProjectedMapView<K, V, R> {
    view: Arc<ObservableMap<K, R>>,
    evaluator: Arc<MapEvaluator<K, V, R>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

impl<K, V, R> ProjectedMapView<K, V, R>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    R: Clone + PartialEq + Default + Send + Sync + 'static,
{
    /// Builds the view from the evaluator's current snapshot and subscribes
    /// to its changes.
    pub fn new(evaluator: Arc<MapEvaluator<K, V, R>>) -> Self {
        let view = Arc::new(ObservableMap::with_entries(evaluator.snapshot()));

        let weak_view = Arc::downgrade(&view);
        let subscription = evaluator.subscribe(move |event| {
            let Some(view) = weak_view.upgrade() else {
                return;
            };
            match event {
                EntryEvent::Added { pairs } => view.insert_all(pairs.clone()),
                EntryEvent::Removed { pairs } => {
                    let keys: Vec<K> = pairs.iter().map(|(key, _)| key.clone()).collect();
                    view.remove_keys(&keys);
                }
                EntryEvent::Replaced { pairs } => {
                    view.insert_all(
                        pairs
                            .iter()
                            .map(|(key, _, new)| (key.clone(), new.clone()))
                            .collect(),
                    );
                }
                EntryEvent::ResultChanged { key, result } => {
                    view.insert_all(vec![(key.clone(), result.clone())]);
                }
                EntryEvent::Reset { pairs } => view.reset(pairs.clone()),
                EntryEvent::ResultChanging { .. }
                | EntryEvent::FaultChanging { .. }
                | EntryEvent::FaultChanged { .. } => {}
            }
        });

        debug!(len = view.len(), "projected map view constructed");
        Self {
            view,
            evaluator,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// The derived keyed view of results.
    #[inline]
    pub fn view(&self) -> &Arc<ObservableMap<K, R>> {
        &self.view
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.evaluator.unsubscribe(self.subscription);
    }
}

impl<K, V, R> Drop for ProjectedMapView<K, V, R> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.evaluator.unsubscribe(self.subscription);
        }
    }
}

// ---------------------------------------------------------------------------
// ToMapView — sequence projected into a keyed view with key faults
// ---------------------------------------------------------------------------

struct ToMapState<K, V> {
    /// Values contributed per key; the first entry is the exposed winner.
    entries: HashMap<K, Vec<V>>,
    /// Occurrences whose key selector produced no key.
    null_count: usize,
    /// Total excess occurrences across all duplicated keys.
    excess: usize,
}

/// Projects each source element to an optional `(key, value)` pair and
/// maintains the keyed view of first-winner entries.
///
/// A selector returning `None` counts toward the null-key fault; a key
/// contributed more than once counts toward the duplicate-key fault. The
/// view's operation fault is `NullKey` whenever any null key exists (it
/// takes precedence) and `DuplicateKey` whenever the excess count is
/// nonzero.
pub struct ToMapView<T, K, V> {
    map: Arc<ObservableMap<K, V>>,
    fault: Arc<FaultSlot>,
    evaluator: Arc<SequenceEvaluator<T, Option<(K, V)>>>,
    state: Arc<Mutex<ToMapState<K, V>>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

impl<T, K, V> ToMapView<T, K, V>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Builds the keyed view from the evaluator's current snapshot and
    /// subscribes to its changes.
    pub fn new(evaluator: Arc<SequenceEvaluator<T, Option<(K, V)>>>) -> Self {
        let map = Arc::new(ObservableMap::new());
        let fault = Arc::new(FaultSlot::new());
        let mut state = ToMapState {
            entries: HashMap::new(),
            null_count: 0,
            excess: 0,
        };
        for (_, result) in evaluator.snapshot() {
            add_projection(&mut state, &map, &result);
        }
        set_key_fault(&fault, &state);
        let state = Arc::new(Mutex::new(state));

        let weak_map = Arc::downgrade(&map);
        let weak_fault = Arc::downgrade(&fault);
        let apply_state = state.clone();
        let subscription = evaluator.subscribe(move |event| {
            let (Some(map), Some(fault)) = (weak_map.upgrade(), weak_fault.upgrade()) else {
                return;
            };
            let mut state = lock(&apply_state);
            apply_to_map(&map, &fault, &mut state, event);
        });

        debug!(len = map.len(), "to-map view constructed");
        Self {
            map,
            fault,
            evaluator,
            state,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// The derived keyed view.
    #[inline]
    pub fn map(&self) -> &Arc<ObservableMap<K, V>> {
        &self.map
    }

    /// The view-level fault slot.
    #[inline]
    pub fn fault(&self) -> &Arc<FaultSlot> {
        &self.fault
    }

    /// Occurrences whose key selector produced no key.
    pub fn null_key_count(&self) -> usize {
        lock(&self.state).null_count
    }

    /// Total excess occurrences across duplicated keys.
    pub fn duplicate_key_count(&self) -> usize {
        lock(&self.state).excess
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.evaluator.unsubscribe(self.subscription);
        debug!("to-map view disposed");
    }
}

impl<T, K, V> Drop for ToMapView<T, K, V> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.evaluator.unsubscribe(self.subscription);
        }
    }
}

fn add_projection<K, V>(
    state: &mut ToMapState<K, V>,
    map: &ObservableMap<K, V>,
    result: &Option<(K, V)>,
) where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    match result {
        None => state.null_count += 1,
        Some((key, value)) => {
            let values = state.entries.entry(key.clone()).or_default();
            values.push(value.clone());
            if values.len() == 1 {
                map.insert(key.clone(), value.clone());
            } else {
                state.excess += 1;
            }
        }
    }
}

fn remove_projection<K, V>(
    state: &mut ToMapState<K, V>,
    map: &ObservableMap<K, V>,
    result: &Option<(K, V)>,
) where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    match result {
        None => state.null_count = state.null_count.saturating_sub(1),
        Some((key, value)) => {
            let Some(values) = state.entries.get_mut(key) else {
                return;
            };
            let Some(position) = values.iter().position(|v| v == value) else {
                return;
            };
            let had_excess = values.len() > 1;
            values.remove(position);
            if values.is_empty() {
                state.entries.remove(key);
                map.remove_keys(&[key.clone()]);
            } else {
                if had_excess {
                    state.excess = state.excess.saturating_sub(1);
                }
                if position == 0 {
                    // The winner left; the next contributor takes over.
                    map.insert(key.clone(), values[0].clone());
                }
            }
        }
    }
}

fn set_key_fault<K, V>(fault: &FaultSlot, state: &ToMapState<K, V>) {
    fault.set(if state.null_count > 0 {
        Some(OperationFault::NullKey)
    } else if state.excess > 0 {
        Some(OperationFault::DuplicateKey)
    } else {
        None
    });
}

fn apply_to_map<T, K, V>(
    map: &ObservableMap<K, V>,
    fault: &FaultSlot,
    state: &mut ToMapState<K, V>,
    event: &ElementEvent<T, Option<(K, V)>>,
) where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    match event {
        ElementEvent::Added { pairs, .. } => {
            for (_, result) in pairs {
                add_projection(state, map, result);
            }
        }
        ElementEvent::Removed { pairs, .. } => {
            for (_, result) in pairs {
                remove_projection(state, map, result);
            }
        }
        ElementEvent::ResultChanging { result, count, .. } => {
            for _ in 0..*count {
                remove_projection(state, map, result);
            }
        }
        ElementEvent::ResultChanged { result, count, .. } => {
            for _ in 0..*count {
                add_projection(state, map, result);
            }
        }
        ElementEvent::Reset { pairs } => {
            state.entries.clear();
            state.null_count = 0;
            state.excess = 0;
            map.reset(Vec::new());
            for (_, result) in pairs {
                add_projection(state, map, result);
            }
        }
        ElementEvent::Moved { .. }
        | ElementEvent::FaultChanging { .. }
        | ElementEvent::FaultChanged { .. } => {}
    }
    set_key_fault(fault, state);
}

// ---------------------------------------------------------------------------
// GroupedMapView — GroupBy over key-value pairs
// ---------------------------------------------------------------------------

/// Partitions map entries into live member views keyed by a live group key.
pub struct GroupedMapView<K, V, G> {
    view: Arc<ObservableMap<G, Arc<ObservableVector<(K, V)>>>>,
    evaluator: Arc<MapEvaluator<K, V, G>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

impl<K, V, G> GroupedMapView<K, V, G>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    G: Clone + Eq + Hash + PartialEq + Default + Send + Sync + 'static,
{
    /// Builds the grouped view from the evaluator's current snapshot and
    /// subscribes to its changes.
    pub fn new(evaluator: Arc<MapEvaluator<K, V, G>>) -> Self {
        let view = Arc::new(ObservableMap::new());
        for (key, group) in evaluator.snapshot() {
            if let Some(value) = evaluator.source().get(&key) {
                add_to_group(&view, &group, &key, value);
            }
        }

        let weak_view = Arc::downgrade(&view);
        let weak_eval = Arc::downgrade(&evaluator);
        let subscription = evaluator.subscribe(move |event| {
            let (Some(view), Some(evaluator)) = (weak_view.upgrade(), weak_eval.upgrade()) else {
                return;
            };
            apply_grouped_map(&view, &evaluator, event);
        });

        debug!(groups = view.len(), "grouped map view constructed");
        Self {
            view,
            evaluator,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// The outer view of groups.
    #[inline]
    pub fn view(&self) -> &Arc<ObservableMap<G, Arc<ObservableVector<(K, V)>>>> {
        &self.view
    }

    /// The live member view for one group key, if it exists.
    pub fn group(&self, group: &G) -> Option<Arc<ObservableVector<(K, V)>>> {
        self.view.get(group)
    }

    /// Number of live groups.
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.evaluator.unsubscribe(self.subscription);
    }
}

impl<K, V, G> Drop for GroupedMapView<K, V, G> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.evaluator.unsubscribe(self.subscription);
        }
    }
}

fn add_to_group<K, V, G>(
    view: &ObservableMap<G, Arc<ObservableVector<(K, V)>>>,
    group: &G,
    key: &K,
    value: V,
) where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    G: Clone + Eq + Hash + Send + Sync + 'static,
{
    match view.get(group) {
        Some(members) => members.push((key.clone(), value)),
        None => {
            let members = Arc::new(ObservableVector::with_items(vec![(key.clone(), value)]));
            view.insert(group.clone(), members);
        }
    }
}

fn remove_from_group<K, V, G>(
    view: &ObservableMap<G, Arc<ObservableVector<(K, V)>>>,
    group: &G,
    key: &K,
) where
    K: Clone + PartialEq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    G: Clone + Eq + Hash + Send + Sync + 'static,
{
    let Some(members) = view.get(group) else {
        return;
    };
    if let Some(position) = members
        .snapshot()
        .iter()
        .position(|(member_key, _)| member_key == key)
    {
        let _ = members.remove_range(position, 1);
    }
    if members.is_empty() {
        view.remove_keys(&[group.clone()]);
    }
}

fn apply_grouped_map<K, V, G>(
    view: &ObservableMap<G, Arc<ObservableVector<(K, V)>>>,
    evaluator: &MapEvaluator<K, V, G>,
    event: &EntryEvent<K, G>,
) where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    G: Clone + Eq + Hash + PartialEq + Default + Send + Sync + 'static,
{
    let source = evaluator.source();
    match event {
        EntryEvent::Added { pairs } => {
            for (key, group) in pairs {
                if let Some(value) = source.get(key) {
                    add_to_group(view, group, key, value);
                }
            }
        }
        EntryEvent::Removed { pairs } => {
            for (key, group) in pairs {
                remove_from_group(view, group, key);
            }
        }
        EntryEvent::Replaced { pairs } => {
            for (key, old_group, new_group) in pairs {
                remove_from_group(view, old_group, key);
                if let Some(value) = source.get(key) {
                    add_to_group(view, new_group, key, value);
                }
            }
        }
        EntryEvent::ResultChanging { key, result } => {
            remove_from_group(view, result, key);
        }
        EntryEvent::ResultChanged { key, result } => {
            if let Some(value) = source.get(key) {
                add_to_group(view, result, key, value);
            }
        }
        EntryEvent::Reset { pairs } => {
            view.reset(Vec::new());
            for (key, group) in pairs {
                if let Some(value) = source.get(key) {
                    add_to_group(view, group, key, value);
                }
            }
        }
        EntryEvent::FaultChanging { .. } | EntryEvent::FaultChanged { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_eval::{Expression, MapExpression};

    #[test]
    fn test_filtered_map() {
        let source = Arc::new(ObservableMap::with_entries(vec![
            ("a", 1i64),
            ("b", 10),
            ("c", 3),
        ]));
        let evaluator = MapEvaluator::new(
            source.clone(),
            MapExpression::infallible(|_, v: &i64| *v < 5),
        );
        let filtered = FilteredMapView::new(evaluator);

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.view().get(&"a"), Some(1));
        assert_eq!(filtered.view().get(&"b"), None);

        // Replacing a value re-evaluates membership.
        source.insert("b", 2);
        assert_eq!(filtered.view().get(&"b"), Some(2));

        source.insert("a", 100);
        assert_eq!(filtered.view().get(&"a"), None);

        source.remove_keys(&["c"]);
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn test_projected_map() {
        let source = Arc::new(ObservableMap::with_entries(vec![("a", 2i64)]));
        let evaluator = MapEvaluator::new(
            source.clone(),
            MapExpression::infallible(|_, v: &i64| v * 10),
        );
        let projected = ProjectedMapView::new(evaluator);

        assert_eq!(projected.view().get(&"a"), Some(20));

        source.insert("b", 3);
        assert_eq!(projected.view().get(&"b"), Some(30));

        source.insert("a", 5);
        assert_eq!(projected.view().get(&"a"), Some(50));

        source.remove_keys(&["a"]);
        assert_eq!(projected.view().get(&"a"), None);
        assert_eq!(projected.len(), 1);
    }

    #[test]
    fn test_to_map_basic() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2]));
        let evaluator = SequenceEvaluator::new(
            source.clone(),
            Expression::infallible(|x: &i64| Some((*x, x * 10))),
        );
        let keyed = ToMapView::new(evaluator);

        assert_eq!(keyed.map().get(&1), Some(10));
        assert_eq!(keyed.map().get(&2), Some(20));
        assert!(!keyed.fault().is_faulted());
    }

    #[test]
    fn test_to_map_duplicate_key_fault() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 21]));
        // Key is the last digit: 1 and 21 collide.
        let evaluator = SequenceEvaluator::new(
            source.clone(),
            Expression::infallible(|x: &i64| Some((x % 10, *x))),
        );
        let keyed = ToMapView::new(evaluator);

        assert_eq!(keyed.fault().get(), Some(OperationFault::DuplicateKey));
        assert_eq!(keyed.duplicate_key_count(), 1);
        // First contributor wins.
        assert_eq!(keyed.map().get(&1), Some(1));

        // Removing the winner promotes the duplicate and clears the fault.
        source.remove_item(&1);
        assert!(!keyed.fault().is_faulted());
        assert_eq!(keyed.map().get(&1), Some(21));
    }

    #[test]
    fn test_to_map_null_key_takes_precedence() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 21, -5]));
        let evaluator = SequenceEvaluator::new(
            source.clone(),
            Expression::infallible(|x: &i64| {
                if *x < 0 {
                    None
                } else {
                    Some((x % 10, *x))
                }
            }),
        );
        let keyed = ToMapView::new(evaluator);

        // Both faults are present; null key wins the report.
        assert_eq!(keyed.null_key_count(), 1);
        assert_eq!(keyed.duplicate_key_count(), 1);
        assert_eq!(keyed.fault().get(), Some(OperationFault::NullKey));

        source.remove_item(&-5);
        assert_eq!(keyed.fault().get(), Some(OperationFault::DuplicateKey));

        source.remove_item(&21);
        assert!(!keyed.fault().is_faulted());
    }

    #[test]
    fn test_to_map_dispose() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let evaluator = SequenceEvaluator::new(
            source.clone(),
            Expression::infallible(|x: &i64| Some((*x, *x))),
        );
        let keyed = ToMapView::new(evaluator);

        keyed.dispose();
        source.push(2);
        assert_eq!(keyed.map().len(), 1);
    }

    #[test]
    fn test_grouped_map() {
        let source = Arc::new(ObservableMap::with_entries(vec![
            ("a", 1i64),
            ("b", 2),
            ("c", 3),
        ]));
        let evaluator = MapEvaluator::new(
            source.clone(),
            MapExpression::infallible(|_, v: &i64| v % 2),
        );
        let grouped = GroupedMapView::new(evaluator);

        assert_eq!(grouped.len(), 2);
        let odd = grouped.group(&1).map(|g| g.len());
        assert_eq!(odd, Some(2));

        // Value change moves the entry between groups.
        source.insert("a", 4);
        assert_eq!(grouped.group(&1).map(|g| g.len()), Some(1));
        assert_eq!(grouped.group(&0).map(|g| g.len()), Some(2));

        // Emptying a group disposes it.
        source.remove_keys(&["c"]);
        source.insert("b", 6);
        assert!(grouped.group(&1).is_none());
    }
}
