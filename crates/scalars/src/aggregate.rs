//! Aggregate maintainers: Sum, Average, Min, Max.

use crate::cell::ScalarCell;
use crate::numeric::Numeric;
use core::cmp::Ordering as CmpOrdering;
use core::hash::Hash;
use std::sync::{Arc, Mutex};
use tracing::debug;
use vista_collections::lock;
use vista_core::{OperationFault, ValueChange};
use vista_eval::{MapEvaluator, SequenceEvaluator};

type ValueCallback<R> = Arc<dyn Fn(&ValueChange<R>) + Send + Sync>;
type Values<R> = Arc<dyn Fn() -> Vec<R> + Send + Sync>;
type Detach = Box<dyn FnOnce() + Send>;

/// Attaches a value-change callback to a sequence evaluator, returning the
/// closure that detaches it again.
fn attach_sequence<T, R>(
    evaluator: &Arc<SequenceEvaluator<T, R>>,
    callback: ValueCallback<R>,
) -> Detach
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    R: Clone + PartialEq + Default + Send + Sync + 'static,
{
    let id = evaluator.subscribe_values(move |change| callback(change));
    let evaluator = evaluator.clone();
    Box::new(move || {
        evaluator.unsubscribe(id);
    })
}

/// Attaches a value-change callback to a map evaluator.
fn attach_map<K, V, R>(evaluator: &Arc<MapEvaluator<K, V, R>>, callback: ValueCallback<R>) -> Detach
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    R: Clone + PartialEq + Default + Send + Sync + 'static,
{
    let id = evaluator.subscribe_values(move |change| callback(change));
    let evaluator = evaluator.clone();
    Box::new(move || {
        evaluator.unsubscribe(id);
    })
}

// ---------------------------------------------------------------------------
// Sum
// ---------------------------------------------------------------------------

/// Maintains a running sum via elementwise add/subtract deltas.
pub struct SumView<R> {
    cell: Arc<ScalarCell<R>>,
    detach: Mutex<Option<Detach>>,
}

fn apply_sum<R: Numeric>(sum: &mut R, change: &ValueChange<R>) {
    match change {
        ValueChange::Added(values) => {
            for value in values {
                *sum = sum.add(value);
            }
        }
        ValueChange::Removed(values) => {
            for value in values {
                *sum = sum.sub(value);
            }
        }
        ValueChange::Changing { old, count } => {
            for _ in 0..*count {
                *sum = sum.sub(old);
            }
        }
        ValueChange::Changed { new, count } => {
            for _ in 0..*count {
                *sum = sum.add(new);
            }
        }
        ValueChange::Reset(values) => {
            *sum = R::zero();
            for value in values {
                *sum = sum.add(value);
            }
        }
    }
}

impl<R: Numeric> SumView<R> {
    fn build(initial: Vec<R>, attach: impl FnOnce(ValueCallback<R>) -> Detach) -> Self {
        let mut sum = R::zero();
        for value in &initial {
            sum = sum.add(value);
        }
        let cell = Arc::new(ScalarCell::new(sum.clone()));
        let state = Arc::new(Mutex::new(sum));

        let cb_cell = cell.clone();
        let callback: ValueCallback<R> = Arc::new(move |change| {
            let mut sum = lock(&state);
            apply_sum(&mut *sum, change);
            cb_cell.set(sum.clone());
        });
        let detach = attach(callback);
        debug!("sum view constructed");
        Self {
            cell,
            detach: Mutex::new(Some(detach)),
        }
    }

    /// Maintains the sum of a sequence evaluator's results.
    pub fn over_sequence<T>(evaluator: &Arc<SequenceEvaluator<T, R>>) -> Self
    where
        T: Clone + Eq + Hash + Send + Sync + 'static,
    {
        Self::build(evaluator.results(), |callback| {
            attach_sequence(evaluator, callback)
        })
    }

    /// Maintains the sum of a map evaluator's results.
    pub fn over_map<K, V>(evaluator: &Arc<MapEvaluator<K, V, R>>) -> Self
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        Self::build(evaluator.results(), |callback| {
            attach_map(evaluator, callback)
        })
    }

    /// The current sum.
    pub fn get(&self) -> R {
        self.cell.get()
    }

    /// The underlying reactive cell.
    #[inline]
    pub fn cell(&self) -> &Arc<ScalarCell<R>> {
        &self.cell
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if let Some(detach) = lock(&self.detach).take() {
            detach();
        }
    }
}

impl<R> Drop for SumView<R> {
    fn drop(&mut self) {
        if let Some(detach) = lock(&self.detach).take() {
            detach();
        }
    }
}

// ---------------------------------------------------------------------------
// Average
// ---------------------------------------------------------------------------

struct AverageState<R> {
    sum: R,
    count: usize,
}

/// Maintains `sum / count` with a live element count.
///
/// Carries the `NoElements` operation fault whenever the count is zero and
/// clears it otherwise; the value is recomputed on any change to either.
pub struct AverageView<R> {
    cell: Arc<ScalarCell<f64>>,
    detach: Mutex<Option<Detach>>,
    _marker: core::marker::PhantomData<R>,
}

fn apply_average<R: Numeric>(state: &mut AverageState<R>, change: &ValueChange<R>) {
    match change {
        ValueChange::Added(values) => {
            state.count += values.len();
            for value in values {
                state.sum = state.sum.add(value);
            }
        }
        ValueChange::Removed(values) => {
            state.count = state.count.saturating_sub(values.len());
            for value in values {
                state.sum = state.sum.sub(value);
            }
        }
        ValueChange::Changing { old, count } => {
            for _ in 0..*count {
                state.sum = state.sum.sub(old);
            }
        }
        ValueChange::Changed { new, count } => {
            for _ in 0..*count {
                state.sum = state.sum.add(new);
            }
        }
        ValueChange::Reset(values) => {
            state.count = values.len();
            state.sum = R::zero();
            for value in values {
                state.sum = state.sum.add(value);
            }
        }
    }
}

impl<R: Numeric> AverageView<R> {
    fn build(initial: Vec<R>, attach: impl FnOnce(ValueCallback<R>) -> Detach) -> Self {
        let mut state = AverageState {
            sum: R::zero(),
            count: initial.len(),
        };
        for value in &initial {
            state.sum = state.sum.add(value);
        }
        let initial_fault = (state.count == 0).then_some(OperationFault::NoElements);
        let initial_value = if state.count == 0 {
            0.0
        } else {
            state.sum.to_f64() / state.count as f64
        };
        let cell = Arc::new(ScalarCell::with_fault(initial_value, initial_fault));
        let state = Arc::new(Mutex::new(state));

        let cb_cell = cell.clone();
        let callback: ValueCallback<R> = Arc::new(move |change| {
            let mut state = lock(&state);
            apply_average(&mut state, change);
            if state.count == 0 {
                cb_cell.fault().set(Some(OperationFault::NoElements));
            } else {
                cb_cell.fault().set(None);
                cb_cell.set(state.sum.to_f64() / state.count as f64);
            }
        });
        let detach = attach(callback);
        debug!("average view constructed");
        Self {
            cell,
            detach: Mutex::new(Some(detach)),
            _marker: core::marker::PhantomData,
        }
    }

    /// Maintains the average of a sequence evaluator's results.
    pub fn over_sequence<T>(evaluator: &Arc<SequenceEvaluator<T, R>>) -> Self
    where
        T: Clone + Eq + Hash + Send + Sync + 'static,
    {
        Self::build(evaluator.results(), |callback| {
            attach_sequence(evaluator, callback)
        })
    }

    /// Maintains the average of a map evaluator's results.
    pub fn over_map<K, V>(evaluator: &Arc<MapEvaluator<K, V, R>>) -> Self
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        Self::build(evaluator.results(), |callback| {
            attach_map(evaluator, callback)
        })
    }

    /// The current average. Check `fault()` before trusting it.
    pub fn get(&self) -> f64 {
        self.cell.get()
    }

    /// The current operation fault, if any.
    pub fn fault(&self) -> Option<OperationFault> {
        self.cell.fault().get()
    }

    /// The underlying reactive cell.
    #[inline]
    pub fn cell(&self) -> &Arc<ScalarCell<f64>> {
        &self.cell
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if let Some(detach) = lock(&self.detach).take() {
            detach();
        }
    }
}

impl<R> Drop for AverageView<R> {
    fn drop(&mut self) {
        if let Some(detach) = lock(&self.detach).take() {
            detach();
        }
    }
}

// ---------------------------------------------------------------------------
// Min / Max
// ---------------------------------------------------------------------------

struct ExtremumState<R> {
    /// `Less` maintains a minimum, `Greater` a maximum.
    target: CmpOrdering,
    current: Option<R>,
    count: usize,
    /// Set while the extremum itself is changing away; forces one rescan.
    pending_rescan: bool,
    values: Values<R>,
}

impl<R> ExtremumState<R>
where
    R: Ord + Clone,
{
    fn fold(&self, values: Vec<R>) -> Option<R> {
        let target = self.target;
        values.into_iter().reduce(|best, v| {
            if v.cmp(&best) == target {
                v
            } else {
                best
            }
        })
    }

    /// Full O(n) rescan of all remaining live values. Deliberate: removing
    /// or changing away from the current extremum cannot be repaired by
    /// delta alone.
    fn rescan(&mut self) {
        let values = (self.values)();
        self.current = self.fold(values);
    }

    fn absorb(&mut self, value: &R) {
        match &self.current {
            None => self.current = Some(value.clone()),
            Some(best) => {
                if value.cmp(best) == self.target {
                    self.current = Some(value.clone());
                }
            }
        }
    }

    fn apply(&mut self, change: &ValueChange<R>) {
        match change {
            ValueChange::Added(values) => {
                self.count += values.len();
                for value in values {
                    self.absorb(value);
                }
            }
            ValueChange::Removed(values) => {
                self.count = self.count.saturating_sub(values.len());
                if self.count == 0 {
                    self.current = None;
                    return;
                }
                // Only an exact hit on the extremum forces the rescan.
                let hit = values
                    .iter()
                    .any(|v| self.current.as_ref().map(|c| v.cmp(c)) == Some(CmpOrdering::Equal));
                if hit {
                    self.rescan();
                }
            }
            ValueChange::Changing { old, .. } => {
                if self.current.as_ref().map(|c| old.cmp(c)) == Some(CmpOrdering::Equal) {
                    self.pending_rescan = true;
                }
            }
            ValueChange::Changed { new, .. } => {
                if self.pending_rescan {
                    self.pending_rescan = false;
                    self.rescan();
                } else {
                    self.absorb(new);
                }
            }
            ValueChange::Reset(values) => {
                self.count = values.len();
                self.current = self.fold(values.clone());
            }
        }
    }
}

fn build_extremum<R>(
    target: CmpOrdering,
    values: Values<R>,
    initial_fault: Option<OperationFault>,
    attach: impl FnOnce(ValueCallback<R>) -> Detach,
) -> (Arc<ScalarCell<R>>, Mutex<Option<Detach>>)
where
    R: Ord + Clone + PartialEq + Default + Send + Sync + 'static,
{
    let initial = values();
    let mut state = ExtremumState {
        target,
        current: None,
        count: initial.len(),
        pending_rescan: false,
        values,
    };
    state.current = state.fold(initial);

    let fault = if state.count == 0 {
        Some(OperationFault::NoElements)
    } else {
        initial_fault
    };
    let cell = Arc::new(ScalarCell::with_fault(
        state.current.clone().unwrap_or_default(),
        fault,
    ));
    let state = Arc::new(Mutex::new(state));

    let cb_cell = cell.clone();
    let callback: ValueCallback<R> = Arc::new(move |change| {
        let mut state = lock(&state);
        state.apply(change);
        if state.count == 0 {
            cb_cell.fault().set(Some(OperationFault::NoElements));
        } else {
            cb_cell.fault().set(None);
            if let Some(best) = &state.current {
                cb_cell.set(best.clone());
            }
        }
    });
    let detach = attach(callback);
    (cell, Mutex::new(Some(detach)))
}

macro_rules! extremum_view {
    ($name:ident, $target:expr, $doc:literal) => {
        #[doc = $doc]
        ///
        /// Adding a value costs one comparison against the current extremum.
        /// Removing or changing away from the extremum itself triggers an
        /// O(n) rescan of all remaining live values; any other change is
        /// O(1). Constructed over an empty source, the view carries the
        /// `NoElements` fault; over a source with a faulted element, the
        /// first element fault surfaces as the initial operation fault.
        pub struct $name<R> {
            cell: Arc<ScalarCell<R>>,
            detach: Mutex<Option<Detach>>,
        }

        impl<R> $name<R>
        where
            R: Ord + Clone + PartialEq + Default + Send + Sync + 'static,
        {
            /// Maintains the extremum of a sequence evaluator's results.
            pub fn over_sequence<T>(evaluator: &Arc<SequenceEvaluator<T, R>>) -> Self
            where
                T: Clone + Eq + Hash + Send + Sync + 'static,
            {
                let provider: Values<R> = {
                    let evaluator = evaluator.clone();
                    Arc::new(move || evaluator.results())
                };
                let initial_fault = evaluator
                    .first_fault()
                    .map(OperationFault::ElementError);
                let (cell, detach) = build_extremum($target, provider, initial_fault, |callback| {
                    attach_sequence(evaluator, callback)
                });
                Self { cell, detach }
            }

            /// Maintains the extremum of a map evaluator's results.
            pub fn over_map<K, V>(evaluator: &Arc<MapEvaluator<K, V, R>>) -> Self
            where
                K: Clone + Eq + Hash + Send + Sync + 'static,
                V: Clone + Send + Sync + 'static,
            {
                let provider: Values<R> = {
                    let evaluator = evaluator.clone();
                    Arc::new(move || evaluator.results())
                };
                let initial_fault = evaluator
                    .first_fault()
                    .map(OperationFault::ElementError);
                let (cell, detach) = build_extremum($target, provider, initial_fault, |callback| {
                    attach_map(evaluator, callback)
                });
                Self { cell, detach }
            }

            /// The current extremum. Check `fault()` before trusting it.
            pub fn get(&self) -> R {
                self.cell.get()
            }

            /// The current operation fault, if any.
            pub fn fault(&self) -> Option<OperationFault> {
                self.cell.fault().get()
            }

            /// The underlying reactive cell.
            #[inline]
            pub fn cell(&self) -> &Arc<ScalarCell<R>> {
                &self.cell
            }

            /// Stops incremental maintenance. Idempotent.
            pub fn dispose(&self) {
                if let Some(detach) = lock(&self.detach).take() {
                    detach();
                }
            }
        }

        impl<R> Drop for $name<R> {
            fn drop(&mut self) {
                if let Some(detach) = lock(&self.detach).take() {
                    detach();
                }
            }
        }
    };
}

extremum_view!(MinView, CmpOrdering::Less, "Maintains the minimum live value.");
extremum_view!(MaxView, CmpOrdering::Greater, "Maintains the maximum live value.");

#[cfg(test)]
mod tests {
    use super::*;
    use vista_collections::{ObservableMap, ObservableVector};
    use vista_eval::{Expression, MapExpression};

    fn identity() -> Expression<i64, i64> {
        Expression::infallible(|x: &i64| *x)
    }

    #[test]
    fn test_sum_membership_deltas() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2, 3]));
        let evaluator = SequenceEvaluator::new(source.clone(), identity());
        let sum = SumView::over_sequence(&evaluator);
        assert_eq!(sum.get(), 6);

        source.push(10);
        assert_eq!(sum.get(), 16);

        source.remove_item(&2);
        assert_eq!(sum.get(), 14);
    }

    #[test]
    fn test_sum_value_change() {
        use std::sync::atomic::{AtomicI64, Ordering};

        let offset = Arc::new(AtomicI64::new(0));
        let o = offset.clone();
        let expr = Expression::infallible(move |x: &i64| x + o.load(Ordering::SeqCst));

        let source = Arc::new(ObservableVector::with_items(vec![4i64, 4]));
        let evaluator = SequenceEvaluator::new(source, expr);
        let sum = SumView::over_sequence(&evaluator);
        assert_eq!(sum.get(), 8);

        // Both occurrences change 4 -> 104.
        offset.store(100, Ordering::SeqCst);
        evaluator.refresh(&4);
        assert_eq!(sum.get(), 208);
    }

    #[test]
    fn test_sum_over_map() {
        let source = Arc::new(ObservableMap::with_entries(vec![("a", 2i64), ("b", 3)]));
        let evaluator =
            MapEvaluator::new(source.clone(), MapExpression::infallible(|_, v: &i64| *v));
        let sum = SumView::over_map(&evaluator);
        assert_eq!(sum.get(), 5);

        source.insert("a", 10);
        assert_eq!(sum.get(), 13);

        source.remove_keys(&["b"]);
        assert_eq!(sum.get(), 10);
    }

    #[test]
    fn test_average_fault_cycle() {
        let source: Arc<ObservableVector<i64>> = Arc::new(ObservableVector::new());
        let evaluator = SequenceEvaluator::new(source.clone(), identity());
        let average = AverageView::over_sequence(&evaluator);

        assert_eq!(average.fault(), Some(OperationFault::NoElements));

        source.push(4);
        assert_eq!(average.fault(), None);
        assert_eq!(average.get(), 4.0);

        source.remove_item(&4);
        assert_eq!(average.fault(), Some(OperationFault::NoElements));
    }

    #[test]
    fn test_average_recomputes_on_either_change() {
        let source = Arc::new(ObservableVector::with_items(vec![2i64, 4]));
        let evaluator = SequenceEvaluator::new(source.clone(), identity());
        let average = AverageView::over_sequence(&evaluator);
        assert_eq!(average.get(), 3.0);

        source.push(9);
        assert_eq!(average.get(), 5.0);
    }

    #[test]
    fn test_max_duplicate_extremum() {
        let source = Arc::new(ObservableVector::with_items(vec![5i64, 3, 5]));
        let evaluator = SequenceEvaluator::new(source.clone(), identity());
        let max = MaxView::over_sequence(&evaluator);
        assert_eq!(max.get(), 5);

        // Removing one 5 leaves the duplicate as the maximum.
        source.remove_item(&5);
        assert_eq!(max.get(), 5);

        // Removing the last 5 rescans down to 3.
        source.remove_item(&5);
        assert_eq!(max.get(), 3);
    }

    #[test]
    fn test_max_sole_extremum_rescan() {
        let source = Arc::new(ObservableVector::with_items(vec![5i64, 3]));
        let evaluator = SequenceEvaluator::new(source.clone(), identity());
        let max = MaxView::over_sequence(&evaluator);

        source.remove_item(&5);
        assert_eq!(max.get(), 3);
    }

    #[test]
    fn test_min_change_away_from_extremum() {
        use std::sync::atomic::{AtomicI64, Ordering};

        let override_value = Arc::new(AtomicI64::new(1));
        let o = override_value.clone();
        let expr = Expression::infallible(move |x: &i64| {
            if *x == 1 {
                o.load(Ordering::SeqCst)
            } else {
                *x
            }
        });

        let source = Arc::new(ObservableVector::with_items(vec![1i64, 4, 7]));
        let evaluator = SequenceEvaluator::new(source, expr);
        let min = MinView::over_sequence(&evaluator);
        assert_eq!(min.get(), 1);

        // The minimum itself changes away: rescan finds 4.
        override_value.store(50, Ordering::SeqCst);
        evaluator.refresh(&1);
        assert_eq!(min.get(), 4);

        // A non-extremum change is absorbed in O(1).
        override_value.store(2, Ordering::SeqCst);
        evaluator.refresh(&1);
        assert_eq!(min.get(), 2);
    }

    #[test]
    fn test_min_empty_fault() {
        let source: Arc<ObservableVector<i64>> = Arc::new(ObservableVector::new());
        let evaluator = SequenceEvaluator::new(source.clone(), identity());
        let min = MinView::over_sequence(&evaluator);

        assert_eq!(min.fault(), Some(OperationFault::NoElements));

        source.push(9);
        assert_eq!(min.fault(), None);
        assert_eq!(min.get(), 9);
    }

    #[test]
    fn test_max_initial_element_fault() {
        use vista_core::Error;

        let source = Arc::new(ObservableVector::with_items(vec![1i64, -1]));
        let evaluator = SequenceEvaluator::new(
            source,
            Expression::new(|x: &i64| {
                if *x < 0 {
                    Err(Error::evaluation("negative"))
                } else {
                    Ok(*x)
                }
            }),
        );
        let max = MaxView::over_sequence(&evaluator);

        assert!(matches!(
            max.fault(),
            Some(OperationFault::ElementError(_))
        ));
    }

    #[test]
    fn test_dispose_round_trip() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let evaluator = SequenceEvaluator::new(source.clone(), identity());
        let sum = SumView::over_sequence(&evaluator);

        sum.dispose();
        sum.dispose();
        source.push(5);
        assert_eq!(sum.get(), 1);
    }

    #[test]
    fn test_reset_recomputes() {
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2]));
        let evaluator = SequenceEvaluator::new(source.clone(), identity());
        let sum = SumView::over_sequence(&evaluator);
        let max = MaxView::over_sequence(&evaluator);

        source.reset(vec![10, 20]);
        assert_eq!(sum.get(), 30);
        assert_eq!(max.get(), 20);
    }
}
