//! Scalar accessors: First, Last, Single, ElementAt, Any, All.

use crate::cell::ScalarCell;
use core::hash::Hash;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use vista_collections::{lock, ObservableVector, SubscriptionId};
use vista_core::{OperationFault, ValueChange};
use vista_eval::SequenceEvaluator;

macro_rules! accessor_common {
    () => {
        /// The current value. Check `fault()` before trusting it.
        pub fn get(&self) -> T {
            self.cell.get()
        }

        /// The current operation fault, if any.
        pub fn fault(&self) -> Option<OperationFault> {
            self.cell.fault().get()
        }

        /// The underlying reactive cell.
        #[inline]
        pub fn cell(&self) -> &Arc<ScalarCell<T>> {
            &self.cell
        }

        /// Stops incremental maintenance. Idempotent.
        pub fn dispose(&self) {
            if self.disposed.swap(true, Ordering::SeqCst) {
                return;
            }
            self.source.unsubscribe(self.subscription);
        }
    };
}

macro_rules! accessor_drop {
    ($name:ident) => {
        impl<T> Drop for $name<T> {
            fn drop(&mut self) {
                if !self.disposed.swap(true, Ordering::SeqCst) {
                    self.source.unsubscribe(self.subscription);
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// First / Last
// ---------------------------------------------------------------------------

/// Maintains the first element of a sequence, with the `NoElements` fault
/// while the sequence is empty.
pub struct FirstView<T> {
    cell: Arc<ScalarCell<T>>,
    source: Arc<ObservableVector<T>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

fn update_first<T>(cell: &ScalarCell<T>, source: &ObservableVector<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    match source.get(0) {
        Some(value) => {
            cell.fault().set(None);
            cell.set(value);
        }
        None => cell.fault().set(Some(OperationFault::NoElements)),
    }
}

impl<T> FirstView<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    pub fn new(source: Arc<ObservableVector<T>>) -> Self {
        let initial_fault = source.is_empty().then_some(OperationFault::NoElements);
        let cell = Arc::new(ScalarCell::with_fault(
            source.get(0).unwrap_or_default(),
            initial_fault,
        ));
        let weak_cell = Arc::downgrade(&cell);
        let weak_source = Arc::downgrade(&source);
        let subscription = source.subscribe(move |_| {
            let (Some(cell), Some(source)) = (weak_cell.upgrade(), weak_source.upgrade()) else {
                return;
            };
            update_first(&cell, &source);
        });
        debug!("first view constructed");
        Self {
            cell,
            source,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    accessor_common!();
}

accessor_drop!(FirstView);

/// Maintains the last element of a sequence, with the `NoElements` fault
/// while the sequence is empty.
pub struct LastView<T> {
    cell: Arc<ScalarCell<T>>,
    source: Arc<ObservableVector<T>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

fn update_last<T>(cell: &ScalarCell<T>, source: &ObservableVector<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let len = source.len();
    if len == 0 {
        cell.fault().set(Some(OperationFault::NoElements));
    } else if let Some(value) = source.get(len - 1) {
        cell.fault().set(None);
        cell.set(value);
    }
}

impl<T> LastView<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    pub fn new(source: Arc<ObservableVector<T>>) -> Self {
        let len = source.len();
        let initial_fault = (len == 0).then_some(OperationFault::NoElements);
        let initial = if len == 0 {
            T::default()
        } else {
            source.get(len - 1).unwrap_or_default()
        };
        let cell = Arc::new(ScalarCell::with_fault(initial, initial_fault));
        let weak_cell = Arc::downgrade(&cell);
        let weak_source = Arc::downgrade(&source);
        let subscription = source.subscribe(move |_| {
            let (Some(cell), Some(source)) = (weak_cell.upgrade(), weak_source.upgrade()) else {
                return;
            };
            update_last(&cell, &source);
        });
        debug!("last view constructed");
        Self {
            cell,
            source,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    accessor_common!();
}

accessor_drop!(LastView);

// ---------------------------------------------------------------------------
// Single
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Default)]
struct SingleFlags {
    no_elements: bool,
    multiple_elements: bool,
}

/// Maintains the sole element of a sequence.
///
/// The no-elements and more-than-one flags are tracked independently; the
/// value is suppressed while either is set.
pub struct SingleView<T> {
    cell: Arc<ScalarCell<T>>,
    flags: Arc<Mutex<SingleFlags>>,
    source: Arc<ObservableVector<T>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

fn update_single<T>(cell: &ScalarCell<T>, flags: &Mutex<SingleFlags>, source: &ObservableVector<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let len = source.len();
    let new_flags = SingleFlags {
        no_elements: len == 0,
        multiple_elements: len > 1,
    };
    *lock(flags) = new_flags;
    if new_flags.no_elements {
        cell.fault().set(Some(OperationFault::NoElements));
    } else if new_flags.multiple_elements {
        cell.fault().set(Some(OperationFault::MultipleElements));
    } else {
        cell.fault().set(None);
        if let Some(value) = source.get(0) {
            cell.set(value);
        }
    }
}

impl<T> SingleView<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    pub fn new(source: Arc<ObservableVector<T>>) -> Self {
        let cell = Arc::new(ScalarCell::new(T::default()));
        let flags = Arc::new(Mutex::new(SingleFlags::default()));
        update_single(&cell, &flags, &source);

        let weak_cell = Arc::downgrade(&cell);
        let weak_flags = Arc::downgrade(&flags);
        let weak_source = Arc::downgrade(&source);
        let subscription = source.subscribe(move |_| {
            let (Some(cell), Some(flags), Some(source)) = (
                weak_cell.upgrade(),
                weak_flags.upgrade(),
                weak_source.upgrade(),
            ) else {
                return;
            };
            update_single(&cell, &flags, &source);
        });
        debug!("single view constructed");
        Self {
            cell,
            flags,
            source,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// True while the source is empty.
    pub fn has_no_elements(&self) -> bool {
        lock(&self.flags).no_elements
    }

    /// True while the source holds more than one element.
    pub fn has_multiple_elements(&self) -> bool {
        lock(&self.flags).multiple_elements
    }

    accessor_common!();
}

accessor_drop!(SingleView);

// ---------------------------------------------------------------------------
// ElementAt
// ---------------------------------------------------------------------------

/// Maintains the element at a fixed index.
///
/// Validity is recomputed purely from `0 <= index < len` on every
/// membership change; no content scan is needed.
pub struct ElementAtView<T> {
    cell: Arc<ScalarCell<T>>,
    index: usize,
    source: Arc<ObservableVector<T>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

fn update_element_at<T>(cell: &ScalarCell<T>, source: &ObservableVector<T>, index: usize)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    if index < source.len() {
        cell.fault().set(None);
        if let Some(value) = source.get(index) {
            cell.set(value);
        }
    } else {
        cell.fault().set(Some(OperationFault::IndexOutOfRange));
    }
}

impl<T> ElementAtView<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    pub fn new(source: Arc<ObservableVector<T>>, index: usize) -> Self {
        let initial_fault =
            (index >= source.len()).then_some(OperationFault::IndexOutOfRange);
        let cell = Arc::new(ScalarCell::with_fault(
            source.get(index).unwrap_or_default(),
            initial_fault,
        ));
        let weak_cell = Arc::downgrade(&cell);
        let weak_source = Arc::downgrade(&source);
        let subscription = source.subscribe(move |_| {
            let (Some(cell), Some(source)) = (weak_cell.upgrade(), weak_source.upgrade()) else {
                return;
            };
            update_element_at(&cell, &source, index);
        });
        debug!(index, "element-at view constructed");
        Self {
            cell,
            index,
            source,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// The fixed index this view tracks.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    accessor_common!();
}

accessor_drop!(ElementAtView);

// ---------------------------------------------------------------------------
// Any / All
// ---------------------------------------------------------------------------

/// Maintains whether the source contains any element. Never faults.
pub struct AnyView<T> {
    cell: Arc<ScalarCell<bool>>,
    source: Arc<ObservableVector<T>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

impl<T> AnyView<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(source: Arc<ObservableVector<T>>) -> Self {
        let cell = Arc::new(ScalarCell::new(!source.is_empty()));
        let weak_cell = Arc::downgrade(&cell);
        let weak_source = Arc::downgrade(&source);
        let subscription = source.subscribe(move |_| {
            let (Some(cell), Some(source)) = (weak_cell.upgrade(), weak_source.upgrade()) else {
                return;
            };
            cell.set(!source.is_empty());
        });
        debug!("any view constructed");
        Self {
            cell,
            source,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// True while the source contains at least one element.
    pub fn get(&self) -> bool {
        self.cell.get()
    }

    /// The underlying reactive cell.
    #[inline]
    pub fn cell(&self) -> &Arc<ScalarCell<bool>> {
        &self.cell
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.source.unsubscribe(self.subscription);
    }
}

impl<T> Drop for AnyView<T> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.source.unsubscribe(self.subscription);
        }
    }
}

/// Maintains whether every element's live predicate is true, by counting
/// false results. All over an empty source is true. Never faults.
pub struct AllView<T> {
    cell: Arc<ScalarCell<bool>>,
    evaluator: Arc<SequenceEvaluator<T, bool>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

fn false_delta(change: &ValueChange<bool>, false_count: &mut usize) {
    match change {
        ValueChange::Added(values) => {
            *false_count += values.iter().filter(|v| !**v).count();
        }
        ValueChange::Removed(values) => {
            let removed = values.iter().filter(|v| !**v).count();
            *false_count = false_count.saturating_sub(removed);
        }
        ValueChange::Changing { old, count } => {
            if !old {
                *false_count = false_count.saturating_sub(*count);
            }
        }
        ValueChange::Changed { new, count } => {
            if !new {
                *false_count += count;
            }
        }
        ValueChange::Reset(values) => {
            *false_count = values.iter().filter(|v| !**v).count();
        }
    }
}

impl<T> AllView<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(evaluator: Arc<SequenceEvaluator<T, bool>>) -> Self {
        let initial_false = evaluator.results().iter().filter(|v| !**v).count();
        let cell = Arc::new(ScalarCell::new(initial_false == 0));
        let state = Arc::new(Mutex::new(initial_false));

        let cb_cell = cell.clone();
        let subscription = evaluator.subscribe_values(move |change| {
            let mut false_count = lock(&state);
            false_delta(change, &mut false_count);
            cb_cell.set(*false_count == 0);
        });
        debug!("all view constructed");
        Self {
            cell,
            evaluator,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// True while every element matches.
    pub fn get(&self) -> bool {
        self.cell.get()
    }

    /// The underlying reactive cell.
    #[inline]
    pub fn cell(&self) -> &Arc<ScalarCell<bool>> {
        &self.cell
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.evaluator.unsubscribe(self.subscription);
    }
}

impl<T> Drop for AllView<T> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.evaluator.unsubscribe(self.subscription);
        }
    }
}
