//! Filter operator (Where).

use core::hash::Hash;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use vista_collections::{ObservableVector, SubscriptionId};
use vista_core::{ElementEvent, ElementFault};
use vista_eval::SequenceEvaluator;

/// Maintains the subsequence of elements whose live predicate is true, in
/// source-relative order.
///
/// Membership is exactly the set of matching elements, so no auxiliary map
/// is needed: insert positions are derived by scanning the evaluator's
/// current snapshot. The evaluator's fault stream is forwarded unchanged.
pub struct FilteredView<T> {
    view: Arc<ObservableVector<T>>,
    evaluator: Arc<SequenceEvaluator<T, bool>>,
    subscription: SubscriptionId,
    disposed: AtomicBool,
}

impl<T> FilteredView<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Builds the view from the evaluator's current snapshot and subscribes
    /// to its changes.
    pub fn new(evaluator: Arc<SequenceEvaluator<T, bool>>) -> Self {
        let initial: Vec<T> = evaluator
            .snapshot()
            .into_iter()
            .filter(|(_, matches)| *matches)
            .map(|(element, _)| element)
            .collect();
        let view = Arc::new(ObservableVector::with_items(initial));

        let weak_view = Arc::downgrade(&view);
        let weak_eval = Arc::downgrade(&evaluator);
        let subscription = evaluator.subscribe(move |event| {
            let (Some(view), Some(evaluator)) = (weak_view.upgrade(), weak_eval.upgrade()) else {
                return;
            };
            apply(&view, &evaluator, event);
        });

        debug!(len = view.len(), "filtered view constructed");
        Self {
            view,
            evaluator,
            subscription,
            disposed: AtomicBool::new(false),
        }
    }

    /// The derived view.
    #[inline]
    pub fn view(&self) -> &Arc<ObservableVector<T>> {
        &self.view
    }

    /// The upstream evaluator.
    #[inline]
    pub fn evaluator(&self) -> &Arc<SequenceEvaluator<T, bool>> {
        &self.evaluator
    }

    /// Current contents of the derived view.
    pub fn snapshot(&self) -> Vec<T> {
        self.view.snapshot()
    }

    /// Number of matching elements.
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Returns true if nothing matches.
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Forwards the evaluator's fault stream unchanged.
    pub fn subscribe_faults<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T, &Option<ElementFault>) + Send + Sync + 'static,
    {
        self.evaluator.subscribe(move |event| {
            if let ElementEvent::FaultChanged { element, fault } = event {
                callback(element, fault);
            }
        })
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.evaluator.unsubscribe(self.subscription);
        debug!("filtered view disposed");
    }
}

impl<T> Drop for FilteredView<T> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.evaluator.unsubscribe(self.subscription);
        }
    }
}

/// Number of matching pairs among the first `limit` snapshot entries.
fn matches_before<T>(snapshot: &[(T, bool)], limit: usize) -> usize {
    snapshot[..limit.min(snapshot.len())]
        .iter()
        .filter(|(_, matches)| *matches)
        .count()
}

fn apply<T>(
    view: &ObservableVector<T>,
    evaluator: &SequenceEvaluator<T, bool>,
    event: &ElementEvent<T, bool>,
) where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    match event {
        ElementEvent::Added { index, pairs } => {
            let matching: Vec<T> = pairs
                .iter()
                .filter(|(_, m)| *m)
                .map(|(t, _)| t.clone())
                .collect();
            if matching.is_empty() {
                return;
            }
            let snapshot = evaluator.snapshot();
            let at = matches_before(&snapshot, *index);
            let _ = view.insert_all(at.min(view.len()), matching);
        }
        ElementEvent::Removed { pairs, .. } => {
            for (element, matches) in pairs {
                if *matches {
                    view.remove_item(element);
                }
            }
        }
        ElementEvent::Moved { to, pairs, .. } => {
            let matching: Vec<T> = pairs
                .iter()
                .filter(|(_, m)| *m)
                .map(|(t, _)| t.clone())
                .collect();
            if matching.is_empty() {
                return;
            }
            for element in &matching {
                view.remove_item(element);
            }
            let snapshot = evaluator.snapshot();
            let at = matches_before(&snapshot, *to);
            let _ = view.insert_all(at.min(view.len()), matching);
        }
        ElementEvent::ResultChanged {
            element,
            result,
            count,
        } => {
            if *result {
                // Newly matching: splice all occurrences in at the position
                // of the element's first source occurrence.
                let snapshot = evaluator.snapshot();
                let at = snapshot
                    .iter()
                    .position(|(t, _)| t == element)
                    .map(|p| matches_before(&snapshot, p))
                    .unwrap_or_else(|| view.len());
                let _ = view.insert_all(at.min(view.len()), vec![element.clone(); *count]);
            } else {
                for _ in 0..*count {
                    if !view.remove_item(element) {
                        break;
                    }
                }
            }
        }
        ElementEvent::Reset { pairs } => {
            let matching: Vec<T> = pairs
                .iter()
                .filter(|(_, m)| *m)
                .map(|(t, _)| t.clone())
                .collect();
            view.reset(matching);
        }
        ElementEvent::ResultChanging { .. }
        | ElementEvent::FaultChanging { .. }
        | ElementEvent::FaultChanged { .. } => {}
    }
}
