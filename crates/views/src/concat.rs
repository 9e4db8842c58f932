//! Two-source concatenation operator (Concat).

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use vista_collections::{lock, ObservableVector, SubscriptionId};
use vista_core::{contexts_conflict, Error, Result, SequenceChange};

/// Merges two independently changing sources into one view: all of the
/// first source's elements followed by all of the second's.
///
/// Each side's local index translates to a global index by adding the other
/// side's current length as an offset. Construction fails fast when the two
/// sources are pinned to conflicting notification contexts.
pub struct ConcatView<T> {
    view: Arc<ObservableVector<T>>,
    left: Arc<ObservableVector<T>>,
    right: Arc<ObservableVector<T>>,
    left_sub: SubscriptionId,
    right_sub: SubscriptionId,
    disposed: AtomicBool,
}

struct ConcatState {
    left_len: usize,
    right_len: usize,
}

impl<T> ConcatView<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Builds the concatenated view, or fails with
    /// `Error::ConflictingContexts` when the sources demand different
    /// notification affinities.
    pub fn new(left: Arc<ObservableVector<T>>, right: Arc<ObservableVector<T>>) -> Result<Self> {
        if contexts_conflict(left.context().as_ref(), right.context().as_ref()) {
            return Err(Error::ConflictingContexts);
        }

        let left_items = left.snapshot();
        let right_items = right.snapshot();
        let state = Arc::new(Mutex::new(ConcatState {
            left_len: left_items.len(),
            right_len: right_items.len(),
        }));
        let mut initial = left_items;
        initial.extend(right_items);
        let view = Arc::new(ObservableVector::with_items(initial));

        let weak_view = Arc::downgrade(&view);
        let left_state = state.clone();
        let left_sub = left.subscribe(move |change| {
            let Some(view) = weak_view.upgrade() else {
                return;
            };
            let mut state = lock(&left_state);
            apply_left(&view, &mut state, change);
        });

        let weak_view = Arc::downgrade(&view);
        let right_state = state.clone();
        let right_sub = right.subscribe(move |change| {
            let Some(view) = weak_view.upgrade() else {
                return;
            };
            let mut state = lock(&right_state);
            apply_right(&view, &mut state, change);
        });

        debug!(len = view.len(), "concat view constructed");
        Ok(Self {
            view,
            left,
            right,
            left_sub,
            right_sub,
            disposed: AtomicBool::new(false),
        })
    }

    /// The derived, concatenated view.
    #[inline]
    pub fn view(&self) -> &Arc<ObservableVector<T>> {
        &self.view
    }

    /// Current contents of the derived view.
    pub fn snapshot(&self) -> Vec<T> {
        self.view.snapshot()
    }

    /// Number of elements across both sides.
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Returns true if both sides are empty.
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    /// Stops incremental maintenance. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.left.unsubscribe(self.left_sub);
        self.right.unsubscribe(self.right_sub);
        debug!("concat view disposed");
    }
}

impl<T> Drop for ConcatView<T> {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.left.unsubscribe(self.left_sub);
            self.right.unsubscribe(self.right_sub);
        }
    }
}

fn apply_left<T>(view: &ObservableVector<T>, state: &mut ConcatState, change: &SequenceChange<T>)
where
    T: Clone + Send + Sync + 'static,
{
    match change {
        SequenceChange::Added { index, items } => {
            let _ = view.insert_all(*index, items.clone());
            state.left_len += items.len();
        }
        SequenceChange::Removed { index, items } => {
            let _ = view.remove_range(*index, items.len());
            state.left_len = state.left_len.saturating_sub(items.len());
        }
        SequenceChange::Replaced { index, old, new } => {
            let _ = view.replace_range(*index, old.len(), new.clone());
            state.left_len = state.left_len.saturating_sub(old.len()) + new.len();
        }
        SequenceChange::Moved { from, to, items } => {
            let _ = view.move_range(*from, *to, items.len());
        }
        SequenceChange::Reset { items } => {
            // The subscription survives a reset; only this half of the view
            // is replaced wholesale.
            let _ = view.replace_range(0, state.left_len, items.clone());
            state.left_len = items.len();
        }
    }
}

fn apply_right<T>(view: &ObservableVector<T>, state: &mut ConcatState, change: &SequenceChange<T>)
where
    T: Clone + Send + Sync + 'static,
{
    let offset = state.left_len;
    match change {
        SequenceChange::Added { index, items } => {
            let _ = view.insert_all(offset + index, items.clone());
            state.right_len += items.len();
        }
        SequenceChange::Removed { index, items } => {
            let _ = view.remove_range(offset + index, items.len());
            state.right_len = state.right_len.saturating_sub(items.len());
        }
        SequenceChange::Replaced { index, old, new } => {
            let _ = view.replace_range(offset + index, old.len(), new.clone());
            state.right_len = state.right_len.saturating_sub(old.len()) + new.len();
        }
        SequenceChange::Moved { from, to, items } => {
            let _ = view.move_range(offset + from, offset + to, items.len());
        }
        SequenceChange::Reset { items } => {
            let _ = view.replace_range(offset, state.right_len, items.clone());
            state.right_len = items.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_core::{CallingThreadContext, NotifyContext};

    #[test]
    fn test_offset_translation() {
        let left = Arc::new(ObservableVector::with_items(vec!["a", "b"]));
        let right = Arc::new(ObservableVector::with_items(vec!["c", "d"]));
        let concat = ConcatView::new(left.clone(), right.clone()).unwrap();
        assert_eq!(concat.snapshot(), vec!["a", "b", "c", "d"]);

        // Insert into the second source at local index 1.
        right.insert_all(1, vec!["e"]).unwrap();
        assert_eq!(concat.snapshot(), vec!["a", "b", "c", "e", "d"]);

        // Remove from the first source; subsequent right-side edits still
        // translate correctly.
        left.remove_item(&"a");
        assert_eq!(concat.snapshot(), vec!["b", "c", "e", "d"]);

        right.push("f");
        assert_eq!(concat.snapshot(), vec!["b", "c", "e", "d", "f"]);
    }

    #[test]
    fn test_left_edits() {
        let left = Arc::new(ObservableVector::with_items(vec![1i64, 2]));
        let right = Arc::new(ObservableVector::with_items(vec![9i64]));
        let concat = ConcatView::new(left.clone(), right).unwrap();

        left.push(3);
        assert_eq!(concat.snapshot(), vec![1, 2, 3, 9]);

        left.move_range(0, 2, 1).unwrap();
        assert_eq!(concat.snapshot(), vec![2, 3, 1, 9]);

        left.replace_range(1, 1, vec![7, 8]).unwrap();
        assert_eq!(concat.snapshot(), vec![2, 7, 8, 1, 9]);
    }

    #[test]
    fn test_reset_replaces_one_half() {
        let left = Arc::new(ObservableVector::with_items(vec![1i64, 2]));
        let right = Arc::new(ObservableVector::with_items(vec![8i64, 9]));
        let concat = ConcatView::new(left.clone(), right.clone()).unwrap();

        left.reset(vec![5]);
        assert_eq!(concat.snapshot(), vec![5, 8, 9]);

        right.reset(vec![0, 1, 2]);
        assert_eq!(concat.snapshot(), vec![5, 0, 1, 2]);

        // Still live after both resets.
        right.push(3);
        assert_eq!(concat.snapshot(), vec![5, 0, 1, 2, 3]);
    }

    #[test]
    fn test_conflicting_contexts_fail_fast() {
        let ctx_a: Arc<dyn NotifyContext> = Arc::new(CallingThreadContext::new());
        let ctx_b: Arc<dyn NotifyContext> = Arc::new(CallingThreadContext::new());

        let left = Arc::new(ObservableVector::with_context(vec![1i64], ctx_a));
        let right = Arc::new(ObservableVector::with_context(vec![2i64], ctx_b));

        assert_eq!(
            ConcatView::new(left, right).err(),
            Some(Error::ConflictingContexts)
        );
    }

    #[test]
    fn test_same_context_allowed() {
        let ctx: Arc<dyn NotifyContext> = Arc::new(CallingThreadContext::new());
        let left = Arc::new(ObservableVector::with_context(vec![1i64], ctx.clone()));
        let right = Arc::new(ObservableVector::with_context(vec![2i64], ctx));

        let concat = ConcatView::new(left, right).unwrap();
        assert_eq!(concat.snapshot(), vec![1, 2]);
    }

    #[test]
    fn test_dispose_round_trip() {
        let left = Arc::new(ObservableVector::with_items(vec![1i64]));
        let right = Arc::new(ObservableVector::with_items(vec![2i64]));
        let concat = ConcatView::new(left.clone(), right.clone()).unwrap();

        concat.dispose();
        left.push(5);
        right.push(6);
        assert_eq!(concat.snapshot(), vec![1, 2]);
    }
}
