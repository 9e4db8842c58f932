//! Change notification protocol.
//!
//! This module defines the event vocabulary shared by the whole engine:
//!
//! - `SequenceChange` / `MapChange`: what the observable collection
//!   primitives broadcast, one coalesced notification per mutation batch
//! - `ElementEvent` / `EntryEvent`: what an upstream evaluator emits toward
//!   the operators that maintain derived views
//! - `ValueChange`: the reduced membership/value stream consumed by the
//!   aggregate maintainers
//!
//! The `-ing` variants fire before the emitter applies the mutation to its
//! own state; the `-ed` variants fire after. Operators that need a pre-change
//! value (the old sort key, the removed extremum) must capture it during the
//! `-ing` event.

use crate::fault::ElementFault;

/// A coalesced change to an observable sequence.
///
/// `Moved` describes a contiguous block removed at `from` and reinserted so
/// that it begins at `to` in the resulting arrangement. `Reset` carries the
/// fresh contents so consumers can rebuild without re-entering the source.
#[derive(Clone, Debug, PartialEq)]
pub enum SequenceChange<T> {
    /// A contiguous batch inserted at `index`.
    Added { index: usize, items: Vec<T> },
    /// A contiguous batch removed starting at `index`.
    Removed { index: usize, items: Vec<T> },
    /// A contiguous batch replaced in place at `index`.
    Replaced {
        index: usize,
        old: Vec<T>,
        new: Vec<T>,
    },
    /// A contiguous block relocated from `from` to `to`.
    Moved {
        from: usize,
        to: usize,
        items: Vec<T>,
    },
    /// Contents changed arbitrarily; incremental state must be discarded.
    Reset { items: Vec<T> },
}

impl<T> SequenceChange<T> {
    /// Returns true if this change affects membership (not a pure move).
    #[inline]
    pub fn is_membership(&self) -> bool {
        !matches!(self, SequenceChange::Moved { .. })
    }

    /// Net change to the sequence length, if it can be derived locally.
    ///
    /// Returns `None` for `Reset`, whose delta depends on the prior length.
    pub fn len_delta(&self) -> Option<isize> {
        match self {
            SequenceChange::Added { items, .. } => Some(items.len() as isize),
            SequenceChange::Removed { items, .. } => Some(-(items.len() as isize)),
            SequenceChange::Replaced { old, new, .. } => {
                Some(new.len() as isize - old.len() as isize)
            }
            SequenceChange::Moved { .. } => Some(0),
            SequenceChange::Reset { .. } => None,
        }
    }
}

/// A coalesced change to an observable map.
#[derive(Clone, Debug, PartialEq)]
pub enum MapChange<K, V> {
    /// Entries added under previously absent keys.
    Added { entries: Vec<(K, V)> },
    /// Entries removed.
    Removed { entries: Vec<(K, V)> },
    /// Entries whose value was replaced: `(key, old, new)`.
    Replaced { entries: Vec<(K, V, V)> },
    /// Contents changed arbitrarily; carries the fresh entries.
    Reset { entries: Vec<(K, V)> },
}

/// An event emitted by a sequence evaluator toward its operators.
///
/// Batches carry `(element, result)` pairs. `ResultChanging` and
/// `ResultChanged` are paired around a live recomputation of one logical
/// element; `count` is the number of physical occurrences affected.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementEvent<T, R> {
    /// A contiguous batch of pairs added at `index`.
    Added { index: usize, pairs: Vec<(T, R)> },
    /// A contiguous batch of pairs removed starting at `index`.
    Removed { index: usize, pairs: Vec<(T, R)> },
    /// A contiguous block relocated from `from` to `to`.
    Moved {
        from: usize,
        to: usize,
        pairs: Vec<(T, R)>,
    },
    /// One logical element's result is about to change; `result` is the
    /// previous value.
    ResultChanging { element: T, result: R, count: usize },
    /// One logical element's result changed; `result` is the new value.
    ResultChanged { element: T, result: R, count: usize },
    /// One logical element's fault state is about to change.
    FaultChanging {
        element: T,
        fault: Option<ElementFault>,
    },
    /// One logical element's fault state changed.
    FaultChanged {
        element: T,
        fault: Option<ElementFault>,
    },
    /// Contents changed arbitrarily; carries the fresh pairs.
    Reset { pairs: Vec<(T, R)> },
}

impl<T, R> ElementEvent<T, R> {
    /// Returns true if this event affects view membership.
    #[inline]
    pub fn is_membership(&self) -> bool {
        matches!(
            self,
            ElementEvent::Added { .. } | ElementEvent::Removed { .. } | ElementEvent::Reset { .. }
        )
    }
}

/// An event emitted by a map evaluator toward its operators.
///
/// Keys are unique, so result-change events carry no multiplicity.
#[derive(Clone, Debug, PartialEq)]
pub enum EntryEvent<K, R> {
    /// Entries added: `(key, result)`.
    Added { pairs: Vec<(K, R)> },
    /// Entries removed: `(key, result)`.
    Removed { pairs: Vec<(K, R)> },
    /// Entries whose result was replaced along with the source value:
    /// `(key, old_result, new_result)`.
    Replaced { pairs: Vec<(K, R, R)> },
    /// One key's result is about to change; `result` is the previous value.
    ResultChanging { key: K, result: R },
    /// One key's result changed; `result` is the new value.
    ResultChanged { key: K, result: R },
    /// One key's fault state is about to change.
    FaultChanging { key: K, fault: Option<ElementFault> },
    /// One key's fault state changed.
    FaultChanged { key: K, fault: Option<ElementFault> },
    /// Contents changed arbitrarily; carries the fresh pairs.
    Reset { pairs: Vec<(K, R)> },
}

/// The reduced membership/value stream consumed by aggregate maintainers.
///
/// Both evaluators project their event streams into this shape, so a single
/// aggregate implementation serves sequence and map sources alike. Moves are
/// not represented: they cannot change an aggregate.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueChange<R> {
    /// Values that entered the live set.
    Added(Vec<R>),
    /// Values that left the live set.
    Removed(Vec<R>),
    /// A value is about to change; `old` is captured pre-mutation.
    Changing { old: R, count: usize },
    /// A value changed to `new`.
    Changed { new: R, count: usize },
    /// The live set was replaced wholesale.
    Reset(Vec<R>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_change_len_delta() {
        let added = SequenceChange::Added {
            index: 0,
            items: vec![1, 2, 3],
        };
        assert_eq!(added.len_delta(), Some(3));

        let removed = SequenceChange::Removed {
            index: 1,
            items: vec![2],
        };
        assert_eq!(removed.len_delta(), Some(-1));

        let replaced = SequenceChange::Replaced {
            index: 0,
            old: vec![1, 2],
            new: vec![9],
        };
        assert_eq!(replaced.len_delta(), Some(-1));

        let moved = SequenceChange::Moved {
            from: 0,
            to: 2,
            items: vec![1],
        };
        assert_eq!(moved.len_delta(), Some(0));
        assert!(!moved.is_membership());

        let reset = SequenceChange::Reset { items: vec![1] };
        assert_eq!(reset.len_delta(), None);
    }

    #[test]
    fn test_element_event_membership() {
        let added: ElementEvent<i32, bool> = ElementEvent::Added {
            index: 0,
            pairs: vec![(1, true)],
        };
        assert!(added.is_membership());

        let changed: ElementEvent<i32, bool> = ElementEvent::ResultChanged {
            element: 1,
            result: false,
            count: 1,
        };
        assert!(!changed.is_membership());
    }
}
