//! Grouped-run bookkeeping for ordered views.

use core::hash::Hash;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use vista_core::IndexingStrategy;

/// A contiguous run of identical elements in a derived view: starting
/// position and occurrence count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Run {
    pub start: usize,
    pub len: usize,
}

impl Run {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// One past the last position of the run.
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Maps each distinct element to the `(start, len)` run it occupies,
/// backed by the structure the view's `IndexingStrategy` selected.
///
/// `NoneOrInherit` keeps no entries at all: callers fall back to scanning.
/// The indexed backings support O(1)/O(log n) lookup plus wholesale start
/// shifting when a span is inserted or removed before existing runs.
#[derive(Clone, Debug)]
pub enum PositionedMultiset<T> {
    None,
    Hash(HashMap<T, Run>),
    Tree(BTreeMap<T, Run>),
}

impl<T> PositionedMultiset<T>
where
    T: Clone + Eq + Hash + Ord,
{
    /// Creates the backing selected by `strategy`.
    pub fn new(strategy: IndexingStrategy) -> Self {
        match strategy {
            IndexingStrategy::NoneOrInherit => PositionedMultiset::None,
            IndexingStrategy::HashTable => PositionedMultiset::Hash(HashMap::new()),
            IndexingStrategy::SelfBalancingBinarySearchTree => {
                PositionedMultiset::Tree(BTreeMap::new())
            }
        }
    }

    /// Returns true if an auxiliary index is maintained.
    #[inline]
    pub fn is_indexed(&self) -> bool {
        !matches!(self, PositionedMultiset::None)
    }

    /// The run currently occupied by `element`, if indexed and present.
    pub fn run(&self, element: &T) -> Option<Run> {
        match self {
            PositionedMultiset::None => None,
            PositionedMultiset::Hash(map) => map.get(element).copied(),
            PositionedMultiset::Tree(map) => map.get(element).copied(),
        }
    }

    /// Records or replaces the run for `element`.
    pub fn set(&mut self, element: T, run: Run) {
        match self {
            PositionedMultiset::None => {}
            PositionedMultiset::Hash(map) => {
                map.insert(element, run);
            }
            PositionedMultiset::Tree(map) => {
                map.insert(element, run);
            }
        }
    }

    /// Removes and returns the run for `element`.
    pub fn remove(&mut self, element: &T) -> Option<Run> {
        match self {
            PositionedMultiset::None => None,
            PositionedMultiset::Hash(map) => map.remove(element),
            PositionedMultiset::Tree(map) => map.remove(element),
        }
    }

    /// Shifts the start of every run at or beyond `at` by `delta`.
    pub fn shift(&mut self, at: usize, delta: isize) {
        if delta == 0 {
            return;
        }
        let adjust = |run: &mut Run| {
            if run.start >= at {
                run.start = (run.start as isize + delta) as usize;
            }
        };
        match self {
            PositionedMultiset::None => {}
            PositionedMultiset::Hash(map) => map.values_mut().for_each(adjust),
            PositionedMultiset::Tree(map) => map.values_mut().for_each(adjust),
        }
    }

    /// Number of distinct elements tracked.
    pub fn len(&self) -> usize {
        match self {
            PositionedMultiset::None => 0,
            PositionedMultiset::Hash(map) => map.len(),
            PositionedMultiset::Tree(map) => map.len(),
        }
    }

    /// Returns true if no runs are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards all recorded runs.
    pub fn clear(&mut self) {
        match self {
            PositionedMultiset::None => {}
            PositionedMultiset::Hash(map) => map.clear(),
            PositionedMultiset::Tree(map) => map.clear(),
        }
    }
}
