//! Occurrence counting for collapsing operators.

use core::hash::Hash;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use vista_core::IndexingStrategy;

/// Maps each logical element to the number of physical occurrences behind
/// it, with explicit first-appeared / last-vanished transitions.
///
/// Operators that collapse duplicates (Distinct, duplicate-key tracking)
/// must track multiplicity explicitly rather than relying on one-to-one
/// identity: an element enters a collapsed view on the 0 -> 1 transition and
/// leaves it on 1 -> 0.
#[derive(Clone, Debug)]
pub enum MultiplicityMap<T> {
    Hash(HashMap<T, usize>),
    Tree(BTreeMap<T, usize>),
}

impl<T> MultiplicityMap<T>
where
    T: Clone + Eq + Hash + Ord,
{
    /// Creates the backing selected by `strategy`.
    ///
    /// `NoneOrInherit` still gets a hash backing: multiplicity cannot be
    /// derived by scanning a collapsed view, so the count map is mandatory.
    pub fn new(strategy: IndexingStrategy) -> Self {
        match strategy {
            IndexingStrategy::SelfBalancingBinarySearchTree => {
                MultiplicityMap::Tree(BTreeMap::new())
            }
            _ => MultiplicityMap::Hash(HashMap::new()),
        }
    }

    /// Adds one occurrence. Returns true when this was the first (0 -> 1).
    pub fn increment(&mut self, element: T) -> bool {
        let count = match self {
            MultiplicityMap::Hash(map) => map.entry(element).or_insert(0),
            MultiplicityMap::Tree(map) => map.entry(element).or_insert(0),
        };
        *count += 1;
        *count == 1
    }

    /// Removes one occurrence. Returns true when this was the last (1 -> 0).
    ///
    /// Decrementing an absent element is a no-op returning false.
    pub fn decrement(&mut self, element: &T) -> bool {
        match self {
            MultiplicityMap::Hash(map) => {
                if let Some(count) = map.get_mut(element) {
                    *count -= 1;
                    if *count == 0 {
                        map.remove(element);
                        return true;
                    }
                }
                false
            }
            MultiplicityMap::Tree(map) => {
                if let Some(count) = map.get_mut(element) {
                    *count -= 1;
                    if *count == 0 {
                        map.remove(element);
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Current occurrence count for `element`.
    pub fn count(&self, element: &T) -> usize {
        match self {
            MultiplicityMap::Hash(map) => map.get(element).copied().unwrap_or(0),
            MultiplicityMap::Tree(map) => map.get(element).copied().unwrap_or(0),
        }
    }

    /// Number of distinct elements with nonzero multiplicity.
    pub fn distinct_len(&self) -> usize {
        match self {
            MultiplicityMap::Hash(map) => map.len(),
            MultiplicityMap::Tree(map) => map.len(),
        }
    }

    /// Returns true if no occurrences are tracked.
    pub fn is_empty(&self) -> bool {
        self.distinct_len() == 0
    }

    /// Discards all counts.
    pub fn clear(&mut self) {
        match self {
            MultiplicityMap::Hash(map) => map.clear(),
            MultiplicityMap::Tree(map) => map.clear(),
        }
    }
}
