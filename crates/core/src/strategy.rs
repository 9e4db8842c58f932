//! Indexing strategy selection for derived views.

/// The bookkeeping structure a view uses to track element positions and
/// multiplicities.
///
/// Chosen once at view construction and fixed for the view's lifetime. The
/// chosen structure always reflects the current physical contents of the
/// derived view before any bookkeeping mutation returns to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndexingStrategy {
    /// No auxiliary index; positions are found by linear scan or inherited
    /// from source order.
    #[default]
    NoneOrInherit,
    /// Unordered map from element to position/multiplicity, O(1) expected
    /// lookup. Requires hashable elements.
    HashTable,
    /// Ordered map from element to position/multiplicity. Requires a total
    /// order on elements.
    SelfBalancingBinarySearchTree,
}

impl IndexingStrategy {
    /// Returns true if this strategy maintains an auxiliary index.
    #[inline]
    pub fn is_indexed(&self) -> bool {
        !matches!(self, IndexingStrategy::NoneOrInherit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_none() {
        assert_eq!(IndexingStrategy::default(), IndexingStrategy::NoneOrInherit);
        assert!(!IndexingStrategy::default().is_indexed());
    }

    #[test]
    fn test_indexed() {
        assert!(IndexingStrategy::HashTable.is_indexed());
        assert!(IndexingStrategy::SelfBalancingBinarySearchTree.is_indexed());
    }
}
