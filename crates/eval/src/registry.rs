//! Reference-counted sharing of evaluators.
//!
//! Two views over the same (source, expression) pair should drive one
//! evaluator, not two. The registry is a cache with reference-counted
//! eviction: `acquire` constructs or bumps, releasing the last handle
//! detaches the evaluator from its source and evicts the entry.

use crate::expression::{ExprId, Expression};
use crate::sequence::SequenceEvaluator;
use core::hash::Hash;
use core::sync::atomic::{AtomicBool, Ordering};
use hashbrown::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;
use vista_collections::{lock, ObservableVector, SourceId};

struct RegistryEntry<T, R> {
    evaluator: Arc<SequenceEvaluator<T, R>>,
    count: usize,
}

/// Pools sequence evaluators keyed by (source id, expression id).
pub struct EvaluatorRegistry<T, R> {
    entries: Mutex<HashMap<(SourceId, ExprId), RegistryEntry<T, R>>>,
}

impl<T, R> Default for EvaluatorRegistry<T, R>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    R: Clone + PartialEq + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> EvaluatorRegistry<T, R>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
    R: Clone + PartialEq + Default + Send + Sync + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires a shared evaluator for (source, expression), constructing it
    /// on first use and bumping its reference count otherwise.
    pub fn acquire(
        self: &Arc<Self>,
        source: &Arc<ObservableVector<T>>,
        expr: &Expression<T, R>,
    ) -> EvaluatorHandle<T, R> {
        let key = (source.id(), expr.id());
        let evaluator = {
            let mut entries = lock(&self.entries);
            let entry = entries.entry(key).or_insert_with(|| {
                debug!(source = key.0, expr = key.1, "registry constructs evaluator");
                RegistryEntry {
                    evaluator: SequenceEvaluator::new(source.clone(), expr.clone()),
                    count: 0,
                }
            });
            entry.count += 1;
            entry.evaluator.clone()
        };
        EvaluatorHandle {
            key,
            evaluator,
            registry: Arc::downgrade(self),
            released: AtomicBool::new(false),
        }
    }
}

impl<T, R> EvaluatorRegistry<T, R> {
    /// Number of live pooled evaluators.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Returns true if no evaluators are pooled.
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Current reference count for a key, for diagnostics.
    pub fn count_of(&self, key: (SourceId, ExprId)) -> usize {
        lock(&self.entries).get(&key).map(|e| e.count).unwrap_or(0)
    }

    fn release(&self, key: (SourceId, ExprId)) {
        let evicted = {
            let mut entries = lock(&self.entries);
            match entries.get_mut(&key) {
                Some(entry) => {
                    entry.count -= 1;
                    if entry.count == 0 {
                        entries.remove(&key).map(|e| e.evaluator)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(evaluator) = evicted {
            debug!(source = key.0, expr = key.1, "registry evicts evaluator");
            evaluator.detach();
        }
    }
}

/// A counted handle to a shared evaluator.
///
/// Dropping or explicitly releasing the handle decrements the registry
/// count; the last release tears the evaluator down. Releasing twice is a
/// no-op.
pub struct EvaluatorHandle<T, R> {
    key: (SourceId, ExprId),
    evaluator: Arc<SequenceEvaluator<T, R>>,
    registry: Weak<EvaluatorRegistry<T, R>>,
    released: AtomicBool,
}

impl<T, R> EvaluatorHandle<T, R> {
    /// The shared evaluator behind this handle.
    #[inline]
    pub fn evaluator(&self) -> &Arc<SequenceEvaluator<T, R>> {
        &self.evaluator
    }

    /// The registry key this handle holds a count against.
    #[inline]
    pub fn key(&self) -> (SourceId, ExprId) {
        self.key
    }

    /// Releases this handle's count. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.key);
        }
    }
}

impl<T, R> Drop for EvaluatorHandle<T, R> {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.release(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_shares_one_evaluator() {
        let registry = Arc::new(EvaluatorRegistry::new());
        let source = Arc::new(ObservableVector::with_items(vec![1i64, 2]));
        let expr = Expression::infallible(|x: &i64| x * 2);

        let h1 = registry.acquire(&source, &expr);
        let h2 = registry.acquire(&source, &expr.clone());

        assert!(Arc::ptr_eq(h1.evaluator(), h2.evaluator()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.count_of(h1.key()), 2);
    }

    #[test]
    fn test_distinct_expressions_get_distinct_evaluators() {
        let registry = Arc::new(EvaluatorRegistry::new());
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));

        let h1 = registry.acquire(&source, &Expression::infallible(|x: &i64| *x));
        let h2 = registry.acquire(&source, &Expression::infallible(|x: &i64| -x));

        assert!(!Arc::ptr_eq(h1.evaluator(), h2.evaluator()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_release_last_detaches() {
        let registry = Arc::new(EvaluatorRegistry::new());
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let expr = Expression::infallible(|x: &i64| *x);

        let h1 = registry.acquire(&source, &expr);
        let h2 = registry.acquire(&source, &expr);
        let evaluator = h1.evaluator().clone();

        h1.release();
        assert_eq!(registry.len(), 1);
        // Still attached: source changes propagate.
        source.push(2);
        assert_eq!(evaluator.len(), 2);

        h2.release();
        assert!(registry.is_empty());
        // Detached: further changes are ignored.
        source.push(3);
        assert_eq!(evaluator.len(), 2);
    }

    #[test]
    fn test_double_release_is_noop() {
        let registry = Arc::new(EvaluatorRegistry::new());
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let expr = Expression::infallible(|x: &i64| *x);

        let h1 = registry.acquire(&source, &expr);
        let _h2 = registry.acquire(&source, &expr);

        h1.release();
        h1.release();
        assert_eq!(registry.count_of((source.id(), expr.id())), 1);
    }

    #[test]
    fn test_drop_releases() {
        let registry = Arc::new(EvaluatorRegistry::new());
        let source = Arc::new(ObservableVector::with_items(vec![1i64]));
        let expr = Expression::infallible(|x: &i64| *x);

        {
            let _handle = registry.acquire(&source, &expr);
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }
}
