//! Shared per-element computations with stable identity.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vista_core::Result;

static NEXT_EXPR_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an expression, used to key shared evaluators.
pub type ExprId = u64;

/// A per-element computation over sequence elements.
///
/// Cloning preserves identity: two clones of one expression evaluate with
/// the same closure and share the same `ExprId`, so the registry can pool
/// evaluators for them.
pub struct Expression<T, R> {
    id: ExprId,
    compute: Arc<dyn Fn(&T) -> Result<R> + Send + Sync>,
}

impl<T, R> Clone for Expression<T, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            compute: self.compute.clone(),
        }
    }
}

impl<T, R> Expression<T, R> {
    /// Creates an expression from a fallible computation.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&T) -> Result<R> + Send + Sync + 'static,
    {
        Self {
            id: NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed),
            compute: Arc::new(compute),
        }
    }

    /// Creates an expression from a computation that cannot fail.
    pub fn infallible<F>(compute: F) -> Self
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        Self::new(move |element| Ok(compute(element)))
    }

    /// Stable identity of this expression.
    #[inline]
    pub fn id(&self) -> ExprId {
        self.id
    }

    /// Evaluates the expression for one element.
    pub fn evaluate(&self, element: &T) -> Result<R> {
        (self.compute)(element)
    }
}

/// A per-entry computation over map entries.
pub struct MapExpression<K, V, R> {
    id: ExprId,
    compute: Arc<dyn Fn(&K, &V) -> Result<R> + Send + Sync>,
}

impl<K, V, R> Clone for MapExpression<K, V, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            compute: self.compute.clone(),
        }
    }
}

impl<K, V, R> MapExpression<K, V, R> {
    /// Creates an expression from a fallible computation.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&K, &V) -> Result<R> + Send + Sync + 'static,
    {
        Self {
            id: NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed),
            compute: Arc::new(compute),
        }
    }

    /// Creates an expression from a computation that cannot fail.
    pub fn infallible<F>(compute: F) -> Self
    where
        F: Fn(&K, &V) -> R + Send + Sync + 'static,
    {
        Self::new(move |key, value| Ok(compute(key, value)))
    }

    /// Stable identity of this expression.
    #[inline]
    pub fn id(&self) -> ExprId {
        self.id
    }

    /// Evaluates the expression for one entry.
    pub fn evaluate(&self, key: &K, value: &V) -> Result<R> {
        (self.compute)(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vista_core::Error;

    #[test]
    fn test_expression_evaluate() {
        let expr = Expression::infallible(|x: &i64| x * 2);
        assert_eq!(expr.evaluate(&21), Ok(42));
    }

    #[test]
    fn test_expression_fallible() {
        let expr = Expression::new(|x: &i64| {
            if *x == 0 {
                Err(Error::evaluation("zero"))
            } else {
                Ok(100 / x)
            }
        });
        assert_eq!(expr.evaluate(&4), Ok(25));
        assert!(expr.evaluate(&0).is_err());
    }

    #[test]
    fn test_clone_preserves_identity() {
        let expr = Expression::infallible(|x: &i32| *x);
        let clone = expr.clone();
        assert_eq!(expr.id(), clone.id());

        let other = Expression::infallible(|x: &i32| *x);
        assert_ne!(expr.id(), other.id());
    }

    #[test]
    fn test_map_expression() {
        let expr = MapExpression::infallible(|_k: &&str, v: &i64| v + 1);
        assert_eq!(expr.evaluate(&"a", &9), Ok(10));
    }
}
