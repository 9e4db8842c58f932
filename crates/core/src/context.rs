//! Execution-affinity contexts for outbound notifications.
//!
//! A view constructed with a context marshals its outbound notifications
//! onto that context, but still performs its internal mutation under its own
//! lock before posting. Affinity is a delivery concern, not a correctness
//! dependency for the bookkeeping itself.

use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// An execution context that outbound notifications are posted onto.
pub trait NotifyContext: Send + Sync {
    /// Stable identity used to detect conflicting affinity requirements
    /// between the sources of a two-source operator.
    fn context_id(&self) -> u64;

    /// Posts a notification task onto the context's execution environment.
    fn post(&self, task: Box<dyn FnOnce() + Send>);
}

/// Returns true when two optional contexts demand different affinities.
///
/// Two-source operators must fail fast at construction when this holds,
/// rather than silently racing their notifications.
pub fn contexts_conflict(
    a: Option<&Arc<dyn NotifyContext>>,
    b: Option<&Arc<dyn NotifyContext>>,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.context_id() != b.context_id(),
        _ => false,
    }
}

/// A context that runs notification tasks inline on the posting thread.
pub struct CallingThreadContext {
    id: u64,
}

impl CallingThreadContext {
    pub fn new() -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for CallingThreadContext {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyContext for CallingThreadContext {
    fn context_id(&self) -> u64 {
        self.id
    }

    fn post(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_ids_unique() {
        let a = CallingThreadContext::new();
        let b = CallingThreadContext::new();
        assert_ne!(a.context_id(), b.context_id());
    }

    #[test]
    fn test_contexts_conflict() {
        let a: Arc<dyn NotifyContext> = Arc::new(CallingThreadContext::new());
        let b: Arc<dyn NotifyContext> = Arc::new(CallingThreadContext::new());

        assert!(contexts_conflict(Some(&a), Some(&b)));
        assert!(!contexts_conflict(Some(&a), Some(&a.clone())));
        assert!(!contexts_conflict(Some(&a), None));
        assert!(!contexts_conflict(None, None));
    }

    #[test]
    fn test_calling_thread_context_posts_inline() {
        use core::sync::atomic::AtomicBool;

        let ctx = CallingThreadContext::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        ctx.post(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
    }
}
