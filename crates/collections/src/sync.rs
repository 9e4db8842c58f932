//! Small locking helper shared across the engine.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Acquires a mutex, recovering the guard if a previous holder panicked.
///
/// View bookkeeping is kept consistent before any mutation returns, so a
/// poisoned lock still guards usable state.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
