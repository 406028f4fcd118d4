use std::sync::{Mutex, MutexGuard, PoisonError};

/// Acquires ``mutex`` while tolerating poisoning, it is a private helper used
/// internally by TaskLoom, as such why it lives in the utils module. No lock
/// in this crate is ever held across a task function invocation, so a poisoned
/// guard still protects consistent state
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
