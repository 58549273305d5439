//! Lock helpers that recover from poisoning.
//!
//! A panic while a lock is held (for example inside a misbehaving observer)
//! must not take the whole loop down with it. These helpers log the poison
//! and continue with the inner data.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lock a mutex, recovering the guard if it was poisoned.
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &'static str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poison_error| {
        tracing::warn!(lock = what, "Mutex poisoned, using recovered data");
        poison_error.into_inner()
    })
}

/// Read-lock an `RwLock`, recovering the guard if it was poisoned.
pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, what: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poison_error| {
        tracing::warn!(lock = what, "RwLock poisoned, reading recovered data");
        poison_error.into_inner()
    })
}

/// Write-lock an `RwLock`, recovering the guard if it was poisoned.
pub(crate) fn write<'a, T>(lock: &'a RwLock<T>, what: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poison_error| {
        tracing::error!(lock = what, "RwLock poisoned, writing recovered data");
        poison_error.into_inner()
    })
}
