//! The only cells that may cross the frame-loop/background boundary.
//!
//! Both wrap a `Mutex` and never hand out a guard. A poisoned lock is recovered
//! rather than propagated.

use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An edge-triggered flag: producers raise it, the consumer reads and clears it in one step.
#[derive(Debug, Default)]
pub struct EdgeFlag {
    raised: Mutex<bool>,
}

impl EdgeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        *lock(&self.raised) = true;
    }

    /// Returns whether the flag was raised since the last call, clearing it.
    pub fn take(&self) -> bool {
        std::mem::replace(&mut *lock(&self.raised), false)
    }

    pub fn is_raised(&self) -> bool {
        *lock(&self.raised)
    }
}

/// A value replaced wholesale by one side and snapshotted (or taken) by the other.
#[derive(Debug, Default)]
pub struct SharedSlot<T> {
    value: Mutex<T>,
}

impl<T> SharedSlot<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    /// Swaps in `value`, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *lock(&self.value), value)
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&lock(&self.value))
    }

    /// Edits the value in place under the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut lock(&self.value))
    }
}

impl<T: Clone> SharedSlot<T> {
    pub fn snapshot(&self) -> T {
        lock(&self.value).clone()
    }
}

impl<T: Default> SharedSlot<T> {
    pub fn take(&self) -> T {
        std::mem::take(&mut *lock(&self.value))
    }
}
