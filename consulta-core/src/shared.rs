//! Per-instance exclusive access
//!
//! Every live [`Meeting`](crate::Meeting) and
//! [`ConsultationSession`](crate::ConsultationSession) sits behind one
//! [`Shared`] handle. Reads and writes take the same lock, so a reader never
//! observes a half-applied append (e.g. a ledger whose length disagrees with
//! the last sequence number).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cloneable handle to one entity instance
#[derive(Debug, Default)]
pub struct Shared<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Run `f` with shared access to the entity
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock())
    }

    /// Run `f` with exclusive access to the entity
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.lock().clone()
    }

    /// Entity methods never leave partial state behind on error, so a guard
    /// from a panicked holder is still consistent.
    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True if both handles point at the same instance
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
