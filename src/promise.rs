//! Single-assignment cell with an observer list.
//!
//! A [`Promise`] starts unresolved and is resolved at most once. Observers
//! registered before resolution run (in registration order) on the thread that
//! resolves it; observers registered afterwards run immediately on the
//! registering thread. No lock is held while an observer runs, so observers may
//! freely call back into whatever resolved the promise.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Observer<T> = Box<dyn FnOnce(T) + Send + 'static>;

enum Slot<T> {
    Pending(Vec<Observer<T>>),
    Resolved(T),
}

/// Returned by [`Promise::resolve`] when the promise already holds a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("promise already resolved")]
pub struct AlreadyResolved;

/// Shared single-assignment cell. Cloning yields another handle to the same cell.
pub struct Promise<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Creates an unresolved promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Pending(Vec::new()))),
        }
    }

    /// Creates a promise that already holds `value`.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Resolved(value))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true once a value has been stored.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(*self.lock(), Slot::Resolved(_))
    }

    /// Returns a clone of the stored value, if any.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        match &*self.lock() {
            Slot::Resolved(value) => Some(value.clone()),
            Slot::Pending(_) => None,
        }
    }

    /// Stores `value` and runs every waiting observer.
    ///
    /// # Errors
    ///
    /// Returns [`AlreadyResolved`] if the promise was resolved before; the
    /// stored value is left untouched and no observer runs.
    pub fn resolve(&self, value: T) -> Result<(), AlreadyResolved> {
        let observers = {
            let mut slot = self.lock();
            match &mut *slot {
                Slot::Resolved(_) => return Err(AlreadyResolved),
                Slot::Pending(observers) => {
                    let observers = std::mem::take(observers);
                    *slot = Slot::Resolved(value.clone());
                    observers
                }
            }
        };

        for observer in observers {
            observer(value.clone());
        }
        Ok(())
    }

    /// Registers `observer` to run with the value once it is stored.
    ///
    /// Runs `observer` right away if the promise is already resolved.
    pub fn on_resolved<F>(&self, observer: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let ready = {
            let mut slot = self.lock();
            match &mut *slot {
                Slot::Resolved(value) => value.clone(),
                Slot::Pending(observers) => {
                    observers.push(Box::new(observer));
                    return;
                }
            }
        };
        observer(ready);
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.slot.lock().unwrap_or_else(PoisonError::into_inner) {
            Slot::Pending(observers) => format!("pending ({} observers)", observers.len()),
            Slot::Resolved(_) => "resolved".to_string(),
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}
