//! Single-assignment error slot shared between the producer task and the
//! request dispatcher.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Slot<E> {
    tripped: bool,
    err: Option<E>,
}

/// Keeps the first error it is given and ignores every later one.
#[derive(Debug)]
pub struct ErrorLatch<E> {
    slot: Mutex<Slot<E>>,
}

impl<E> Default for ErrorLatch<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ErrorLatch<E> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                tripped: false,
                err: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<E>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latch `err` unless an error was latched before. Returns whether this
    /// call won.
    pub fn set_once(&self, err: E) -> bool {
        let mut slot = self.lock();
        if slot.tripped {
            return false;
        }
        slot.tripped = true;
        slot.err = Some(err);
        true
    }

    /// Latch the error of `result`, if any, and pass the success value on.
    pub fn capture<T>(&self, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.set_once(err);
                None
            }
        }
    }

    pub fn is_set(&self) -> bool {
        self.lock().tripped
    }

    /// Look at the latched error without removing it.
    pub fn peek<R>(&self, f: impl FnOnce(&E) -> R) -> Option<R> {
        self.lock().err.as_ref().map(f)
    }

    pub fn get(&self) -> Option<E>
    where
        E: Clone,
    {
        self.lock().err.clone()
    }

    /// Move the latched error out. The latch stays tripped.
    pub fn take(&self) -> Option<E> {
        self.lock().err.take()
    }
}
