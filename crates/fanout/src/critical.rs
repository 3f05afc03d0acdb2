//! Process lock
//!
//! One mutex guards every piece of distribution bookkeeping (sessions,
//! attached sets, subscriber queues). It is held only for in-memory
//! mutation; external collaborator calls run inside
//! [`ProcessLock::with_lock_released`].

use parking_lot::{Condvar, Mutex, MutexGuard};

pub(crate) struct ProcessLock<T> {
    state: Mutex<T>,
    settled: Condvar,
}

impl<T> ProcessLock<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            state: Mutex::new(value),
            settled: Condvar::new(),
        }
    }

    /// Enter the critical section
    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock()
    }

    /// Run `f` with the lock released, then re-enter.
    ///
    /// Taking the guard by value makes it impossible to touch the state
    /// from inside `f` without locking again.
    pub(crate) fn with_lock_released<'a, R>(
        &'a self,
        mut guard: MutexGuard<'a, T>,
        f: impl FnOnce() -> R,
    ) -> (MutexGuard<'a, T>, R) {
        let result = MutexGuard::unlocked(&mut guard, f);
        (guard, result)
    }

    /// Block until `busy` turns false; the lock is released while waiting.
    pub(crate) fn wait_while<'a>(
        &'a self,
        mut guard: MutexGuard<'a, T>,
        busy: impl FnMut(&mut T) -> bool,
    ) -> MutexGuard<'a, T> {
        self.settled.wait_while(&mut guard, busy);
        guard
    }

    /// Wake every waiter in [`wait_while`](Self::wait_while)
    pub(crate) fn notify_settled(&self) {
        self.settled.notify_all();
    }
}
