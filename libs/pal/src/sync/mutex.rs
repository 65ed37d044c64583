// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use crate::error::report;
use crate::platform::{Locks, RawMutex};
use crate::sync::Timeout;
use crate::{Error, Result};

/// A mutual exclusion lock backed by the platform's native mutex.
///
/// Unlike most mutexes, acquiring takes a [`Timeout`] so callers can bound how
/// long they are willing to block.
pub struct Mutex<P: Locks, T: ?Sized = ()> {
    raw: P::Mutex,
    data: UnsafeCell<T>,
}

/// Keeps the [`Mutex`] locked until dropped.
///
/// Native mutexes must be released by the context that acquired them, so the
/// guard cannot be sent to another thread.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, P: Locks, T: ?Sized> {
    mutex: &'a Mutex<P, T>,
    _not_send: PhantomData<*const ()>,
}

// Safety: the native mutex serializes all access to `data`
unsafe impl<P: Locks, T: ?Sized + Send> Send for Mutex<P, T> {}
// Safety: the native mutex serializes all access to `data`
unsafe impl<P: Locks, T: ?Sized + Send> Sync for Mutex<P, T> {}
// Safety: a shared guard only hands out shared references
unsafe impl<P: Locks, T: ?Sized + Sync> Sync for MutexGuard<'_, P, T> {}

// === impl Mutex ===

impl<P: Locks, T> Mutex<P, T> {
    /// Creates a mutex around `value` using the native mutex of `platform`.
    pub fn new(platform: &P, value: T) -> Result<Self> {
        let raw = platform
            .create_mutex()
            .inspect_err(|err| report("mutex create", *err))?;

        Ok(Self {
            raw,
            data: UnsafeCell::new(value),
        })
    }

    /// Destroys the native mutex and returns the protected value.
    pub fn destroy(self) -> T {
        self.data.into_inner()
    }
}

impl<P: Locks, T: ?Sized> Mutex<P, T> {
    /// Acquires the mutex, blocking for at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the mutex could not be acquired in time.
    pub fn lock(&self, timeout: Timeout) -> Result<MutexGuard<'_, P, T>> {
        self.acquire(timeout)
            .ok_or(Error::Timeout)
            .inspect_err(|err| report("mutex lock", *err))
    }

    /// Acquires the mutex only if it is free right now. A busy mutex is not
    /// a failure, so nothing is reported.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, P, T>> {
        self.acquire(Timeout::ZERO)
    }

    fn acquire(&self, timeout: Timeout) -> Option<MutexGuard<'_, P, T>> {
        self.raw.lock(timeout).then(|| MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }

    /// Releases the mutex. Equivalent to dropping the guard.
    pub fn unlock(guard: MutexGuard<'_, P, T>) {
        drop(guard);
    }

    /// Returns a mutable reference to the protected value. No locking is
    /// needed since the borrow is exclusive.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<P: Locks, T: ?Sized + fmt::Debug> fmt::Debug for Mutex<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Mutex");
        match self.try_lock() {
            Some(guard) => s.field("data", &&*guard),
            None => s.field("data", &format_args!("<locked>")),
        };
        s.finish_non_exhaustive()
    }
}

// === impl MutexGuard ===

impl<P: Locks, T: ?Sized> Deref for MutexGuard<'_, P, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: holding the guard means holding the lock
        unsafe { &*self.mutex.data.get() }
    }
}

impl<P: Locks, T: ?Sized> DerefMut for MutexGuard<'_, P, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: holding the guard means holding the lock
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<P: Locks, T: ?Sized> Drop for MutexGuard<'_, P, T> {
    fn drop(&mut self) {
        // Safety: the guard was created by a successful `lock` in this context
        unsafe { self.mutex.raw.unlock() }
    }
}

impl<P: Locks, T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
