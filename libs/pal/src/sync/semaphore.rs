// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;

use crate::error::report;
use crate::platform::{Locks, RawSemaphore};
use crate::sync::Timeout;
use crate::{Error, Result};

/// A semaphore whose value is either empty or full. Created empty.
pub struct BinarySemaphore<P: Locks> {
    raw: P::Semaphore,
}

// === impl BinarySemaphore ===

impl<P: Locks> BinarySemaphore<P> {
    pub fn new(platform: &P) -> Result<Self> {
        let raw = platform
            .create_semaphore()
            .inspect_err(|err| report("semaphore create", *err))?;

        Ok(Self { raw })
    }

    /// Waits for the semaphore to become full and empties it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the semaphore stayed empty for `timeout`.
    pub fn take(&self, timeout: Timeout) -> Result<()> {
        if self.raw.take(timeout) {
            Ok(())
        } else {
            report("semaphore take", Error::Timeout);
            Err(Error::Timeout)
        }
    }

    /// Fills the semaphore, waking one waiter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if the semaphore is full already.
    pub fn give(&self) -> Result<()> {
        if self.raw.give() {
            Ok(())
        } else {
            report("semaphore give", Error::OutOfRange);
            Err(Error::OutOfRange)
        }
    }

    /// Destroys the native semaphore.
    pub fn destroy(self) {}
}

impl<P: Locks> fmt::Debug for BinarySemaphore<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinarySemaphore").finish_non_exhaustive()
    }
}
