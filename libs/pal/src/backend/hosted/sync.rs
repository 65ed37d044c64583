// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::time::Instant;

use lock_api::{RawMutex as _, RawMutexTimed as _};
use parking_lot::{Condvar, Mutex};

use crate::platform::{Notify, RawMutex, RawSemaphore};
use crate::sync::Timeout;
use crate::{Error, Result};

/// A mutex with timed acquisition, backed by `parking_lot`.
pub struct HostedMutex(parking_lot::RawMutex);

impl HostedMutex {
    pub const fn new() -> Self {
        Self(parking_lot::RawMutex::INIT)
    }
}

impl Default for HostedMutex {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: `parking_lot::RawMutex` provides mutual exclusion
unsafe impl RawMutex for HostedMutex {
    fn lock(&self, timeout: Timeout) -> bool {
        match timeout {
            Timeout::Infinite => {
                self.0.lock();
                true
            }
            Timeout::After(timeout) => self.0.try_lock_for(timeout),
        }
    }

    unsafe fn unlock(&self) {
        // Safety: ensured by caller
        unsafe { self.0.unlock() }
    }
}

/// A binary semaphore built from a flag and a condition variable.
///
/// Also serves as the completion notifier of hosted threads.
#[derive(Debug, Default)]
pub struct HostedSemaphore {
    full: Mutex<bool>,
    cond: Condvar,
}

impl HostedSemaphore {
    pub const fn new() -> Self {
        Self {
            full: Mutex::new(false),
            cond: Condvar::new(),
        }
    }
}

impl RawSemaphore for HostedSemaphore {
    fn take(&self, timeout: Timeout) -> bool {
        let mut full = self.full.lock();

        // an unrepresentable deadline is as good as none
        let deadline = timeout
            .as_duration()
            .and_then(|timeout| Instant::now().checked_add(timeout));

        while !*full {
            match deadline {
                Some(deadline) if self.cond.wait_until(&mut full, deadline).timed_out() => break,
                Some(_) => {}
                None => self.cond.wait(&mut full),
            }
        }

        let taken = *full;
        *full = false;
        taken
    }

    fn give(&self) -> bool {
        let mut full = self.full.lock();
        if *full {
            return false;
        }

        *full = true;
        self.cond.notify_one();
        true
    }
}

impl Notify for HostedSemaphore {
    fn notify(&self) {
        self.give();
    }

    fn wait(&self, timeout: Timeout) -> Result<()> {
        if self.take(timeout) {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }
}
