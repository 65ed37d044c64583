// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod mutex;
mod semaphore;

use core::time::Duration;

pub use mutex::{Mutex, MutexGuard};
pub use semaphore::BinarySemaphore;

/// How long a blocking operation may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Wait until the operation succeeds.
    Infinite,
    /// Give up after the duration has elapsed. A zero duration polls once.
    After(Duration),
}

// === impl Timeout ===

impl Timeout {
    pub const ZERO: Self = Self::After(Duration::ZERO);

    /// The raw millisecond value callers use to request an unbounded wait.
    pub const RAW_INFINITE: u32 = u32::MAX;

    pub fn from_millis(ms: u32) -> Self {
        Self::After(Duration::from_millis(u64::from(ms)))
    }

    /// Interprets a raw millisecond timeout, where [`Self::RAW_INFINITE`]
    /// means "wait forever".
    pub fn from_raw_millis(ms: u32) -> Self {
        if ms == Self::RAW_INFINITE {
            Self::Infinite
        } else {
            Self::from_millis(ms)
        }
    }

    /// The bounded duration, or `None` for [`Timeout::Infinite`].
    pub const fn as_duration(self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::After(duration) => Some(duration),
        }
    }

    pub const fn is_infinite(self) -> bool {
        matches!(self, Self::Infinite)
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Self::After(duration)
    }
}
