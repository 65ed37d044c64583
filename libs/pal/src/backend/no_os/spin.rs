// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::hint;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use crate::sync::Timeout;

/// A test-and-test-and-set spin lock.
///
/// Used as the region lock wherever no native lock with a const initializer is
/// available.
pub struct RawSpinlock {
    lock: AtomicBool,
}

// Safety: the compare-exchange on `lock` grants exclusive ownership
unsafe impl lock_api::RawMutex for RawSpinlock {
    type GuardMarker = lock_api::GuardSend;

    #[expect(clippy::declare_interior_mutable_const, reason = "lock_api initializer")]
    const INIT: Self = Self {
        lock: AtomicBool::new(false),
    };

    fn lock(&self) {
        let mut boff = Backoff::new();
        while !self.try_lock() {
            while self.is_locked() {
                boff.spin();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.lock.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}

/// An exponential backoff for spin loops, issuing `2^exp` spin loop hints per
/// call up to a maximum exponent.
#[derive(Debug, Copy, Clone)]
struct Backoff {
    exp: u8,
}

impl Backoff {
    const MAX_EXPONENT: u8 = 8;

    const fn new() -> Self {
        Self { exp: 0 }
    }

    #[inline]
    fn spin(&mut self) {
        for _ in 0..1_u32 << self.exp {
            hint::spin_loop();
        }

        if self.exp < Self::MAX_EXPONENT {
            self.exp += 1;
        }
    }
}

/// Retries `attempt` until it succeeds or `timeout` has elapsed on `clock`.
///
/// A zero timeout still makes one attempt.
pub(crate) fn poll_until(
    clock: fn() -> Duration,
    timeout: Timeout,
    mut attempt: impl FnMut() -> bool,
) -> bool {
    if attempt() {
        return true;
    }

    let deadline = timeout
        .as_duration()
        .map(|timeout| clock().saturating_add(timeout));

    let mut boff = Backoff::new();
    loop {
        if attempt() {
            return true;
        }
        if deadline.is_some_and(|deadline| clock() >= deadline) {
            return false;
        }
        boff.spin();
    }
}
