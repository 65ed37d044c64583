// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Bare metal backend.
//!
//! There is exactly one execution context, so spawning a "thread" simply calls
//! its closure and hands back a finished handle. Locks never contend with
//! another thread, only with interrupt handlers, which is why waiting is
//! implemented by polling against the tick source.

mod spin;

use core::hint;
use core::net::SocketAddr;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use crate::platform::{
    Clock, Locks, Memory, Network, Notify, Platform, Priorities, RawMutex, RawSemaphore,
    RawSocket, SpawnRequest, TaskBody, Threads,
};
use crate::socket::{Domain, Protocol, SocketType};
use crate::sync::Timeout;
use crate::{Error, Result};

pub use spin::RawSpinlock;
use spin::poll_until;

/// The bare metal backend.
#[derive(Debug, Clone, Copy)]
pub struct NoOs {
    clock: fn() -> Duration,
}

impl NoOs {
    /// Creates the backend on top of `clock`, a monotonic tick source
    /// returning the time since reset.
    pub const fn new(clock: fn() -> Duration) -> Self {
        Self { clock }
    }
}

impl Platform for NoOs {
    const NAME: &'static str = "no_os";
}

impl Threads for NoOs {
    type Task = ();
    type Notifier = Inline;

    const RETURNS_VALUE: bool = true;

    fn priorities(&self) -> Priorities {
        Priorities::new(0, 0, 0)
    }

    fn min_stack_size(&self) -> usize {
        1024
    }

    fn stack_alignment(&self) -> usize {
        16
    }

    fn notifier(&self) -> Result<Inline> {
        Ok(Inline)
    }

    fn spawn(&self, request: &SpawnRequest<'_>, body: TaskBody) -> Result<()> {
        if request.stack.is_some() {
            log::debug!("no_os runs {:?} on the caller's stack", request.name);
        }
        body();
        Ok(())
    }

    fn reap(&self, _task: ()) -> Result<()> {
        Ok(())
    }

    fn cancel(&self, _task: ()) -> Result<()> {
        Ok(())
    }
}

/// Notifier for threads that have always finished by the time anyone joins.
#[derive(Debug)]
pub struct Inline;

impl Notify for Inline {
    fn notify(&self) {}

    fn wait(&self, _timeout: Timeout) -> Result<()> {
        log::error!("waiting for an inline thread that did not finish");
        Err(Error::NativeFailure)
    }
}

impl Locks for NoOs {
    type Mutex = SpinMutex;
    type Semaphore = SpinSemaphore;

    fn create_mutex(&self) -> Result<SpinMutex> {
        Ok(SpinMutex {
            lock: <RawSpinlock as lock_api::RawMutex>::INIT,
            clock: self.clock,
        })
    }

    fn create_semaphore(&self) -> Result<SpinSemaphore> {
        Ok(SpinSemaphore {
            full: AtomicBool::new(false),
            clock: self.clock,
        })
    }
}

pub struct SpinMutex {
    lock: RawSpinlock,
    clock: fn() -> Duration,
}

// Safety: `RawSpinlock` provides mutual exclusion
unsafe impl RawMutex for SpinMutex {
    fn lock(&self, timeout: Timeout) -> bool {
        poll_until(self.clock, timeout, || {
            lock_api::RawMutex::try_lock(&self.lock)
        })
    }

    unsafe fn unlock(&self) {
        // Safety: ensured by caller
        unsafe { lock_api::RawMutex::unlock(&self.lock) }
    }
}

pub struct SpinSemaphore {
    full: AtomicBool,
    clock: fn() -> Duration,
}

impl RawSemaphore for SpinSemaphore {
    fn take(&self, timeout: Timeout) -> bool {
        poll_until(self.clock, timeout, || {
            self.full
                .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        })
    }

    fn give(&self) -> bool {
        self.full
            .compare_exchange(false, true, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }
}

impl Memory for NoOs {
    type RegionLock = RawSpinlock;
}

impl Network for NoOs {
    type Socket = NoSocket;

    fn open_socket(&self, _: Domain, _: SocketType, _: Protocol) -> Result<NoSocket> {
        log::warn!("no network stack on bare metal");
        Err(Error::NativeFailure)
    }
}

/// A socket that cannot exist.
#[derive(Debug)]
pub enum NoSocket {}

impl RawSocket for NoSocket {
    fn connect(&self, _: &SocketAddr) -> Result<()> {
        match *self {}
    }

    fn bind(&self, _: &SocketAddr) -> Result<()> {
        match *self {}
    }

    fn listen(&self, _: u32) -> Result<()> {
        match *self {}
    }

    fn accept(&self) -> Result<(Self, SocketAddr)> {
        match *self {}
    }

    fn send(&self, _: &[u8]) -> Result<usize> {
        match *self {}
    }

    fn recv(&self, _: &mut [u8]) -> Result<usize> {
        match *self {}
    }

    fn send_to(&self, _: &[u8], _: &SocketAddr) -> Result<usize> {
        match *self {}
    }

    fn recv_from(&self, _: &mut [u8]) -> Result<(usize, SocketAddr)> {
        match *self {}
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        match *self {}
    }
}

impl Clock for NoOs {
    fn now(&self) -> Duration {
        (self.clock)()
    }

    fn delay(&self, duration: Duration) {
        let until = self.now().saturating_add(duration);
        while self.now() < until {
            hint::spin_loop();
        }
    }
}
