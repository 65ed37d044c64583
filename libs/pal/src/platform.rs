// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Capability traits implemented by every backend.
//!
//! The core modules ([`crate::thread`], [`crate::sync`], [`crate::region`],
//! [`crate::socket`]) are written once against these traits. A backend
//! implements each of them and thereby becomes a [`Platform`].

use alloc::boxed::Box;
use core::net::SocketAddr;
use core::time::Duration;

use crate::region::DmaBuffer;
use crate::socket::{Domain, Protocol, SocketType};
use crate::sync::Timeout;
use crate::Result;

/// The entry point handed to a native thread.
pub type TaskBody = Box<dyn FnOnce() + Send + 'static>;

/// A complete execution environment.
pub trait Platform: Threads + Locks + Memory + Network + Clock + Send + Sync + 'static {
    /// Human readable name of the backend, used in log output.
    const NAME: &'static str;
}

/// The priority range of a backend.
///
/// Some kernels count priorities upwards, others downwards, so `lowest` may
/// well be numerically larger than `highest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priorities {
    pub lowest: i32,
    pub highest: i32,
    pub default: i32,
}

impl Priorities {
    pub const fn new(lowest: i32, highest: i32, default: i32) -> Self {
        Self {
            lowest,
            highest,
            default,
        }
    }

    /// Whether `priority` lies within `[lowest, highest]`.
    pub fn contains(&self, priority: i32) -> bool {
        let (min, max) = if self.lowest <= self.highest {
            (self.lowest, self.highest)
        } else {
            (self.highest, self.lowest)
        };
        (min..=max).contains(&priority)
    }
}

/// Everything a backend needs to know to create a native thread.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest<'a> {
    pub name: Option<&'a str>,
    /// Stack size in bytes, already raised to [`Threads::min_stack_size`].
    pub stack_size: usize,
    /// Priority, already validated against [`Threads::priorities`].
    pub priority: i32,
    /// Caller provided stack memory. When set the native thread must run on
    /// exactly this memory.
    pub stack: Option<DmaBuffer>,
}

/// Wakes the joiner of a thread once the worker has finished.
pub trait Notify: Send + Sync {
    /// Signals completion. Called exactly once, by the finishing worker.
    fn notify(&self);

    /// Waits for the completion signal.
    ///
    /// Spurious returns are allowed; the caller re-checks the completion flag.
    fn wait(&self, timeout: Timeout) -> Result<()>;
}

pub trait Threads {
    /// The native task handle.
    type Task: Send;
    type Notifier: Notify + 'static;

    /// Whether a thread's return value travels back to [`join`].
    ///
    /// [`join`]: crate::ThreadHandle::join
    const RETURNS_VALUE: bool;

    fn priorities(&self) -> Priorities;

    fn min_stack_size(&self) -> usize;

    /// Alignment required for caller provided stack memory.
    fn stack_alignment(&self) -> usize;

    /// Creates the notifier for a thread that is about to be spawned from the
    /// current context.
    fn notifier(&self) -> Result<Self::Notifier>;

    fn spawn(&self, request: &SpawnRequest<'_>, body: TaskBody) -> Result<Self::Task>;

    /// Releases the native resources of a task whose body has returned,
    /// waiting for the native thread to exit if need be.
    fn reap(&self, task: Self::Task) -> Result<()>;

    /// Terminates a task whose body may still be running.
    ///
    /// This is best-effort and backend-defined. Anything the victim holds at
    /// that moment (locks included) is not released.
    fn cancel(&self, task: Self::Task) -> Result<()>;
}

/// A native mutex.
///
/// # Safety
///
/// Implementations must provide mutual exclusion: while `lock` has returned
/// `true` to one context, no other context may have `lock` return `true`
/// until `unlock` is called.
pub unsafe trait RawMutex: Send + Sync {
    /// Acquires the mutex, returning `false` if it could not be acquired
    /// within `timeout`.
    fn lock(&self, timeout: Timeout) -> bool;

    /// Releases the mutex.
    ///
    /// # Safety
    ///
    /// The mutex must be held by the current context.
    unsafe fn unlock(&self);
}

/// A native binary semaphore. Created empty.
pub trait RawSemaphore: Send + Sync {
    /// Waits until the semaphore is full and empties it. Returns `false` if it
    /// stayed empty for `timeout`.
    fn take(&self, timeout: Timeout) -> bool;

    /// Fills the semaphore. Returns `false` if it was full already.
    fn give(&self) -> bool;
}

pub trait Locks {
    type Mutex: RawMutex;
    type Semaphore: RawSemaphore;

    fn create_mutex(&self) -> Result<Self::Mutex>;

    fn create_semaphore(&self) -> Result<Self::Semaphore>;
}

pub trait Memory {
    /// The lock that serializes updates to the DMA regions.
    type RegionLock: lock_api::RawMutex + Send + Sync;
}

/// A native socket. Closed on drop.
pub trait RawSocket: Send + Sized {
    fn connect(&self, addr: &SocketAddr) -> Result<()>;

    fn bind(&self, addr: &SocketAddr) -> Result<()>;

    fn listen(&self, backlog: u32) -> Result<()>;

    fn accept(&self) -> Result<(Self, SocketAddr)>;

    fn send(&self, buf: &[u8]) -> Result<usize>;

    fn recv(&self, buf: &mut [u8]) -> Result<usize>;

    fn send_to(&self, buf: &[u8], addr: &SocketAddr) -> Result<usize>;

    fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> Result<SocketAddr>;
}

pub trait Network {
    type Socket: RawSocket;

    /// Opens a socket. The backend applies its configured receive timeout.
    fn open_socket(
        &self,
        domain: Domain,
        ty: SocketType,
        protocol: Protocol,
    ) -> Result<Self::Socket>;
}

pub trait Clock {
    /// Monotonic time since the backend started.
    fn now(&self) -> Duration;

    fn delay(&self, duration: Duration);
}
