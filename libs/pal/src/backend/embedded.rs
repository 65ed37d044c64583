// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Backend for embedded kernels with a joinable thread API.
//!
//! Threads exit when their entry returns and can be joined natively, but carry
//! no return value. Completion is signalled through a kernel semaphore so that
//! any context may join.

use alloc::sync::Arc;
use core::fmt;
use core::time::Duration;

use super::TaskStack;
use super::no_os::RawSpinlock;
use crate::platform::{
    Clock, Locks, Memory, Network, Notify, Platform, Priorities, RawMutex, RawSemaphore,
    RawSocket, SpawnRequest, TaskBody, Threads,
};
use crate::socket::{Domain, Protocol, SocketType};
use crate::sync::Timeout;
use crate::{Error, Result};

/// The thread API of an embedded kernel.
///
/// Priorities count downwards: [`HIGHEST_PRIORITY`](Self::HIGHEST_PRIORITY)
/// is numerically the smallest.
pub trait EmbeddedKernel: Send + Sync + 'static {
    type Thread: Send;
    type Mutex: Send + Sync;
    type Semaphore: Send + Sync;
    type Socket: RawSocket;

    /// Least urgent preemptible priority.
    const LOWEST_PRIORITY: i32;
    /// Most urgent preemptible priority.
    const HIGHEST_PRIORITY: i32;
    const MINIMAL_STACK_SIZE: usize;
    const STACK_ALIGNMENT: usize;

    /// Creates and starts a thread, or returns `None` if the kernel is out of
    /// resources.
    fn thread_create(
        &self,
        name: &str,
        stack: TaskStack,
        priority: i32,
        body: TaskBody,
    ) -> Option<Self::Thread>;

    /// Waits for `thread` to exit. Returns `false` on timeout.
    fn thread_join(&self, thread: &Self::Thread, timeout: Timeout) -> bool;

    fn thread_abort(&self, thread: Self::Thread);

    fn mutex_create(&self) -> Option<Self::Mutex>;
    fn mutex_lock(&self, mutex: &Self::Mutex, timeout: Timeout) -> bool;
    fn mutex_unlock(&self, mutex: &Self::Mutex);

    /// Creates an empty semaphore with a limit of one.
    fn sem_create(&self) -> Option<Self::Semaphore>;
    fn sem_take(&self, sem: &Self::Semaphore, timeout: Timeout) -> bool;
    /// Returns `false` if the semaphore was at its limit already.
    fn sem_give(&self, sem: &Self::Semaphore) -> bool;

    fn socket_open(
        &self,
        domain: Domain,
        ty: SocketType,
        protocol: Protocol,
        recv_timeout: Option<Duration>,
    ) -> Result<Self::Socket>;

    fn uptime(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// The embedded kernel backend.
pub struct Embedded<K> {
    kernel: Arc<K>,
    recv_timeout: Option<Duration>,
}

impl<K: EmbeddedKernel> Embedded<K> {
    pub fn new(kernel: K) -> Self {
        Self {
            kernel: Arc::new(kernel),
            recv_timeout: None,
        }
    }

    #[must_use]
    pub fn with_recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

impl<K> fmt::Debug for Embedded<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedded")
            .field("recv_timeout", &self.recv_timeout)
            .finish_non_exhaustive()
    }
}

impl<K: EmbeddedKernel> Platform for Embedded<K> {
    const NAME: &'static str = "embedded";
}

impl<K: EmbeddedKernel> Threads for Embedded<K> {
    type Task = K::Thread;
    type Notifier = KernelSemaphore<K>;

    const RETURNS_VALUE: bool = false;

    fn priorities(&self) -> Priorities {
        let (lowest, highest) = (K::LOWEST_PRIORITY, K::HIGHEST_PRIORITY);
        Priorities::new(lowest, highest, highest + (lowest - highest) / 2)
    }

    fn min_stack_size(&self) -> usize {
        K::MINIMAL_STACK_SIZE
    }

    fn stack_alignment(&self) -> usize {
        K::STACK_ALIGNMENT
    }

    fn notifier(&self) -> Result<KernelSemaphore<K>> {
        self.create_semaphore()
    }

    fn spawn(&self, request: &SpawnRequest<'_>, body: TaskBody) -> Result<K::Thread> {
        self.kernel
            .thread_create(
                request.name.unwrap_or("pal"),
                TaskStack::for_request(request),
                request.priority,
                body,
            )
            .ok_or(Error::NativeFailure)
    }

    fn reap(&self, thread: K::Thread) -> Result<()> {
        if self.kernel.thread_join(&thread, Timeout::Infinite) {
            Ok(())
        } else {
            Err(Error::NativeFailure)
        }
    }

    fn cancel(&self, thread: K::Thread) -> Result<()> {
        self.kernel.thread_abort(thread);
        Ok(())
    }
}

impl<K: EmbeddedKernel> Locks for Embedded<K> {
    type Mutex = KernelMutex<K>;
    type Semaphore = KernelSemaphore<K>;

    fn create_mutex(&self) -> Result<KernelMutex<K>> {
        let raw = self.kernel.mutex_create().ok_or(Error::NativeFailure)?;
        Ok(KernelMutex {
            kernel: Arc::clone(&self.kernel),
            raw,
        })
    }

    fn create_semaphore(&self) -> Result<KernelSemaphore<K>> {
        let raw = self.kernel.sem_create().ok_or(Error::NativeFailure)?;
        Ok(KernelSemaphore {
            kernel: Arc::clone(&self.kernel),
            raw,
        })
    }
}

pub struct KernelMutex<K: EmbeddedKernel> {
    kernel: Arc<K>,
    raw: K::Mutex,
}

// Safety: kernel mutexes provide mutual exclusion
unsafe impl<K: EmbeddedKernel> RawMutex for KernelMutex<K> {
    fn lock(&self, timeout: Timeout) -> bool {
        self.kernel.mutex_lock(&self.raw, timeout)
    }

    unsafe fn unlock(&self) {
        self.kernel.mutex_unlock(&self.raw);
    }
}

pub struct KernelSemaphore<K: EmbeddedKernel> {
    kernel: Arc<K>,
    raw: K::Semaphore,
}

impl<K: EmbeddedKernel> RawSemaphore for KernelSemaphore<K> {
    fn take(&self, timeout: Timeout) -> bool {
        self.kernel.sem_take(&self.raw, timeout)
    }

    fn give(&self) -> bool {
        self.kernel.sem_give(&self.raw)
    }
}

impl<K: EmbeddedKernel> Notify for KernelSemaphore<K> {
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

impl<K: EmbeddedKernel> Memory for Embedded<K> {
    type RegionLock = RawSpinlock;
}

impl<K: EmbeddedKernel> Network for Embedded<K> {
    type Socket = K::Socket;

    fn open_socket(&self, domain: Domain, ty: SocketType, protocol: Protocol) -> Result<K::Socket> {
        self.kernel.socket_open(domain, ty, protocol, self.recv_timeout)
    }
}

impl<K: EmbeddedKernel> Clock for Embedded<K> {
    fn now(&self) -> Duration {
        self.kernel.uptime()
    }

    fn delay(&self, duration: Duration) {
        self.kernel.sleep(duration);
    }
}
