// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Backend for real-time kernels with a task API.
//!
//! Tasks cannot return values and cannot be joined. A finished task signals
//! the task that created it through its single-slot notification and then
//! deletes itself, so a thread has to be joined from the context that spawned
//! it.

use alloc::boxed::Box;
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

/// The task API of a real-time kernel.
///
/// Firmware implements this over the kernel's bindings. Priorities count
/// upwards from `0` (idle) to `MAX_PRIORITIES - 1`.
pub trait RtosKernel: Send + Sync + 'static {
    type Task: Copy + Eq + Send + Sync + fmt::Debug;
    type Mutex: Send + Sync;
    type Semaphore: Send + Sync;
    type Socket: RawSocket;

    const MAX_PRIORITIES: u32;
    const MINIMAL_STACK_SIZE: usize;
    const STACK_ALIGNMENT: usize;

    /// Creates and starts a task, or returns `None` if the kernel is out of
    /// resources.
    fn task_create(
        &self,
        name: &str,
        stack: TaskStack,
        priority: u32,
        body: TaskBody,
    ) -> Option<Self::Task>;

    /// Deletes `task`, or the calling task when `None`.
    fn task_delete(&self, task: Option<Self::Task>);

    fn current_task(&self) -> Self::Task;

    /// Increments the notification value of `task`.
    fn notify_give(&self, task: Self::Task);

    /// Waits for the calling task's notification value to become non-zero and
    /// clears it. Returns `false` on timeout.
    fn notify_take(&self, timeout: Timeout) -> bool;

    fn mutex_create(&self) -> Option<Self::Mutex>;
    fn mutex_take(&self, mutex: &Self::Mutex, timeout: Timeout) -> bool;
    fn mutex_give(&self, mutex: &Self::Mutex);

    /// Creates an empty binary semaphore.
    fn semaphore_create_binary(&self) -> Option<Self::Semaphore>;
    fn semaphore_take(&self, semaphore: &Self::Semaphore, timeout: Timeout) -> bool;
    /// Returns `false` if the semaphore was full already.
    fn semaphore_give(&self, semaphore: &Self::Semaphore) -> bool;

    fn socket_open(
        &self,
        domain: Domain,
        ty: SocketType,
        protocol: Protocol,
        recv_timeout: Option<Duration>,
    ) -> Result<Self::Socket>;

    /// Time since the scheduler started.
    fn uptime(&self) -> Duration;
    fn delay(&self, duration: Duration);
}

/// The real-time kernel backend.
pub struct Rtos<K> {
    kernel: Arc<K>,
    recv_timeout: Option<Duration>,
}

impl<K: RtosKernel> Rtos<K> {
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

impl<K> fmt::Debug for Rtos<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rtos")
            .field("recv_timeout", &self.recv_timeout)
            .finish_non_exhaustive()
    }
}

impl<K: RtosKernel> Platform for Rtos<K> {
    const NAME: &'static str = "rtos";
}

impl<K: RtosKernel> Threads for Rtos<K> {
    type Task = K::Task;
    type Notifier = TaskNotifier<K>;

    const RETURNS_VALUE: bool = false;

    fn priorities(&self) -> Priorities {
        let highest = i32::try_from(K::MAX_PRIORITIES.saturating_sub(1)).unwrap_or(i32::MAX);
        // one above idle
        Priorities::new(0, highest, highest.min(1))
    }

    fn min_stack_size(&self) -> usize {
        K::MINIMAL_STACK_SIZE
    }

    fn stack_alignment(&self) -> usize {
        K::STACK_ALIGNMENT
    }

    fn notifier(&self) -> Result<TaskNotifier<K>> {
        Ok(TaskNotifier {
            kernel: Arc::clone(&self.kernel),
            creator: self.kernel.current_task(),
        })
    }

    fn spawn(&self, request: &SpawnRequest<'_>, body: TaskBody) -> Result<K::Task> {
        let priority = u32::try_from(request.priority).map_err(|_| Error::InvalidArgument)?;

        let kernel = Arc::clone(&self.kernel);
        let body: TaskBody = Box::new(move || {
            body();
            kernel.task_delete(None);
        });

        self.kernel
            .task_create(
                request.name.unwrap_or("pal"),
                TaskStack::for_request(request),
                priority,
                body,
            )
            .ok_or(Error::NativeFailure)
    }

    fn reap(&self, _task: K::Task) -> Result<()> {
        // finished tasks delete themselves
        Ok(())
    }

    fn cancel(&self, task: K::Task) -> Result<()> {
        self.kernel.task_delete(Some(task));
        Ok(())
    }
}

/// Delivers completion through the creating task's notification slot.
pub struct TaskNotifier<K: RtosKernel> {
    kernel: Arc<K>,
    creator: K::Task,
}

impl<K: RtosKernel> Notify for TaskNotifier<K> {
    fn notify(&self) {
        self.kernel.notify_give(self.creator);
    }

    fn wait(&self, timeout: Timeout) -> Result<()> {
        if self.kernel.current_task() != self.creator {
            log::error!("thread joined from a task other than its creator {:?}", self.creator);
            return Err(Error::InvalidArgument);
        }

        if self.kernel.notify_take(timeout) {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }
}

impl<K: RtosKernel> Locks for Rtos<K> {
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
        let raw = self
            .kernel
            .semaphore_create_binary()
            .ok_or(Error::NativeFailure)?;
        Ok(KernelSemaphore {
            kernel: Arc::clone(&self.kernel),
            raw,
        })
    }
}

pub struct KernelMutex<K: RtosKernel> {
    kernel: Arc<K>,
    raw: K::Mutex,
}

// Safety: kernel mutexes provide mutual exclusion
unsafe impl<K: RtosKernel> RawMutex for KernelMutex<K> {
    fn lock(&self, timeout: Timeout) -> bool {
        self.kernel.mutex_take(&self.raw, timeout)
    }

    unsafe fn unlock(&self) {
        self.kernel.mutex_give(&self.raw);
    }
}

pub struct KernelSemaphore<K: RtosKernel> {
    kernel: Arc<K>,
    raw: K::Semaphore,
}

impl<K: RtosKernel> RawSemaphore for KernelSemaphore<K> {
    fn take(&self, timeout: Timeout) -> bool {
        self.kernel.semaphore_take(&self.raw, timeout)
    }

    fn give(&self) -> bool {
        self.kernel.semaphore_give(&self.raw)
    }
}

impl<K: RtosKernel> Memory for Rtos<K> {
    type RegionLock = RawSpinlock;
}

impl<K: RtosKernel> Network for Rtos<K> {
    type Socket = K::Socket;

    fn open_socket(&self, domain: Domain, ty: SocketType, protocol: Protocol) -> Result<K::Socket> {
        self.kernel.socket_open(domain, ty, protocol, self.recv_timeout)
    }
}

impl<K: RtosKernel> Clock for Rtos<K> {
    fn now(&self) -> Duration {
        self.kernel.uptime()
    }

    fn delay(&self, duration: Duration) {
        self.kernel.delay(duration);
    }
}
