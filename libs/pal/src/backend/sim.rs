// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A kernel simulation on host threads.
//!
//! [`SimKernel`] implements both [`RtosKernel`] and [`EmbeddedKernel`] so the
//! [`Rtos`](super::rtos::Rtos) and [`Embedded`](super::embedded::Embedded)
//! backends can be exercised on a development machine. Tasks are std threads;
//! threads that were not created by the kernel (e.g. a test's main thread)
//! are adopted as tasks the first time they ask for their identity.
//!
//! Host threads cannot be placed on caller provided memory, so static stacks
//! are only recorded (see [`SimKernel::spawned`]), and deleting or aborting a
//! running task only marks it.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::TaskStack;
use super::embedded::EmbeddedKernel;
use super::hosted::{HostedMutex, HostedSemaphore, LibcSocket};
use super::rtos::RtosKernel;
use crate::platform::{RawMutex, RawSemaphore, TaskBody};
use crate::socket::{Domain, Protocol, SocketType};
use crate::sync::Timeout;
use crate::Result;

/// Host threads need room for the test harness and the logger no matter what
/// the simulated task asked for.
const HOST_STACK_SIZE: usize = 256 * 1024;

static NEXT_TASK: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static CURRENT: Cell<Option<SimTask>> = const { Cell::new(None) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimTask(u32);

impl SimTask {
    fn next() -> Self {
        Self(NEXT_TASK.fetch_add(1, Ordering::Relaxed))
    }

    fn current() -> Self {
        CURRENT.with(|current| {
            current.get().unwrap_or_else(|| {
                let task = Self::next();
                current.set(Some(task));
                task
            })
        })
    }
}

/// What a task was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub task: SimTask,
    pub name: String,
    pub stack: TaskStack,
    pub priority: i32,
    pub deleted: bool,
}

/// A joinable simulated thread.
#[derive(Debug)]
pub struct SimThread {
    task: SimTask,
    state: Arc<TaskState>,
}

#[derive(Debug, Default)]
struct TaskState {
    notifications: Mutex<u32>,
    notified: Condvar,
    exited: Mutex<bool>,
    exit: Condvar,
}

/// Marks the task exited once its host thread is done, also when unwinding.
struct Exit(Arc<TaskState>);

impl Drop for Exit {
    fn drop(&mut self) {
        *self.0.exited.lock() = true;
        self.0.exit.notify_all();
    }
}

#[derive(Debug)]
pub struct SimKernel {
    origin: Instant,
    /// Kernel objects of live tasks. Entries of created tasks are dropped
    /// once the task deleted itself, was deleted or was joined.
    tasks: Mutex<HashMap<SimTask, Arc<TaskState>>>,
    spawned: Mutex<Vec<TaskInfo>>,
}

// === impl SimKernel ===

impl SimKernel {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            tasks: Mutex::new(HashMap::new()),
            spawned: Mutex::new(Vec::new()),
        }
    }

    /// Every task created so far, in creation order.
    pub fn spawned(&self) -> Vec<TaskInfo> {
        self.spawned.lock().clone()
    }

    /// Whether the created task `task` was deleted or aborted.
    pub fn is_deleted(&self, task: SimTask) -> bool {
        self.spawned
            .lock()
            .iter()
            .any(|info| info.task == task && info.deleted)
    }

    /// Number of tasks the kernel currently keeps objects for, including
    /// adopted threads.
    pub fn live_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    fn state(&self, task: SimTask) -> Arc<TaskState> {
        Arc::clone(self.tasks.lock().entry(task).or_default())
    }

    fn reap(&self, task: SimTask) -> Option<Arc<TaskState>> {
        self.tasks.lock().remove(&task)
    }

    fn create(
        &self,
        name: &str,
        stack: TaskStack,
        priority: i32,
        body: TaskBody,
    ) -> Option<SimThread> {
        let task = SimTask::next();
        let state = self.state(task);
        // recorded before the task runs, it may delete itself right away
        self.spawned.lock().push(TaskInfo {
            task,
            name: name.to_owned(),
            stack,
            priority,
            deleted: false,
        });

        let exit = Exit(Arc::clone(&state));
        let spawned = std::thread::Builder::new()
            .name(name.to_owned())
            .stack_size(stack.size().max(HOST_STACK_SIZE))
            .spawn(move || {
                let _exit = exit;
                CURRENT.with(|current| current.set(Some(task)));
                body();
            });

        if let Err(err) = spawned {
            log::debug!("failed to spawn simulated task {name}: {err}");
            self.reap(task);
            self.spawned.lock().retain(|info| info.task != task);
            return None;
        }

        log::trace!("created simulated task {task:?} ({name})");

        Some(SimThread { task, state })
    }

    fn mark_deleted(&self, task: SimTask) {
        let state = self.reap(task);
        if let Some(info) = self.spawned.lock().iter_mut().find(|info| info.task == task) {
            info.deleted = true;
        }

        let running = state.is_some_and(|state| !*state.exited.lock());
        if running && task != SimTask::current() {
            log::warn!("simulated task {task:?} keeps running until its body returns");
        }
    }
}

impl Default for SimKernel {
    fn default() -> Self {
        Self::new()
    }
}

fn deadline(timeout: Timeout) -> Option<Instant> {
    timeout
        .as_duration()
        .and_then(|timeout| Instant::now().checked_add(timeout))
}

/// Waits on `cond` until `ready` holds, or the deadline passes.
fn wait_for<T>(
    lock: &Mutex<T>,
    cond: &Condvar,
    timeout: Timeout,
    mut ready: impl FnMut(&mut T) -> bool,
) -> bool {
    let deadline = deadline(timeout);
    let mut guard = lock.lock();

    loop {
        if ready(&mut guard) {
            return true;
        }
        match deadline {
            Some(deadline) if cond.wait_until(&mut guard, deadline).timed_out() => {
                return ready(&mut guard);
            }
            Some(_) => {}
            None => cond.wait(&mut guard),
        }
    }
}

impl RtosKernel for SimKernel {
    type Task = SimTask;
    type Mutex = HostedMutex;
    type Semaphore = HostedSemaphore;
    type Socket = LibcSocket;

    const MAX_PRIORITIES: u32 = 8;
    const MINIMAL_STACK_SIZE: usize = 16 * 1024;
    const STACK_ALIGNMENT: usize = 16;

    fn task_create(
        &self,
        name: &str,
        stack: TaskStack,
        priority: u32,
        body: TaskBody,
    ) -> Option<SimTask> {
        let priority = i32::try_from(priority).ok()?;
        self.create(name, stack, priority, body)
            .map(|thread| thread.task)
    }

    fn task_delete(&self, task: Option<SimTask>) {
        self.mark_deleted(task.unwrap_or_else(SimTask::current));
    }

    fn current_task(&self) -> SimTask {
        SimTask::current()
    }

    fn notify_give(&self, task: SimTask) {
        let state = self.state(task);
        *state.notifications.lock() += 1;
        state.notified.notify_all();
    }

    fn notify_take(&self, timeout: Timeout) -> bool {
        let state = self.state(SimTask::current());
        wait_for(&state.notifications, &state.notified, timeout, |count| {
            let taken = *count > 0;
            *count = 0;
            taken
        })
    }

    fn mutex_create(&self) -> Option<HostedMutex> {
        Some(HostedMutex::new())
    }

    fn mutex_take(&self, mutex: &HostedMutex, timeout: Timeout) -> bool {
        mutex.lock(timeout)
    }

    fn mutex_give(&self, mutex: &HostedMutex) {
        // Safety: the kernel contract requires the caller to hold the mutex
        unsafe { mutex.unlock() }
    }

    fn semaphore_create_binary(&self) -> Option<HostedSemaphore> {
        Some(HostedSemaphore::new())
    }

    fn semaphore_take(&self, semaphore: &HostedSemaphore, timeout: Timeout) -> bool {
        semaphore.take(timeout)
    }

    fn semaphore_give(&self, semaphore: &HostedSemaphore) -> bool {
        semaphore.give()
    }

    fn socket_open(
        &self,
        domain: Domain,
        ty: SocketType,
        protocol: Protocol,
        recv_timeout: Option<Duration>,
    ) -> Result<LibcSocket> {
        LibcSocket::open(domain, ty, protocol, recv_timeout)
    }

    fn uptime(&self) -> Duration {
        self.origin.elapsed()
    }

    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl EmbeddedKernel for SimKernel {
    type Thread = SimThread;
    type Mutex = HostedMutex;
    type Semaphore = HostedSemaphore;
    type Socket = LibcSocket;

    const LOWEST_PRIORITY: i32 = 14;
    const HIGHEST_PRIORITY: i32 = 0;
    const MINIMAL_STACK_SIZE: usize = 16 * 1024;
    const STACK_ALIGNMENT: usize = 8;

    fn thread_create(
        &self,
        name: &str,
        stack: TaskStack,
        priority: i32,
        body: TaskBody,
    ) -> Option<SimThread> {
        self.create(name, stack, priority, body)
    }

    fn thread_join(&self, thread: &SimThread, timeout: Timeout) -> bool {
        let exited = wait_for(&thread.state.exited, &thread.state.exit, timeout, |exited| {
            *exited
        });
        if exited {
            self.reap(thread.task);
        }
        exited
    }

    fn thread_abort(&self, thread: SimThread) {
        self.mark_deleted(thread.task);
    }

    fn mutex_create(&self) -> Option<HostedMutex> {
        Some(HostedMutex::new())
    }

    fn mutex_lock(&self, mutex: &HostedMutex, timeout: Timeout) -> bool {
        mutex.lock(timeout)
    }

    fn mutex_unlock(&self, mutex: &HostedMutex) {
        // Safety: the kernel contract requires the caller to hold the mutex
        unsafe { mutex.unlock() }
    }

    fn sem_create(&self) -> Option<HostedSemaphore> {
        Some(HostedSemaphore::new())
    }

    fn sem_take(&self, sem: &HostedSemaphore, timeout: Timeout) -> bool {
        sem.take(timeout)
    }

    fn sem_give(&self, sem: &HostedSemaphore) -> bool {
        sem.give()
    }

    fn socket_open(
        &self,
        domain: Domain,
        ty: SocketType,
        protocol: Protocol,
        recv_timeout: Option<Duration>,
    ) -> Result<LibcSocket> {
        LibcSocket::open(domain, ty, protocol, recv_timeout)
    }

    fn uptime(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_accumulate_until_taken() {
        let kernel = SimKernel::new();
        let me = RtosKernel::current_task(&kernel);

        kernel.notify_give(me);
        kernel.notify_give(me);
        assert!(kernel.notify_take(Timeout::ZERO));
        assert!(!kernel.notify_take(Timeout::from_millis(5)));
    }

    #[test]
    fn threads_are_adopted_with_a_stable_identity() {
        let kernel = SimKernel::new();
        assert_eq!(kernel.current_task(), kernel.current_task());

        let other = std::thread::spawn(SimTask::current).join().unwrap();
        assert_ne!(other, kernel.current_task());
    }

    #[test]
    fn join_waits_for_exit() {
        let kernel = SimKernel::new();
        let thread = kernel
            .thread_create(
                "sleeper",
                TaskStack::Dynamic(0),
                7,
                Box::new(|| std::thread::sleep(Duration::from_millis(10))),
            )
            .unwrap();

        assert!(kernel.thread_join(&thread, Timeout::Infinite));
        assert_eq!(kernel.spawned()[0].name, "sleeper");
        assert_eq!(kernel.spawned()[0].priority, 7);
        assert_eq!(kernel.live_tasks(), 0);
    }

    #[test]
    fn self_deleted_tasks_are_forgotten() {
        let kernel = Arc::new(SimKernel::new());
        let me = RtosKernel::current_task(&*kernel);

        let task = {
            let task_kernel = Arc::clone(&kernel);
            let body: TaskBody = Box::new(move || {
                task_kernel.notify_give(me);
                task_kernel.task_delete(None);
            });
            RtosKernel::task_create(&*kernel, "once", TaskStack::Dynamic(0), 1, body).unwrap()
        };
        assert!(kernel.notify_take(Timeout::Infinite));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !kernel.is_deleted(task) {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
        // only the adopted test thread is left
        assert_eq!(kernel.live_tasks(), 1);
    }

    #[test]
    fn aborted_threads_are_forgotten() {
        let kernel = SimKernel::new();
        let gate = Arc::new(HostedSemaphore::new());

        let thread = {
            let gate = Arc::clone(&gate);
            kernel
                .thread_create(
                    "blocked",
                    TaskStack::Dynamic(0),
                    3,
                    Box::new(move || {
                        gate.take(Timeout::Infinite);
                    }),
                )
                .unwrap()
        };
        let task = thread.task;
        assert_eq!(kernel.live_tasks(), 1);

        kernel.thread_abort(thread);
        assert!(kernel.is_deleted(task));
        assert_eq!(kernel.live_tasks(), 0);
        gate.give();
    }
}
