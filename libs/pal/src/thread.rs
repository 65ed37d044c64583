// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Thread lifecycle: create, join, destroy.
//!
//! Every thread shares a small [`Completion`] record with its handle. The
//! worker stores its return value (on backends that carry one), publishes the
//! completion flag with `Release` ordering and then signals the backend's
//! notifier. `join` waits on the notifier until it observes the flag with
//! `Acquire` ordering, so everything the worker wrote is visible once `join`
//! returns. The flag is the source of truth; notifier wake-ups that do not
//! belong to this thread are simply waited out.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::report;
use crate::platform::{Notify, Platform, SpawnRequest, TaskBody, Threads};
use crate::region::DmaBuffer;
use crate::sync::Timeout;
use crate::{Error, Pal, Result};

/// What [`ThreadHandle::join`] hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadReturn<T> {
    /// The value the thread's closure returned.
    Value(T),
    /// The thread finished, but the backend does not propagate return values.
    Unsupported,
}

impl<T> ThreadReturn<T> {
    pub fn value(self) -> Option<T> {
        match self {
            ThreadReturn::Value(value) => Some(value),
            ThreadReturn::Unsupported => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, ThreadReturn::Unsupported)
    }
}

/// Configures and spawns a thread. Obtained from [`Pal::thread`].
pub struct ThreadBuilder<'pal, P: Platform> {
    pal: &'pal Pal<P>,
    name: Option<String>,
    stack_size: Option<usize>,
    priority: Option<i32>,
    dma_stack: bool,
}

/// An owned thread.
///
/// Dropping the handle destroys the thread, see [`ThreadHandle::destroy`].
pub struct ThreadHandle<'pal, P: Platform, T> {
    pal: &'pal Pal<P>,
    task: Option<P::Task>,
    completion: Arc<Completion<P, T>>,
    stack: Option<DmaBuffer>,
    name: Option<String>,
    priority: i32,
    joined: bool,
}

struct Completion<P: Threads, T> {
    finished: AtomicBool,
    value: UnsafeCell<Option<T>>,
    notifier: P::Notifier,
}

// Safety: `value` is written by the worker strictly before `finished` is
// published and read by the handle strictly after observing it.
unsafe impl<P: Threads, T: Send> Send for Completion<P, T> {}
// Safety: see above
unsafe impl<P: Threads, T: Send> Sync for Completion<P, T> {}

/// Marks the thread finished when the worker is done with the completion
/// record, also when its closure unwinds.
struct Finish<P: Threads, T>(Arc<Completion<P, T>>);

impl<P: Threads, T> Drop for Finish<P, T> {
    fn drop(&mut self) {
        self.0.finished.store(true, Ordering::Release);
        self.0.notifier.notify();
    }
}

// === impl ThreadBuilder ===

impl<'pal, P: Platform> ThreadBuilder<'pal, P> {
    pub(crate) fn new(pal: &'pal Pal<P>) -> Self {
        Self {
            pal,
            name: None,
            stack_size: None,
            priority: None,
            dma_stack: false,
        }
    }

    /// Names the thread. By default threads are unnamed.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the stack size. Sizes below the platform minimum are raised
    /// to it.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Overrides the priority. It must lie between [`Pal::lowest_priority`]
    /// and [`Pal::highest_priority`].
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Places the thread's stack in the DMA region, for workers that hand
    /// stack buffers to DMA engines.
    pub fn dma_stack(mut self, dma_stack: bool) -> Self {
        self.dma_stack = dma_stack;
        self
    }

    /// Spawns a thread running `f`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a priority outside the platform
    /// range or a DMA stack size that overflows when rounded up to the stack
    /// alignment, any error of [`DmaRegion::alloc_aligned`] when a DMA stack
    /// was requested and [`Error::NativeFailure`] if the native thread could not be
    /// created.
    ///
    /// [`DmaRegion::alloc_aligned`]: crate::DmaRegion::alloc_aligned
    pub fn spawn<F, T>(self, f: F) -> Result<ThreadHandle<'pal, P, T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.try_spawn(f)
            .inspect_err(|err| report("thread create", *err))
    }

    fn try_spawn<F, T>(self, f: F) -> Result<ThreadHandle<'pal, P, T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let platform = self.pal.platform();

        let priorities = platform.priorities();
        let priority = self.priority.unwrap_or(priorities.default);
        if !priorities.contains(priority) {
            log::debug!("priority {priority} outside of {priorities:?}");
            return Err(Error::InvalidArgument);
        }

        let stack_size = self
            .stack_size
            .unwrap_or(self.pal.default_stack_size())
            .max(platform.min_stack_size());

        let stack = if self.dma_stack {
            let align = platform.stack_alignment();
            let size = stack_size
                .checked_next_multiple_of(align)
                .ok_or(Error::InvalidArgument)?;
            Some(self.pal.dma().alloc_aligned(size, align)?)
        } else {
            None
        };

        let completion = Arc::new(Completion::<P, T> {
            finished: AtomicBool::new(false),
            value: UnsafeCell::new(None),
            notifier: platform.notifier()?,
        });

        let worker = Arc::clone(&completion);
        let body: TaskBody = Box::new(move || {
            let finish = Finish(worker);
            let value = f();
            if P::RETURNS_VALUE {
                // Safety: the worker is the only writer and `finished` is not
                // published until `finish` drops
                unsafe { *finish.0.value.get() = Some(value) };
            }
            drop(finish);
        });

        let request = SpawnRequest {
            name: self.name.as_deref(),
            stack_size,
            priority,
            stack,
        };
        log::trace!("spawning {request:?} on {}", P::NAME);

        let task = match platform.spawn(&request, body) {
            Ok(task) => task,
            Err(err) => {
                if let Some(stack) = stack {
                    self.pal.dma().free(stack);
                }
                return Err(err);
            }
        };

        Ok(ThreadHandle {
            pal: self.pal,
            task: Some(task),
            completion,
            stack,
            name: self.name,
            priority,
            joined: false,
        })
    }
}

impl<P: Platform> fmt::Debug for ThreadBuilder<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadBuilder")
            .field("name", &self.name)
            .field("stack_size", &self.stack_size)
            .field("priority", &self.priority)
            .field("dma_stack", &self.dma_stack)
            .finish_non_exhaustive()
    }
}

// === impl ThreadHandle ===

impl<P: Platform, T> ThreadHandle<'_, P, T> {
    /// Waits for the thread to finish and returns what it produced.
    ///
    /// Returns right away if the thread has finished already.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the thread was joined before, and
    /// [`Error::NativeFailure`] if the backend carries return values but the
    /// thread finished without one (its closure panicked).
    pub fn join(&mut self) -> Result<ThreadReturn<T>> {
        self.try_join()
            .inspect_err(|err| report("thread join", *err))
    }

    fn try_join(&mut self) -> Result<ThreadReturn<T>> {
        if self.joined {
            return Err(Error::InvalidArgument);
        }

        while !self.is_finished() {
            self.completion.notifier.wait(Timeout::Infinite)?;
        }
        self.joined = true;

        if let Some(task) = self.task.take() {
            self.pal.platform().reap(task)?;
        }

        // Safety: `finished` was observed with `Acquire` ordering and the
        // worker does not touch the slot after publishing it
        let value = unsafe { (*self.completion.value.get()).take() };

        match value {
            Some(value) => Ok(ThreadReturn::Value(value)),
            None if P::RETURNS_VALUE => Err(Error::NativeFailure),
            None => Ok(ThreadReturn::Unsupported),
        }
    }

    /// Destroys the thread and releases its DMA stack.
    ///
    /// A thread that has not finished yet is cancelled, which is best-effort
    /// and backend-defined; a finished one is joined implicitly. Calling
    /// [`join`](Self::join) first is not required.
    pub fn destroy(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let platform = self.pal.platform();

        let res = match self.task.take() {
            Some(task) if self.is_finished() => platform.reap(task),
            Some(task) => {
                log::warn!("cancelling unfinished thread {}", self.display_name());
                platform.cancel(task)
            }
            None => Ok(()),
        };

        if let Some(stack) = self.stack.take() {
            self.pal.dma().free(stack);
        }

        res.inspect_err(|err| report("thread destroy", *err))
    }

    pub fn is_finished(&self) -> bool {
        self.completion.finished.load(Ordering::Acquire)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// The DMA stack the thread runs on, if one was requested.
    pub fn stack(&self) -> Option<DmaBuffer> {
        self.stack
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

impl<P: Platform, T> Drop for ThreadHandle<'_, P, T> {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

impl<P: Platform, T> fmt::Debug for ThreadHandle<'_, P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("stack", &self.stack)
            .field("finished", &self.is_finished())
            .field("joined", &self.joined)
            .finish_non_exhaustive()
    }
}
