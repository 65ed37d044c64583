// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Raw pthreads, so threads can run on caller provided (DMA) stacks.

use std::ffi::c_void;
use std::mem::{self, MaybeUninit};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use super::native_error;
use crate::platform::{SpawnRequest, TaskBody};
use crate::Result;

/// A joinable pthread.
#[derive(Debug)]
pub struct HostedTask {
    thread: libc::pthread_t,
    on_dma_stack: bool,
}

pub(super) fn spawn(request: &SpawnRequest<'_>, body: TaskBody) -> Result<HostedTask> {
    // Safety: all-zero is a valid attribute object, pthread_attr_init
    // overwrites it anyway
    let mut attr: libc::pthread_attr_t = unsafe { mem::zeroed() };
    // Safety: `attr` is a valid attribute object
    check("pthread_attr_init", unsafe { libc::pthread_attr_init(&raw mut attr) })?;

    let res = create(&raw mut attr, request, body);

    // Safety: `attr` was initialized above and is not used afterwards
    unsafe { libc::pthread_attr_destroy(&raw mut attr) };

    res
}

fn create(
    attr: *mut libc::pthread_attr_t,
    request: &SpawnRequest<'_>,
    body: TaskBody,
) -> Result<HostedTask> {
    match request.stack {
        Some(stack) => {
            // Safety: `attr` is initialized. The region's memory outlives the
            // thread, which is joined before its handle is gone
            let ret = unsafe {
                libc::pthread_attr_setstack(attr, stack.as_mut_ptr().cast(), stack.len())
            };
            check("pthread_attr_setstack", ret)?;
        }
        None => {
            // Safety: `attr` is initialized
            let ret = unsafe { libc::pthread_attr_setstacksize(attr, request.stack_size) };
            check("pthread_attr_setstacksize", ret)?;
        }
    }

    let payload = Box::into_raw(Box::new(body));
    let mut thread = MaybeUninit::<libc::pthread_t>::uninit();

    // Safety: `attr` is initialized and `payload` is handed to exactly one
    // thread
    let ret =
        unsafe { libc::pthread_create(thread.as_mut_ptr(), attr, thread_start, payload.cast()) };
    if ret != 0 {
        // Safety: no thread was created, so the payload is still ours
        drop(unsafe { Box::from_raw(payload) });
        return Err(native_error("pthread_create", ret));
    }

    Ok(HostedTask {
        // Safety: pthread_create succeeded and wrote the thread id
        thread: unsafe { thread.assume_init() },
        on_dma_stack: request.stack.is_some(),
    })
}

extern "C" fn thread_start(payload: *mut c_void) -> *mut c_void {
    // Safety: `payload` is the boxed body leaked by `create`, owned by this
    // thread alone
    let body = unsafe { Box::from_raw(payload.cast::<TaskBody>()) };

    // unwinding out of an `extern "C"` function aborts the process
    if panic::catch_unwind(AssertUnwindSafe(*body)).is_err() {
        log::error!("thread body panicked");
    }

    ptr::null_mut()
}

impl HostedTask {
    /// Waits for the thread to exit and releases it.
    pub(super) fn join(self) -> Result<()> {
        // Safety: the thread is joinable and owned by this handle
        let ret = unsafe { libc::pthread_join(self.thread, ptr::null_mut()) };
        check("pthread_join", ret)
    }

    /// Whether the thread runs on a stack carved from the DMA region.
    pub(super) fn on_dma_stack(&self) -> bool {
        self.on_dma_stack
    }

    /// Lets the thread run to completion on its own.
    pub(super) fn detach(self) -> Result<()> {
        // Safety: the thread is joinable and owned by this handle
        let ret = unsafe { libc::pthread_detach(self.thread) };
        check("pthread_detach", ret)
    }
}

fn check(call: &str, ret: libc::c_int) -> Result<()> {
    if ret == 0 {
        Ok(())
    } else {
        Err(native_error(call, ret))
    }
}
