// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Backend implementations of the capability traits.
//!
//! [`rtos`] and [`embedded`] are adapters over kernel traits
//! ([`rtos::RtosKernel`], [`embedded::EmbeddedKernel`]) that firmware
//! implements on top of the native kernel bindings. With the `sim` feature,
//! [`sim::SimKernel`] implements both on host threads.

pub mod embedded;
#[cfg(all(feature = "std", target_os = "linux"))]
pub mod hosted;
pub mod no_os;
pub mod rtos;
#[cfg(all(feature = "sim", target_os = "linux"))]
pub mod sim;

use crate::platform::SpawnRequest;
use crate::region::DmaBuffer;

cfg_if::cfg_if! {
    if #[cfg(all(feature = "std", target_os = "linux"))] {
        /// The backend of the environment this crate was built for.
        pub type Native = hosted::Hosted;
    } else {
        /// The backend of the environment this crate was built for.
        pub type Native = no_os::NoOs;
    }
}

/// Stack memory for a kernel task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStack {
    /// The kernel allocates a stack of the given size.
    Dynamic(usize),
    /// The task must run on exactly this memory.
    Static(DmaBuffer),
}

impl TaskStack {
    pub fn for_request(request: &SpawnRequest<'_>) -> Self {
        match request.stack {
            Some(stack) => TaskStack::Static(stack),
            None => TaskStack::Dynamic(request.stack_size),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            TaskStack::Dynamic(size) => *size,
            TaskStack::Static(stack) => stack.len(),
        }
    }
}
