// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Platform abstraction layer for the accelerator test suites.
//!
//! The suites talk to one [`Pal`] value for everything they need from the
//! environment: threads, mutexes, binary semaphores, a DMA-contiguous bump
//! allocator, a general heap, sockets and a clock. The core in this crate is
//! written once against the capability traits in [`platform`] and every
//! execution environment provides one implementation of them:
//!
//! | backend                          | environment                   |
//! |----------------------------------|-------------------------------|
//! | [`backend::hosted::Hosted`]      | hosted OS (pthreads, libc)    |
//! | [`backend::rtos::Rtos`]          | real-time kernel task API     |
//! | [`backend::embedded::Embedded`]  | embedded kernel thread API    |
//! | [`backend::no_os::NoOs`]         | bare metal, single-threaded   |
//!
//! ```ignore
//! let config: pal_config::Config = "[memory]\ndma-size = 1048576".parse()?;
//! let pal = Pal::<Hosted>::from_config(&config)?;
//!
//! let mut worker = pal.thread().dma_stack(true).spawn(|| 42)?;
//! assert_eq!(worker.join()?.value(), Some(42));
//! worker.destroy()?;
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod backend;
mod error;
pub mod heap;
mod pal;
pub mod platform;
pub mod region;
pub mod socket;
pub mod sync;
pub mod thread;
pub mod time;

pub use error::{Error, Result};
pub use pal::Pal;
pub use platform::Platform;
pub use region::{DmaBuffer, DmaRegion};
pub use socket::{Domain, Protocol, Socket, SocketType, htonl, htons, ntohl, ntohs};
pub use sync::{BinarySemaphore, Mutex, MutexGuard, Timeout};
pub use thread::{ThreadBuilder, ThreadHandle, ThreadReturn};
pub use time::Timestamp;
