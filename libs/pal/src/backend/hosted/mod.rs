// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Hosted backend: pthreads, `parking_lot` locks and BSD sockets.

mod arena;
mod socket;
mod sync;
mod thread;

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use arena::DmaArena;
pub use socket::LibcSocket;
pub use sync::{HostedMutex, HostedSemaphore};
pub use thread::HostedTask;

use crate::platform::{
    Clock, Locks, Memory, Network, Platform, Priorities, SpawnRequest, TaskBody, Threads,
};
use crate::socket::{Domain, Protocol, SocketType};
use crate::{Error, Pal, Result};

/// Smallest stack hosted threads are created with. Rust code and the logger
/// need more than the pthread minimum.
pub const MIN_STACK_SIZE: usize = 128 * 1024;

/// The hosted OS backend.
#[derive(Debug, Clone)]
pub struct Hosted {
    origin: Instant,
    recv_timeout: Option<Duration>,
    /// Memory backing the DMA regions of [`Pal::from_config`].
    arenas: Vec<Arc<DmaArena>>,
}

// === impl Hosted ===

impl Hosted {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            recv_timeout: None,
            arenas: Vec::new(),
        }
    }

    /// Sets the receive timeout applied to every socket opened from now on.
    /// `None` blocks forever.
    #[must_use]
    pub fn with_recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Creates the backend with the network settings of a configuration file.
    pub fn from_config(config: &pal_config::Config) -> Self {
        Self::new().with_recv_timeout(config.network.recv_timeout())
    }
}

impl Pal<Hosted> {
    /// Builds a hosted PAL from a configuration file.
    ///
    /// Besides the network and thread settings, a [`DmaArena`] of
    /// `memory.dma-size` bytes backs the DMA region and one of
    /// `memory.secure-dma-size` bytes the secure region. A secure size of `0`
    /// leaves the secure region uninitialized. The arenas live as long as the
    /// returned value.
    pub fn from_config(config: &pal_config::Config) -> Result<Self> {
        let dma = Arc::new(DmaArena::new(config.memory.dma_size)?);
        let secure = match config.memory.secure_dma_size {
            0 => None,
            size => Some(Arc::new(DmaArena::new(size)?)),
        };

        let mut hosted = Hosted::from_config(config);
        hosted.arenas.push(Arc::clone(&dma));
        hosted.arenas.extend(secure.iter().cloned());
        let pal = Pal::new(hosted).with_config(config);

        // Safety: the arenas are mapped for as long as the platform, which
        // the PAL owns, and hosted threads on DMA stacks are always joined
        unsafe { pal.init(dma.base(), dma.base(), dma.len())? };
        if let Some(secure) = &secure {
            // Safety: see above
            unsafe { pal.init_secure(secure.base(), secure.len())? };
        }

        log::debug!(
            "configuration {:?}: DMA arena {:#x} (+{:#x}), secure arena {}",
            config.name,
            dma.base(),
            dma.len(),
            secure.as_ref().map_or(0, |arena| arena.len())
        );

        Ok(pal)
    }
}

impl Default for Hosted {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for Hosted {
    const NAME: &'static str = "hosted";
}

impl Threads for Hosted {
    type Task = HostedTask;
    type Notifier = HostedSemaphore;

    const RETURNS_VALUE: bool = true;

    fn priorities(&self) -> Priorities {
        // the SCHED_FIFO range. Applying it needs privileges the suites do
        // not run with, so it is validated and recorded only
        Priorities::new(1, 99, 50)
    }

    fn min_stack_size(&self) -> usize {
        MIN_STACK_SIZE
    }

    fn stack_alignment(&self) -> usize {
        page_size()
    }

    fn notifier(&self) -> Result<HostedSemaphore> {
        Ok(HostedSemaphore::new())
    }

    fn spawn(&self, request: &SpawnRequest<'_>, body: TaskBody) -> Result<HostedTask> {
        thread::spawn(request, body)
    }

    fn reap(&self, task: HostedTask) -> Result<()> {
        task.join()
    }

    fn cancel(&self, task: HostedTask) -> Result<()> {
        // there is no sound way to stop a thread running Rust code. Threads
        // on a DMA stack must not outlive the region's memory, so they are
        // waited for; all others are left to finish on their own
        if task.on_dma_stack() {
            log::warn!("hosted threads cannot be cancelled, waiting for it to finish");
            task.join()
        } else {
            log::warn!("hosted threads cannot be cancelled, detaching instead");
            task.detach()
        }
    }
}

impl Locks for Hosted {
    type Mutex = HostedMutex;
    type Semaphore = HostedSemaphore;

    fn create_mutex(&self) -> Result<HostedMutex> {
        Ok(HostedMutex::new())
    }

    fn create_semaphore(&self) -> Result<HostedSemaphore> {
        Ok(HostedSemaphore::new())
    }
}

impl Memory for Hosted {
    type RegionLock = parking_lot::RawMutex;
}

impl Network for Hosted {
    type Socket = LibcSocket;

    fn open_socket(
        &self,
        domain: Domain,
        ty: SocketType,
        protocol: Protocol,
    ) -> Result<LibcSocket> {
        LibcSocket::open(domain, ty, protocol, self.recv_timeout)
    }
}

impl Clock for Hosted {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub(crate) fn page_size() -> usize {
    // Safety: plain libc call
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(page_size)
        .ok()
        .filter(|size| size.is_power_of_two())
        .unwrap_or(4096)
}

/// Turns an errno value returned by a pthread call into an [`Error`].
fn native_error(call: &str, errno: i32) -> Error {
    let err = io::Error::from_raw_os_error(errno);
    log::debug!("{call}: {err}");
    Error::from(err)
}

/// Turns the calling thread's errno into an [`Error`].
fn last_error(call: &str) -> Error {
    let err = io::Error::last_os_error();
    log::debug!("{call}: {err}");
    Error::from(err)
}
