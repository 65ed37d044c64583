// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use core::fmt;
use core::time::Duration;

use crate::error::report;
use crate::platform::{Clock, Platform, Threads};
use crate::region::{DmaBuffer, DmaRegion};
use crate::socket::{Domain, Protocol, Socket, SocketType};
use crate::sync::{BinarySemaphore, Mutex};
use crate::thread::ThreadBuilder;
use crate::time::Timestamp;
use crate::Result;

/// Stack size used for threads that do not ask for a specific one.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// The platform abstraction layer: a backend plus the memory regions managed
/// on top of it.
///
/// Everything the suites need from the environment goes through this value.
/// It is `Sync`, so workers that need to allocate DMA buffers can share it
/// through an `Arc` or a `static`.
pub struct Pal<P: Platform> {
    platform: P,
    dma: DmaRegion<P::RegionLock>,
    secure_dma: DmaRegion<P::RegionLock>,
    default_stack_size: usize,
}

// === impl Pal ===

impl<P: Platform> Pal<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            dma: DmaRegion::new(),
            secure_dma: DmaRegion::new(),
            default_stack_size: DEFAULT_STACK_SIZE,
        }
    }

    /// Overrides the stack size of threads spawned without an explicit one.
    #[must_use]
    pub fn with_default_stack_size(mut self, size: usize) -> Self {
        self.default_stack_size = size;
        self
    }

    /// Applies the thread settings of a configuration file.
    #[cfg(feature = "std")]
    #[must_use]
    pub fn with_config(self, config: &pal_config::Config) -> Self {
        self.with_default_stack_size(config.threads.default_stack_size)
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn default_stack_size(&self) -> usize {
        self.default_stack_size
    }

    // --- memory ---

    /// Hands `dma_size` bytes of DMA-contiguous memory at `dma_base` to the
    /// allocator. See [`DmaRegion::init`].
    ///
    /// # Safety
    ///
    /// Same contract as [`DmaRegion::init`].
    pub unsafe fn init(
        &self,
        dma_base: usize,
        unmanaged_base: usize,
        dma_size: usize,
    ) -> Result<()> {
        // Safety: ensured by the caller
        unsafe { self.dma.init(dma_base, unmanaged_base, dma_size) }
            .inspect_err(|err| report("memory init", *err))
    }

    /// Finalizes the DMA region. See [`DmaRegion::fin`].
    pub fn fin(&self) {
        self.dma.fin();
    }

    /// Hands memory of the secure world to the secure allocator. Only
    /// meaningful on `TrustZone` targets.
    ///
    /// # Safety
    ///
    /// Same contract as [`DmaRegion::init`].
    pub unsafe fn init_secure(&self, dma_base: usize, dma_size: usize) -> Result<()> {
        // Safety: ensured by the caller
        unsafe { self.secure_dma.init(dma_base, dma_base, dma_size) }
            .inspect_err(|err| report("secure memory init", *err))
    }

    pub fn fin_secure(&self) {
        self.secure_dma.fin();
    }

    pub fn dma(&self) -> &DmaRegion<P::RegionLock> {
        &self.dma
    }

    pub fn secure_dma(&self) -> &DmaRegion<P::RegionLock> {
        &self.secure_dma
    }

    pub fn alloc_dma(&self, size: usize) -> Result<DmaBuffer> {
        self.dma
            .alloc(size)
            .inspect_err(|err| report("dma alloc", *err))
    }

    pub fn free_dma(&self, buf: DmaBuffer) {
        self.dma.free(buf);
    }

    pub fn alloc_secure_dma(&self, size: usize) -> Result<DmaBuffer> {
        self.secure_dma
            .alloc(size)
            .inspect_err(|err| report("secure dma alloc", *err))
    }

    pub fn free_secure_dma(&self, buf: DmaBuffer) {
        self.secure_dma.free(buf);
    }

    // --- threads ---

    pub fn thread(&self) -> ThreadBuilder<'_, P> {
        ThreadBuilder::new(self)
    }

    pub fn lowest_priority(&self) -> i32 {
        self.platform.priorities().lowest
    }

    pub fn highest_priority(&self) -> i32 {
        self.platform.priorities().highest
    }

    pub fn default_priority(&self) -> i32 {
        self.platform.priorities().default
    }

    // --- synchronization ---

    pub fn mutex<T>(&self, value: T) -> Result<Mutex<P, T>> {
        Mutex::new(&self.platform, value)
    }

    pub fn semaphore(&self) -> Result<BinarySemaphore<P>> {
        BinarySemaphore::new(&self.platform)
    }

    // --- network ---

    pub fn socket(&self, domain: Domain, ty: SocketType, protocol: Protocol) -> Result<Socket<P>> {
        Socket::open(&self.platform, domain, ty, protocol)
    }

    // --- time ---

    pub fn timestamp(&self) -> Timestamp {
        Timestamp::from_duration(self.platform.now())
    }

    pub fn delay(&self, duration: Duration) {
        self.platform.delay(duration);
    }
}

impl<P: Platform + fmt::Debug> fmt::Debug for Pal<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pal")
            .field("platform", &self.platform)
            .field("dma", &self.dma)
            .field("secure_dma", &self.secure_dma)
            .field("default_stack_size", &self.default_stack_size)
            .finish()
    }
}
