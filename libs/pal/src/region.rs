// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! DMA-contiguous memory.
//!
//! A [`DmaRegion`] hands out buffers from one contiguous address range with a
//! wrapping bump cursor. Individual buffers are never freed; the whole region
//! is reclaimed by [`DmaRegion::fin`] or a fresh [`DmaRegion::init`]. Once the
//! cursor reaches the end of the range it starts over at the base, so buffers
//! from long before may be handed out again. The suites only keep a handful of
//! short-lived buffers around at any time, which is what this scheme relies on.

use core::fmt;

use lock_api::Mutex;

use crate::{Error, Result};

/// Gap kept after every buffer, and the minimum alignment of buffer addresses.
pub const DMA_PAD: usize = 16;

/// A buffer handed out by a [`DmaRegion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DmaBuffer {
    addr: usize,
    len: usize,
}

// === impl DmaBuffer ===

impl DmaBuffer {
    pub const fn addr(&self) -> usize {
        self.addr
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte of the buffer.
    pub const fn end(&self) -> usize {
        self.addr + self.len
    }

    pub const fn as_mut_ptr(&self) -> *mut u8 {
        self.addr as *mut u8
    }
}

/// A DMA-contiguous bump allocator with wraparound.
pub struct DmaRegion<R: lock_api::RawMutex>(Mutex<R, RegionState>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RegionState {
    base: usize,
    end: usize,
    cursor: usize,
    unmanaged_base: usize,
    initialized: bool,
}

// === impl DmaRegion ===

impl<R: lock_api::RawMutex> DmaRegion<R> {
    pub const fn new() -> Self {
        Self(Mutex::const_new(R::INIT, RegionState::EMPTY))
    }

    /// Takes ownership of `dma_size` bytes at `dma_base`.
    ///
    /// `unmanaged_base` marks memory outside the region that callers manage
    /// themselves; it is only recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyInitialized`] if the region is initialized and
    /// [`Error::InvalidArgument`] if the range is empty or wraps the address
    /// space.
    ///
    /// # Safety
    ///
    /// The `dma_size` bytes at `dma_base` must be readable and writable memory
    /// that nothing else uses. It must stay valid until the region is
    /// finalized or dropped, and until every thread running on a stack carved
    /// from it has been joined or destroyed. Buffers are handed to DMA engines
    /// and backends (e.g. as thread stacks) as-is.
    pub unsafe fn init(
        &self,
        dma_base: usize,
        unmanaged_base: usize,
        dma_size: usize,
    ) -> Result<()> {
        let mut state = self.0.lock();

        if state.initialized {
            return Err(Error::AlreadyInitialized);
        }
        if dma_size == 0 {
            return Err(Error::InvalidArgument);
        }
        let end = dma_base
            .checked_add(dma_size)
            .ok_or(Error::InvalidArgument)?;

        *state = RegionState {
            base: dma_base,
            end,
            cursor: dma_base,
            unmanaged_base,
            initialized: true,
        };
        log::trace!(
            "DMA region initialized {dma_base:#x}..{end:#x} (unmanaged base {unmanaged_base:#x})"
        );

        Ok(())
    }

    /// Forgets the managed range. Every buffer handed out so far becomes
    /// invalid. Finalizing an uninitialized region does nothing.
    pub fn fin(&self) {
        let mut state = self.0.lock();
        if state.initialized {
            log::trace!("DMA region finalized {:#x}..{:#x}", state.base, state.end);
        }
        *state = RegionState::EMPTY;
    }

    /// Allocates `size` bytes aligned to [`DMA_PAD`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `size` is zero,
    /// [`Error::NotInitialized`] before [`init`](Self::init) and
    /// [`Error::OutOfRange`] if the request does not fit even after wrapping
    /// around. The cursor is left untouched on failure.
    pub fn alloc(&self, size: usize) -> Result<DmaBuffer> {
        self.alloc_aligned(size, DMA_PAD)
    }

    /// Like [`alloc`](Self::alloc) but aligns the buffer to `align`, which also
    /// becomes the gap kept after the buffer when it exceeds [`DMA_PAD`].
    ///
    /// # Errors
    ///
    /// Same as [`alloc`](Self::alloc); additionally [`Error::InvalidArgument`]
    /// if `align` is not a power of two.
    pub fn alloc_aligned(&self, size: usize, align: usize) -> Result<DmaBuffer> {
        if size == 0 || !align.is_power_of_two() {
            return Err(Error::InvalidArgument);
        }
        let align = align.max(DMA_PAD);

        let mut state = self.0.lock();
        if !state.initialized {
            return Err(Error::NotInitialized);
        }

        let (addr, next) = match state.fit(state.cursor, size, align) {
            Some(fit) => fit,
            None => {
                log::trace!("DMA region cursor wrapped around");
                state
                    .fit(state.base, size, align)
                    .ok_or(Error::OutOfRange)?
            }
        };
        state.cursor = next;

        Ok(DmaBuffer { addr, len: size })
    }

    /// Returns a buffer to the region. Space is only reclaimed wholesale, so
    /// this does nothing.
    pub fn free(&self, buf: DmaBuffer) {
        log::trace!("DMA free of {:#x} (+{}) ignored", buf.addr, buf.len);
    }

    pub fn is_initialized(&self) -> bool {
        self.0.lock().initialized
    }

    /// Whether `addr` lies within the managed range.
    pub fn contains(&self, addr: usize) -> bool {
        let state = self.0.lock();
        state.initialized && (state.base..state.end).contains(&addr)
    }

    pub fn base(&self) -> Result<usize> {
        self.with_initialized(|state| state.base)
    }

    pub fn end(&self) -> Result<usize> {
        self.with_initialized(|state| state.end)
    }

    pub fn unmanaged_base(&self) -> Result<usize> {
        self.with_initialized(|state| state.unmanaged_base)
    }

    /// The address the next allocation starts searching at.
    pub fn cursor(&self) -> Result<usize> {
        self.with_initialized(|state| state.cursor)
    }

    /// Bytes between the cursor and the end of the region.
    pub fn remaining(&self) -> Result<usize> {
        self.with_initialized(|state| state.end - state.cursor)
    }

    fn with_initialized<T>(&self, f: impl FnOnce(&RegionState) -> T) -> Result<T> {
        let state = self.0.lock();
        if state.initialized {
            Ok(f(&state))
        } else {
            Err(Error::NotInitialized)
        }
    }
}

impl<R: lock_api::RawMutex> Default for DmaRegion<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: lock_api::RawMutex> fmt::Debug for DmaRegion<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = *self.0.lock();
        f.debug_struct("DmaRegion")
            .field("base", &format_args!("{:#x}", state.base))
            .field("end", &format_args!("{:#x}", state.end))
            .field("cursor", &format_args!("{:#x}", state.cursor))
            .field("unmanaged_base", &format_args!("{:#x}", state.unmanaged_base))
            .field("initialized", &state.initialized)
            .finish()
    }
}

// === impl RegionState ===

impl RegionState {
    const EMPTY: Self = Self {
        base: 0,
        end: 0,
        cursor: 0,
        unmanaged_base: 0,
        initialized: false,
    };

    /// Tries to place `size` bytes at `from`, returning the buffer address and
    /// the cursor after it.
    ///
    /// `pad` is a power of two of at least [`DMA_PAD`] and is used both as the
    /// trailing gap and as the alignment, so the aligned address plus `size`
    /// always stays below the returned cursor.
    fn fit(&self, from: usize, size: usize, pad: usize) -> Option<(usize, usize)> {
        let next = from.checked_add(size)?.checked_add(pad)?;
        if next > self.end {
            return None;
        }

        let addr = (from + pad - 1) & !(pad - 1);
        Some((addr, next))
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;
    use crate::backend::no_os::RawSpinlock;

    type Region = DmaRegion<RawSpinlock>;

    const PAGE: usize = 0x1000;

    /// Heap memory with room for `len` bytes starting at a page boundary.
    fn backing(len: usize) -> (Vec<u8>, usize) {
        let mut mem = vec![0u8; len + PAGE];
        let base = mem.as_mut_ptr().expose_provenance().next_multiple_of(PAGE);
        (mem, base)
    }

    fn init(region: &Region, base: usize, unmanaged_base: usize, len: usize) -> Result<()> {
        // Safety: every caller passes a range inside a live `backing` or one
        // that is rejected before it is recorded
        unsafe { region.init(base, unmanaged_base, len) }
    }

    #[test]
    fn first_allocation_starts_at_base() {
        let (_mem, base) = backing(64);
        let region = Region::new();
        init(&region, base, base, 64).unwrap();

        let buf = region.alloc(10).unwrap();
        assert_eq!(buf.addr(), base);
        assert_eq!(buf.len(), 10);
        assert_eq!(region.cursor().unwrap(), base + 0x1a);
    }

    #[test]
    fn wraps_then_fails_without_moving_cursor() {
        let (_mem, base) = backing(64);
        let region = Region::new();
        init(&region, base, base + PAGE, 64).unwrap();

        region.alloc(10).unwrap();
        assert_eq!(region.alloc(60), Err(Error::OutOfRange));
        assert_eq!(region.cursor().unwrap(), base + 0x1a);
    }

    #[test]
    fn wraps_to_base_when_the_tail_is_too_small() {
        let (_mem, base) = backing(128);
        let region = Region::new();
        init(&region, base, 0, 128).unwrap();

        region.alloc(80).unwrap();
        // base + 0x60 + 30 + 16 is past the end, but fits again at the base
        let buf = region.alloc(30).unwrap();
        assert_eq!(buf.addr(), base);
        assert_eq!(region.cursor().unwrap(), base + 30 + DMA_PAD);
    }

    #[test]
    fn addresses_are_aligned() {
        let (_mem, page) = backing(0x1003);
        let region = Region::new();
        init(&region, page + 3, 0, 0x1000).unwrap();

        for size in [1, 7, 33, 100] {
            let buf = region.alloc(size).unwrap();
            assert_eq!(buf.addr() % DMA_PAD, 0, "{buf:?}");
            assert!(region.contains(buf.addr()));
            assert!(buf.end() <= region.end().unwrap());
        }
    }

    #[test]
    fn aligned_allocation_for_stacks() {
        let (_mem, page) = backing(0x10_0010);
        let region = Region::new();
        let base = page + 0x10;
        init(&region, base, 0, 0x10_0000).unwrap();

        let stack = region.alloc_aligned(0x4000, 0x1000).unwrap();
        assert_eq!(stack.addr(), page + 0x1000);
        assert_eq!(region.cursor().unwrap(), base + 0x4000 + 0x1000);

        assert_eq!(region.alloc_aligned(16, 3), Err(Error::InvalidArgument));
    }

    #[test]
    fn zero_size_is_rejected_before_initialization() {
        let region = Region::new();
        assert_eq!(region.alloc(0), Err(Error::InvalidArgument));
        assert_eq!(region.alloc(1), Err(Error::NotInitialized));
    }

    #[test]
    fn double_init_is_rejected() {
        let (_mem, base) = backing(128);
        let region = Region::new();
        init(&region, base, 0, 64).unwrap();
        assert_eq!(
            init(&region, base + 64, 0, 64),
            Err(Error::AlreadyInitialized)
        );
        assert_eq!(region.base().unwrap(), base);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let region = Region::new();
        assert_eq!(init(&region, 0x1000, 0, 0), Err(Error::InvalidArgument));
        assert_eq!(init(&region, usize::MAX, 0, 2), Err(Error::InvalidArgument));
        assert!(!region.is_initialized());
    }

    #[test]
    fn fin_then_init_resets_the_cursor() {
        let (_mem, base) = backing(256);
        let region = Region::new();
        init(&region, base, 0, 256).unwrap();
        region.alloc(100).unwrap();

        region.fin();
        assert!(!region.is_initialized());
        assert_eq!(region.cursor(), Err(Error::NotInitialized));
        assert!(!region.contains(base));

        init(&region, base, 0, 256).unwrap();
        assert_eq!(region.cursor().unwrap(), base);
        assert_eq!(region.remaining().unwrap(), 256);
    }

    #[test]
    fn free_does_not_reclaim() {
        let (_mem, base) = backing(256);
        let region = Region::new();
        init(&region, base, 0, 256).unwrap();

        let buf = region.alloc(32).unwrap();
        let cursor = region.cursor().unwrap();
        region.free(buf);
        assert_eq!(region.cursor().unwrap(), cursor);
    }

    #[test]
    fn records_unmanaged_base() {
        let (_mem, base) = backing(64);
        let region = Region::new();
        assert_eq!(region.unmanaged_base(), Err(Error::NotInitialized));
        init(&region, base, 0x9000, 64).unwrap();
        assert_eq!(region.unmanaged_base().unwrap(), 0x9000);
    }

    #[test]
    fn buffers_are_writable() {
        let (_mem, base) = backing(256);
        let region = Region::new();
        init(&region, base, base, 256).unwrap();

        let buf = region.alloc(64).unwrap();
        // Safety: the buffer lies inside `_mem`, which outlives this test body
        unsafe { buf.as_mut_ptr().write_bytes(0xa5, buf.len()) };
        // Safety: written above
        assert_eq!(unsafe { buf.as_mut_ptr().add(63).read() }, 0xa5);
    }
}
