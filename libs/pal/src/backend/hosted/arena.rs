// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ptr::{self, NonNull};

use super::{last_error, page_size};
use crate::{Error, Result};

/// Anonymous memory to back a [`DmaRegion`] on hosted systems.
///
/// Hosted processes cannot get physically contiguous memory, so this is only
/// virtually contiguous. That is all the software fallbacks of the suites
/// need. The mapping is page aligned and removed on drop, so the region using
/// it must be finalized first.
///
/// [`DmaRegion`]: crate::DmaRegion
#[derive(Debug)]
pub struct DmaArena {
    base: NonNull<u8>,
    len: usize,
}

// Safety: the arena is plain memory, access is coordinated by the region
unsafe impl Send for DmaArena {}
// Safety: see above
unsafe impl Sync for DmaArena {}

impl DmaArena {
    /// Maps at least `size` bytes of zeroed, read-write memory.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidArgument);
        }

        let page_size = page_size();
        let len = size
            .checked_next_multiple_of(page_size)
            .ok_or(Error::InvalidArgument)?;

        // Safety: anonymous private mapping, no existing memory is affected
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(last_error("mmap"));
        }

        let base = NonNull::new(ptr.cast()).ok_or(Error::NativeFailure)?;
        log::trace!("mapped DMA arena {ptr:p} (+{len:#x})");

        Ok(Self { base, len })
    }

    pub fn base(&self) -> usize {
        self.base.addr().get()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }
}

impl Drop for DmaArena {
    fn drop(&mut self) {
        // Safety: unmaps exactly the mapping created in `new`
        let ret = unsafe { libc::munmap(self.base.as_ptr().cast(), self.len) };
        debug_assert_eq!(ret, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_is_page_aligned_and_writable() {
        let arena = DmaArena::new(100).unwrap();
        assert_eq!(arena.base() % page_size(), 0);
        assert_eq!(arena.len(), page_size());

        // Safety: the arena is at least one page
        unsafe { arena.as_mut_ptr().write_bytes(0x5a, arena.len()) };
        // Safety: written above
        assert_eq!(unsafe { arena.as_mut_ptr().add(99).read() }, 0x5a);
    }

    #[test]
    fn empty_arena_is_rejected() {
        assert_eq!(DmaArena::new(0).unwrap_err(), Error::InvalidArgument);
    }
}
