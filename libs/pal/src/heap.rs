// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! General purpose heap with `malloc`-style semantics.
//!
//! The suites free and resize blocks without knowing their size, so every
//! block carries a small header in front of the returned pointer recording the
//! requested size. Memory comes from the global allocator.

use alloc::alloc::{
    Layout, alloc as raw_alloc, alloc_zeroed as raw_alloc_zeroed, dealloc, realloc as raw_realloc,
};
use core::ptr::NonNull;

/// Size of the block header. Also the alignment of every returned pointer.
const HEADER: usize = 16;

static_assertions::const_assert!(HEADER >= size_of::<usize>());
static_assertions::const_assert!(HEADER.is_power_of_two());

/// Allocates `size` bytes. Returns `None` for a zero-sized request or when the
/// global allocator fails.
pub fn alloc(size: usize) -> Option<NonNull<u8>> {
    allocate(size, |layout| {
        // Safety: `block_layout` never returns a zero-sized layout
        unsafe { raw_alloc(layout) }
    })
}

/// Allocates a zeroed array of `count` elements of `size` bytes each.
pub fn alloc_zeroed(count: usize, size: usize) -> Option<NonNull<u8>> {
    let size = count.checked_mul(size)?;
    allocate(size, |layout| {
        // Safety: `block_layout` never returns a zero-sized layout
        unsafe { raw_alloc_zeroed(layout) }
    })
}

/// Releases a block. `None` is ignored.
///
/// # Safety
///
/// `ptr` must have been returned by this module and not been freed or
/// reallocated since.
pub unsafe fn free(ptr: Option<NonNull<u8>>) {
    let Some(ptr) = ptr else { return };

    // Safety: ensured by caller
    let (block, layout) = unsafe { block_of(ptr) };
    // Safety: `block` was allocated with `layout` by the global allocator
    unsafe { dealloc(block.as_ptr(), layout) };
}

/// Resizes a block, preserving its contents up to the smaller of the two
/// sizes.
///
/// `realloc(None, _)` allocates nothing and returns `None`. A `size` of zero
/// frees the block and returns `None`. On failure the original block is left
/// untouched.
///
/// # Safety
///
/// Same as [`free`].
pub unsafe fn realloc(ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
    let ptr = ptr?;

    if size == 0 {
        // Safety: ensured by caller
        unsafe { free(Some(ptr)) };
        return None;
    }

    let new_layout = block_layout(size)?;
    // Safety: ensured by caller
    let (block, layout) = unsafe { block_of(ptr) };
    // Safety: `block` was allocated with `layout` and the new size is non-zero
    // and does not overflow `isize` once rounded to the header alignment
    let block = NonNull::new(unsafe { raw_realloc(block.as_ptr(), layout, new_layout.size()) })?;

    // Safety: the block is at least `HEADER` bytes and aligned to `HEADER`
    Some(unsafe { finish_block(block, size) })
}

fn allocate(size: usize, f: impl FnOnce(Layout) -> *mut u8) -> Option<NonNull<u8>> {
    if size == 0 {
        return None;
    }

    let layout = block_layout(size)?;
    let block = NonNull::new(f(layout))?;

    // Safety: the block is at least `HEADER` bytes and aligned to `HEADER`
    Some(unsafe { finish_block(block, size) })
}

fn block_layout(size: usize) -> Option<Layout> {
    Layout::from_size_align(size.checked_add(HEADER)?, HEADER).ok()
}

/// Writes the header and returns the user pointer.
///
/// # Safety
///
/// `block` must be valid for writes of `HEADER` bytes and aligned to `HEADER`.
unsafe fn finish_block(block: NonNull<u8>, size: usize) -> NonNull<u8> {
    // Safety: ensured by caller
    unsafe { block.cast::<usize>().write(size) };
    // Safety: ensured by caller
    unsafe { block.add(HEADER) }
}

/// Recovers the block start and layout from a user pointer.
///
/// # Safety
///
/// `ptr` must have been returned by [`finish_block`].
unsafe fn block_of(ptr: NonNull<u8>) -> (NonNull<u8>, Layout) {
    // Safety: ensured by caller
    let block = unsafe { ptr.sub(HEADER) };
    // Safety: the header was written by `finish_block`
    let size = unsafe { block.cast::<usize>().read() };
    // Safety: this exact layout was valid when the block was allocated
    let layout = unsafe { Layout::from_size_align_unchecked(size + HEADER, HEADER) };
    (block, layout)
}

#[cfg(test)]
mod tests {
    use core::slice;

    use super::*;

    #[test]
    fn zero_sized_requests_allocate_nothing() {
        assert!(alloc(0).is_none());
        assert!(alloc_zeroed(0, 8).is_none());
        assert!(alloc_zeroed(usize::MAX, 2).is_none());
        // Safety: `None` is always accepted
        unsafe { free(None) };
        // Safety: `None` is always accepted
        assert!(unsafe { realloc(None, 64) }.is_none());
    }

    #[test]
    fn blocks_are_aligned_and_writable() {
        let ptr = alloc(100).unwrap();
        assert_eq!(ptr.as_ptr() as usize % HEADER, 0);

        // Safety: the block is 100 bytes
        let bytes = unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), 100) };
        bytes.fill(0xa5);
        assert!(bytes.iter().all(|b| *b == 0xa5));

        // Safety: allocated above
        unsafe { free(Some(ptr)) };
    }

    #[test]
    fn zeroed_blocks_are_zero() {
        let ptr = alloc_zeroed(16, 4).unwrap();
        // Safety: the block is 64 bytes
        let bytes = unsafe { slice::from_raw_parts(ptr.as_ptr(), 64) };
        assert!(bytes.iter().all(|b| *b == 0));
        // Safety: allocated above
        unsafe { free(Some(ptr)) };
    }

    #[test]
    fn realloc_preserves_contents() {
        let ptr = alloc(8).unwrap();
        // Safety: the block is 8 bytes
        unsafe { ptr.as_ptr().copy_from_nonoverlapping(b"pal-heap".as_ptr(), 8) };

        // Safety: allocated above
        let grown = unsafe { realloc(Some(ptr), 4096) }.unwrap();
        // Safety: the block is 4096 bytes
        assert_eq!(unsafe { slice::from_raw_parts(grown.as_ptr(), 8) }, b"pal-heap");

        // Safety: returned by `realloc`
        let shrunk = unsafe { realloc(Some(grown), 3) }.unwrap();
        // Safety: the block is 3 bytes
        assert_eq!(unsafe { slice::from_raw_parts(shrunk.as_ptr(), 3) }, b"pal");

        // Safety: returned by `realloc`
        assert!(unsafe { realloc(Some(shrunk), 0) }.is_none());
    }
}
