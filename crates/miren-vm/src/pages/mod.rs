// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! OS-page-sized allocation primitive.
//!
//! Slot pages are carved out of whole OS pages so that releasing a page
//! returns its memory to the operating system, not to a process-local
//! allocator. On unix targets the pages come from anonymous `mmap`; elsewhere
//! a page-aligned allocation from the global allocator stands in.


use core::fmt;
use core::ptr::NonNull;
use std::sync::OnceLock;

/// Fallback page size for targets where it cannot be queried.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// The size of one OS page in bytes.
///
/// Queried once and cached for the lifetime of the process.
#[must_use]
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(query_page_size)
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // SAFETY: sysconf is async-signal-safe and has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(not(unix))]
const fn query_page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

/// Allocation of a single OS page failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageAllocError;

impl fmt::Display for PageAllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to allocate an OS page")
    }
}

impl core::error::Error for PageAllocError {}

/// One OS page of read-write memory, owned by this handle.
///
/// The memory is returned to the OS when the block is dropped.
#[derive(Debug)]
pub struct PageBlock {
    ptr: NonNull<u8>,
}

// SAFETY: a PageBlock is an exclusively owned region of plain memory; it can
// be sent to another thread together with its owner.
unsafe impl Send for PageBlock {}

impl PageBlock {
    /// Allocate one zeroed OS page.
    ///
    /// # Errors
    ///
    /// Returns [`PageAllocError`] when the OS refuses the mapping.
    pub fn allocate() -> Result<Self, PageAllocError> {
        let size = page_size();
        let ptr = raw_allocate(size)?;
        Ok(Self { ptr })
    }

    /// The base address of the page.
    #[must_use]
    pub const fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// The size of the page in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        page_size()
    }

    /// Pages are never empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl Drop for PageBlock {
    fn drop(&mut self) {
        raw_free(self.ptr, page_size());
    }
}

#[cfg(unix)]
fn raw_allocate(size: usize) -> Result<NonNull<u8>, PageAllocError> {
    // SAFETY: anonymous private mapping with no address hint; the result is
    // checked against MAP_FAILED before use.
    let raw = unsafe {
        libc::mmap(
            core::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if raw == libc::MAP_FAILED {
        return Err(PageAllocError);
    }
    NonNull::new(raw.cast::<u8>()).ok_or(PageAllocError)
}

#[cfg(unix)]
fn raw_free(ptr: NonNull<u8>, size: usize) {
    // SAFETY: ptr/size describe exactly the mapping created in raw_allocate.
    unsafe {
        libc::munmap(ptr.as_ptr().cast::<libc::c_void>(), size);
    }
}

#[cfg(not(unix))]
fn raw_allocate(size: usize) -> Result<NonNull<u8>, PageAllocError> {
    let Ok(layout) = core::alloc::Layout::from_size_align(size, size) else {
        return Err(PageAllocError);
    };
    // SAFETY: the layout has non-zero size.
    let raw = unsafe { std::alloc::alloc_zeroed(layout) };
    NonNull::new(raw).ok_or(PageAllocError)
}

#[cfg(not(unix))]
fn raw_free(ptr: NonNull<u8>, size: usize) {
    let Ok(layout) = core::alloc::Layout::from_size_align(size, size) else {
        return;
    };
    // SAFETY: ptr/layout describe exactly the allocation from raw_allocate.
    unsafe {
        std::alloc::dealloc(ptr.as_ptr(), layout);
    }
}
