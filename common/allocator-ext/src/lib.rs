//! Extra items for working with allocators.
//!
//! [`RawAlloc`] describes an allocator through the C interface
//! (`malloc`, `calloc`, `realloc`, `free`), which is what gets interposed.
//! [`Libc`] is the C library's own allocator reached directly,
//! bypassing any interposed symbols. It also implements [`GlobalAlloc`],
//! so that a shared object interposing `malloc` can route its own
//! Rust allocations around the interposer.

#![warn(missing_docs)]

use {
    libc::c_void,
    os_ext::malloc,
    std::{alloc::{GlobalAlloc, Layout}, cmp::min, ptr},
};

/// Alignment guaranteed by `malloc` on this platform.
#[cfg(target_pointer_width = "64")]
pub const MIN_ALIGN: usize = 16;

/// Alignment guaranteed by `malloc` on this platform.
#[cfg(not(target_pointer_width = "64"))]
pub const MIN_ALIGN: usize = 8;

/// Allocator with the C allocation interface.
///
/// # Safety
///
/// Implementations must behave like the C functions of the same names.
/// In particular, pointers returned by any allocating method
/// must be accepted by [`realloc`][`Self::realloc`] and [`free`][`Self::free`].
pub unsafe trait RawAlloc: Sync
{
    /// Allocate `size` bytes, or return null.
    fn malloc(&self, size: usize) -> *mut c_void;

    /// Allocate `nmemb * size` zeroed bytes, or return null.
    fn calloc(&self, nmemb: usize, size: usize) -> *mut c_void;

    /// Resize an allocation, possibly moving it.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live allocation of this allocator.
    unsafe fn realloc(&self, ptr: *mut c_void, size: usize) -> *mut c_void;

    /// Release an allocation.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live allocation of this allocator.
    unsafe fn free(&self, ptr: *mut c_void);
}

/// The C library's allocator, reached without going through `malloc`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Libc;

unsafe impl RawAlloc for Libc
{
    fn malloc(&self, size: usize) -> *mut c_void
    {
        malloc::malloc(size)
    }

    fn calloc(&self, nmemb: usize, size: usize) -> *mut c_void
    {
        malloc::calloc(nmemb, size)
    }

    unsafe fn realloc(&self, ptr: *mut c_void, size: usize) -> *mut c_void
    {
        malloc::realloc(ptr, size)
    }

    unsafe fn free(&self, ptr: *mut c_void)
    {
        malloc::free(ptr)
    }
}

/// Whether `malloc` alone satisfies the alignment of `layout`.
fn fits_min_align(layout: Layout) -> bool
{
    layout.align() <= MIN_ALIGN && layout.align() <= layout.size()
}

unsafe impl GlobalAlloc for Libc
{
    unsafe fn alloc(&self, layout: Layout) -> *mut u8
    {
        if fits_min_align(layout) {
            malloc::malloc(layout.size()).cast()
        } else {
            malloc::memalign(layout.align(), layout.size()).cast()
        }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8
    {
        if fits_min_align(layout) {
            return malloc::calloc(1, layout.size()).cast();
        }
        let ptr = self.alloc(layout);
        if !ptr.is_null() {
            ptr::write_bytes(ptr, 0, layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout)
    {
        malloc::free(ptr.cast())
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize)
        -> *mut u8
    {
        if layout.align() <= MIN_ALIGN && layout.align() <= new_size {
            return malloc::realloc(ptr.cast(), new_size).cast();
        }

        // SAFETY: The caller guarantees new_size rounds to a valid layout.
        let new_layout =
            Layout::from_size_align_unchecked(new_size, layout.align());
        let new_ptr = self.alloc(new_layout);
        if !new_ptr.is_null() {
            ptr::copy_nonoverlapping(ptr, new_ptr, min(layout.size(), new_size));
            self.dealloc(ptr, layout);
        }
        new_ptr
    }
}
