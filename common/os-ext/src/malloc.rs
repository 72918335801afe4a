//! The C library's own allocator entry points.
//!
//! These call glibc's `__libc_*` functions rather than `malloc` and friends.
//! When a shared object interposes `malloc`, a call to `malloc`
//! from inside that shared object resolves back to the interposer.
//! The `__libc_*` entry points always reach the real allocator,
//! so they are safe to call from an interposed `malloc`.
//!
//! Memory obtained through this module may be released with
//! the regular `free` and vice versa, as they share the same heap.

use libc::{c_int, c_void, size_t};

extern "C"
{
    fn __libc_malloc(size: size_t) -> *mut c_void;
    fn __libc_calloc(nmemb: size_t, size: size_t) -> *mut c_void;
    fn __libc_realloc(ptr: *mut c_void, size: size_t) -> *mut c_void;
    fn __libc_free(ptr: *mut c_void);
    fn __libc_memalign(alignment: size_t, size: size_t) -> *mut c_void;
    fn __libc_valloc(size: size_t) -> *mut c_void;
    fn __libc_pvalloc(size: size_t) -> *mut c_void;
    fn __libc_mallopt(param: c_int, value: c_int) -> c_int;
}

/// Call malloc(3) with the given arguments.
pub fn malloc(size: size_t) -> *mut c_void
{
    // SAFETY: Any size is permitted.
    unsafe { __libc_malloc(size) }
}

/// Call calloc(3) with the given arguments.
pub fn calloc(nmemb: size_t, size: size_t) -> *mut c_void
{
    // SAFETY: calloc checks for overflow itself.
    unsafe { __libc_calloc(nmemb, size) }
}

/// Call realloc(3) with the given arguments.
///
/// # Safety
///
/// `ptr` must be null or returned by an allocation function
/// in this module (or by the C library) and not yet freed.
pub unsafe fn realloc(ptr: *mut c_void, size: size_t) -> *mut c_void
{
    __libc_realloc(ptr, size)
}

/// Call free(3) with the given arguments.
///
/// # Safety
///
/// `ptr` must be null or returned by an allocation function
/// in this module (or by the C library) and not yet freed.
pub unsafe fn free(ptr: *mut c_void)
{
    __libc_free(ptr)
}

/// Call memalign(3) with the given arguments.
pub fn memalign(alignment: size_t, size: size_t) -> *mut c_void
{
    // SAFETY: Invalid alignments are reported through a null pointer.
    unsafe { __libc_memalign(alignment, size) }
}

/// Call posix_memalign(3) with the given arguments.
///
/// Unlike the other functions in this module,
/// this one reports errors the way the C function does: as a return value.
pub fn posix_memalign(memptr: &mut *mut c_void, alignment: size_t, size: size_t)
    -> c_int
{
    let word = std::mem::size_of::<*mut c_void>();
    if !alignment.is_power_of_two() || alignment % word != 0 {
        return libc::EINVAL;
    }

    let ptr = memalign(alignment, size);
    if ptr.is_null() {
        return libc::ENOMEM;
    }

    *memptr = ptr;
    0
}

/// Call valloc(3) with the given arguments.
pub fn valloc(size: size_t) -> *mut c_void
{
    // SAFETY: Any size is permitted.
    unsafe { __libc_valloc(size) }
}

/// Call pvalloc(3) with the given arguments.
pub fn pvalloc(size: size_t) -> *mut c_void
{
    // SAFETY: Any size is permitted.
    unsafe { __libc_pvalloc(size) }
}

/// Call mallopt(3) with the given arguments.
pub fn mallopt(param: c_int, value: c_int) -> c_int
{
    // SAFETY: Unknown parameters are rejected by the C library.
    unsafe { __libc_mallopt(param, value) }
}
