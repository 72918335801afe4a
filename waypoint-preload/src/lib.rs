//! Allocator interposition for the identity layer.
//!
//! Loaded with `LD_PRELOAD`, this library takes over `malloc`, `calloc`,
//! `realloc`, and `free`, and feeds every allocation to a process-wide
//! [`MemoryTracker`] so that buffer addresses can be given identities.
//! The aligned allocation functions are forwarded to the C library
//! without tracking; freeing their memory while tracking is on
//! counts as an untracked free and leaks it.
//!
//! The library's own Rust allocations go to the C library directly,
//! so the tracker never sees them and never re-enters itself.
//!
//! The tracer drives the tracker through the `waypoint_*` entry points.

#![warn(missing_docs)]

use {
    allocator_ext::Libc,
    libc::{c_int, c_void, size_t},
    waypoint::{Config, Identity, MemoryTracker},
};

#[global_allocator]
static GLOBAL: Libc = Libc;

/// The tracker behind the interposed allocator.
pub static TRACKER: MemoryTracker<Libc> = MemoryTracker::new(Libc);

/// Start tracking, with address tracking as configured in the environment.
#[no_mangle]
pub extern "C" fn waypoint_install()
{
    TRACKER.install(&Config::from_env());
}

/// Start tracking, with address tracking on if `track_addresses` is nonzero.
#[no_mangle]
pub extern "C" fn waypoint_install_with(track_addresses: c_int)
{
    let config = Config{track_addresses: track_addresses != 0, ..Config::default()};
    TRACKER.install(&config);
}

/// Stop tracking and drop all regions.
#[no_mangle]
pub extern "C" fn waypoint_uninstall()
{
    TRACKER.uninstall();
}

/// Identity of the buffer `ptr` points into.
#[no_mangle]
pub extern "C" fn waypoint_buffer_id(ptr: *const c_void) -> Identity
{
    TRACKER.address_to_identity(ptr)
}

/// Interposed malloc(3).
#[no_mangle]
pub extern "C" fn malloc(size: size_t) -> *mut c_void
{
    TRACKER.allocate(size)
}

/// Interposed calloc(3).
#[no_mangle]
pub extern "C" fn calloc(nmemb: size_t, size: size_t) -> *mut c_void
{
    TRACKER.zeroed_allocate(nmemb, size)
}

/// Interposed realloc(3).
///
/// # Safety
///
/// See realloc(3).
#[no_mangle]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: size_t) -> *mut c_void
{
    TRACKER.reallocate(ptr, size)
}

/// Interposed free(3).
///
/// # Safety
///
/// See free(3).
#[no_mangle]
pub unsafe extern "C" fn free(ptr: *mut c_void)
{
    TRACKER.free(ptr)
}

/// Forwarded posix_memalign(3).
///
/// # Safety
///
/// `memptr` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn posix_memalign(
    memptr:    *mut *mut c_void,
    alignment: size_t,
    size:      size_t,
) -> c_int
{
    match memptr.as_mut() {
        Some(memptr) => os_ext::malloc::posix_memalign(memptr, alignment, size),
        None => libc::EINVAL,
    }
}

/// Forwarded memalign(3).
#[no_mangle]
pub extern "C" fn memalign(alignment: size_t, size: size_t) -> *mut c_void
{
    os_ext::malloc::memalign(alignment, size)
}

/// Forwarded aligned_alloc(3).
#[no_mangle]
pub extern "C" fn aligned_alloc(alignment: size_t, size: size_t) -> *mut c_void
{
    os_ext::malloc::memalign(alignment, size)
}

/// Forwarded valloc(3).
#[no_mangle]
pub extern "C" fn valloc(size: size_t) -> *mut c_void
{
    os_ext::malloc::valloc(size)
}

/// Forwarded pvalloc(3).
#[no_mangle]
pub extern "C" fn pvalloc(size: size_t) -> *mut c_void
{
    os_ext::malloc::pvalloc(size)
}

/// Forwarded mallopt(3).
#[no_mangle]
pub extern "C" fn mallopt(param: c_int, value: c_int) -> c_int
{
    os_ext::malloc::mallopt(param, value)
}
