//! Extra items for talking to the operating system and the C library.
//!
//! This crate provides a safe, low-level interface to the C library.
//! The functions in this crate are named after their underlying C functions,
//! and their behavior is identical except for the differences listed below.
//! The exact semantics of each function can be found in their man pages.
//!
//! # Differences with underlying C functions
//!
//! Errors are reported using [`Result`] rather than
//! through `errno` and an arbitrary return value.
//! The allocator entry points in [`malloc`] are the exception:
//! they keep the C convention of returning a null pointer,
//! because they sit underneath allocator interposition,
//! where constructing an error value is not an option.
//!
//! Regular string arguments are accepted instead of NUL-terminated strings.
//! They are automatically made NUL-terminated by the wrapper functions.
//! If an interior NUL is found within the string,
//! the wrapper function fails with `EINVAL`.
//!
//! When a new file descriptor is created by one of the functions,
//! it is created with the `FD_CLOEXEC` bit set (atomically).
//!
//! If the system call fails with `EINTR` (interrupted),
//! the wrapper function automatically retries it.
//!
//! [`Result`]: `std::io::Result`

#![warn(missing_docs)]

pub use {
    self::{fcntl::*, stdio::*, stdlib::*},
    libc::{O_CREAT, O_EXCL, O_RDONLY, O_WRONLY, c_void, size_t},
};

use std::io::{self, ErrorKind::Interrupted};

pub mod cstr;
pub mod malloc;

mod fcntl;
mod stdio;
mod stdlib;

/// Call `f` until it no longer fails with `EINTR`.
fn retry_on_eintr<F, T>(mut f: F) -> io::Result<T>
    where F: FnMut() -> io::Result<T>
{
    loop {
        match f() {
            Err(err) if err.kind() == Interrupted => continue,
            result                                => return result,
        }
    }
}
