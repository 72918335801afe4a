use {
    crate::{cstr::IntoCStr, retry_on_eintr},
    std::{
        ffi::CStr,
        io,
        os::unix::io::{FromRawFd, OwnedFd},
    },
};

/// Call open(2) with the given arguments.
pub fn open<'a>(
    pathname: impl IntoCStr<'a>,
    flags:    libc::c_int,
    mode:     libc::mode_t,
) -> io::Result<OwnedFd>
{
    #[inline(never)]
    fn monomorphic(
        pathname: &CStr,
        flags:    libc::c_int,
        mode:     libc::mode_t,
    ) -> io::Result<OwnedFd>
    {
        let flags = flags | libc::O_CLOEXEC;

        retry_on_eintr(|| {
            // SAFETY: path is NUL-terminated.
            let fd = unsafe {
                libc::open(pathname.as_ptr(), flags, mode as libc::c_uint)
            };

            if fd == -1 {
                return Err(io::Error::last_os_error());
            }

            // SAFETY: fd is a new, open file descriptor.
            Ok(unsafe { OwnedFd::from_raw_fd(fd) })
        })
    }

    let pathname = pathname.into_cstr()?;
    monomorphic(&pathname, flags, mode)
}
