use {crate::cstr::IntoCStr, std::{ffi::CStr, io}};

/// Call rename(2) with the given arguments.
pub fn rename<'a, 'b>(oldpath: impl IntoCStr<'a>, newpath: impl IntoCStr<'b>)
    -> io::Result<()>
{
    #[inline(never)]
    fn monomorphic(oldpath: &CStr, newpath: &CStr) -> io::Result<()>
    {
        // SAFETY: Paths are NUL-terminated.
        let result = unsafe { libc::rename(oldpath.as_ptr(), newpath.as_ptr()) };

        if result == -1 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    let oldpath = oldpath.into_cstr()?;
    let newpath = newpath.into_cstr()?;
    monomorphic(&oldpath, &newpath)
}
