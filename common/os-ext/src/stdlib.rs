use {
    crate::cstr::IntoCStr,
    std::{ffi::{CStr, OsString}, io, os::unix::ffi::OsStringExt, path::PathBuf},
};

/// Call mkdtemp(3) with the given arguments.
///
/// Returns the path of the new directory.
pub fn mkdtemp<'a>(template: impl IntoCStr<'a>) -> io::Result<PathBuf>
{
    #[inline(never)]
    fn monomorphic(template: &CStr) -> io::Result<PathBuf>
    {
        // mkdtemp fills in the template in place.
        let mut buf = template.to_bytes_with_nul().to_vec();

        // SAFETY: buf is NUL-terminated.
        let ptr = unsafe { libc::mkdtemp(buf.as_mut_ptr().cast()) };
        if ptr.is_null() {
            return Err(io::Error::last_os_error());
        }

        buf.pop();
        Ok(PathBuf::from(OsString::from_vec(buf)))
    }

    let template = template.into_cstr()?;
    monomorphic(&template)
}
