use {
    smallvec::SmallVec,
    std::{fmt, mem::size_of, slice},
};

/// Opaque, fixed-size value naming a resource of the communication runtime.
///
/// Handles are compared by their bytes, not by any notion of equality
/// the runtime might have. The same bit pattern may name different objects
/// over time, as the runtime recycles handles.
///
/// # Safety
///
/// The type must not contain padding or interior mutability,
/// so that [`as_bytes`][`Self::as_bytes`] reads initialized, stable memory.
pub unsafe trait Handle: Copy + 'static
{
    /// Whether this is the null handle of its kind.
    ///
    /// Null handles never receive an identity.
    fn is_null(&self) -> bool;

    /// The bytes that make up the handle.
    fn as_bytes(&self) -> &[u8]
    {
        let ptr = self as *const Self as *const u8;
        // SAFETY: The trait contract rules out padding.
        unsafe { slice::from_raw_parts(ptr, size_of::<Self>()) }
    }
}

/// Owned copy of the bytes of a handle.
///
/// Registries key their tables on this, so that a handle
/// is found again only when its exact bit pattern recurs.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct HandleKey(SmallVec<[u8; 16]>);

impl HandleKey
{
    /// Copy the bytes of a handle.
    pub fn of<H>(handle: &H) -> Self
        where H: Handle
    {
        Self(SmallVec::from_slice(handle.as_bytes()))
    }

    /// The copied bytes.
    pub fn as_bytes(&self) -> &[u8]
    {
        &self.0
    }
}

impl fmt::Debug for HandleKey
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "0x")?;
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Implement [`Handle`] for integer-backed handle newtypes.
///
/// Bindings to runtimes that represent handles as integers or pointers
/// can use this to declare each handle kind with its null value.
///
/// ```
/// waypoint::int_handle! {
///     /// Datatype handle.
///     pub struct Datatype(u32) null 0x0c00_0000;
/// }
/// use waypoint::Handle;
/// assert!(Datatype(0x0c00_0000).is_null());
/// ```
#[macro_export]
macro_rules! int_handle
{
    { $(
        $(#[$meta:meta])*
        $vis:vis struct $name:ident($repr:ty) null $null:expr;
    )* } => { $(
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[repr(transparent)]
        $vis struct $name(pub $repr);

        // SAFETY: A single integer field has no padding.
        unsafe impl $crate::Handle for $name
        {
            fn is_null(&self) -> bool
            {
                self.0 == $null
            }
        }
    )* };
}
