//! Identities for communication requests.
//!
//! Requests are registered like any other object,
//! but they also remember whether they were posted with a wildcard
//! source or tag. When a wildcard receive completes,
//! the tracer records the concrete source and tag it matched
//! next to the identity the request was given when it was posted.

use {
    crate::{Handle, Identity, registry::ObjectRegistry},
    bitflags::bitflags,
};

bitflags!
{
    /// Wildcards a request was posted with.
    #[derive(Default)]
    pub struct Wildcards: u8
    {
        /// Posted to receive from any source.
        const ANY_SOURCE = 0b01;

        /// Posted to receive with any tag.
        const ANY_TAG    = 0b10;
    }
}

impl Wildcards
{
    /// Compare a source and tag against the runtime's wildcard values.
    pub fn of(source: i32, tag: i32, any_source: i32, any_tag: i32) -> Self
    {
        let mut wildcards = Self::empty();
        wildcards.set(Self::ANY_SOURCE, source == any_source);
        wildcards.set(Self::ANY_TAG, tag == any_tag);
        wildcards
    }
}

/// What is known about a registered request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RequestEntry
{
    /// Identity of the request.
    pub identity: Identity,

    /// Wildcards the request was posted with.
    pub wildcards: Wildcards,
}

/// Maps request handles to identities and posting wildcards.
pub struct RequestRegistry<H>
{
    inner: ObjectRegistry<H, Wildcards>,
}

impl<H> Default for RequestRegistry<H>
{
    fn default() -> Self
    {
        Self{inner: ObjectRegistry::default()}
    }
}

impl<H> RequestRegistry<H>
    where H: Handle
{
    /// Create an empty registry.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Identity of a request.
    ///
    /// The wildcards are recorded when the request is first seen;
    /// later lookups of the same request do not change them.
    /// The null request maps to [`INVALID_IDENTITY`].
    ///
    /// [`INVALID_IDENTITY`]: `crate::INVALID_IDENTITY`
    pub fn identity_of(&mut self, handle: &H, wildcards: Wildcards) -> Identity
    {
        self.inner.identity_with(handle, || wildcards)
    }

    /// Identity and wildcards of a request, if it is registered.
    pub fn entry(&self, handle: &H) -> Option<RequestEntry>
    {
        let (identity, &wildcards) = self.inner.get(handle)?;
        Some(RequestEntry{identity, wildcards})
    }

    /// Forget a request, as it completed or was freed.
    pub fn release(&mut self, handle: &H) -> Option<RequestEntry>
    {
        let (identity, wildcards) = self.inner.remove(handle)?;
        Some(RequestEntry{identity, wildcards})
    }

    /// Forget all requests and all identities.
    pub fn cleanup(&mut self)
    {
        self.inner.cleanup();
    }

    /// The number of registered requests.
    pub fn len(&self) -> usize
    {
        self.inner.len()
    }

    /// Whether no request is registered.
    pub fn is_empty(&self) -> bool
    {
        self.inner.is_empty()
    }
}
