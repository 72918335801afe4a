//! Identities for opaque runtime objects.

use {
    crate::{Handle, HandleKey, IdPool, Identity, INVALID_IDENTITY},
    std::{collections::HashMap, marker::PhantomData},
};

/// Maps handles of one kind of object to identities.
///
/// Handles are looked up by their exact bytes.
/// A handle receives an identity the first time it is looked up,
/// and keeps it until it is released.
/// Released identities are reissued before new ones are minted,
/// so the identities of one kind stay dense.
///
/// Each entry also carries a payload of type `V`,
/// which is fixed when the handle is first looked up.
pub struct ObjectRegistry<H, V = ()>
{
    entries: HashMap<HandleKey, (Identity, V)>,
    ids: IdPool,
    _handle: PhantomData<fn(&H)>,
}

impl<H, V> Default for ObjectRegistry<H, V>
{
    fn default() -> Self
    {
        Self{entries: HashMap::new(), ids: IdPool::new(), _handle: PhantomData}
    }
}

impl<H> ObjectRegistry<H>
    where H: Handle
{
    /// Create an empty registry.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Identity of the object a handle refers to.
    ///
    /// The null handle maps to [`INVALID_IDENTITY`]
    /// without touching the registry.
    pub fn identity_of(&mut self, handle: &H) -> Identity
    {
        self.identity_with(handle, || ())
    }
}

impl<H, V> ObjectRegistry<H, V>
    where H: Handle
{
    /// Identity of the object a handle refers to.
    ///
    /// If the handle is new, `payload` is called to create its payload.
    /// The null handle maps to [`INVALID_IDENTITY`]
    /// without touching the registry.
    pub fn identity_with<F>(&mut self, handle: &H, payload: F) -> Identity
        where F: FnOnce() -> V
    {
        if handle.is_null() {
            return INVALID_IDENTITY;
        }
        let ids = &mut self.ids;
        self.entries.entry(HandleKey::of(handle))
            .or_insert_with(|| (ids.acquire(), payload()))
            .0
    }

    /// Identity of a handle, if it has one.
    pub fn lookup(&self, handle: &H) -> Option<Identity>
    {
        self.get(handle).map(|(id, _)| id)
    }

    /// Identity and payload of a handle, if it has one.
    pub fn get(&self, handle: &H) -> Option<(Identity, &V)>
    {
        if handle.is_null() {
            return None;
        }
        let (id, payload) = self.entries.get(&HandleKey::of(handle))?;
        Some((*id, payload))
    }

    /// Forget a handle, as the object it refers to is being freed.
    ///
    /// Returns the identity it had, which becomes available for reuse.
    pub fn release(&mut self, handle: &H) -> Option<Identity>
    {
        self.remove(handle).map(|(id, _)| id)
    }

    /// Forget a handle, returning its identity and payload.
    pub fn remove(&mut self, handle: &H) -> Option<(Identity, V)>
    {
        if handle.is_null() {
            return None;
        }
        let (id, payload) = self.entries.remove(&HandleKey::of(handle))?;
        self.ids.release(id);
        Some((id, payload))
    }

    /// Forget all handles and all identities.
    pub fn cleanup(&mut self)
    {
        self.entries.clear();
        self.ids.clear();
    }

    /// The number of handles with an identity.
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Whether no handle has an identity.
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        proptest::{collection::vec, proptest},
        std::collections::HashSet,
    };

    crate::int_handle! {
        struct Datatype(u64) null 0;
    }

    #[test]
    fn release_then_reuse()
    {
        let mut registry = ObjectRegistry::new();
        let (a, b, c) = (Datatype(0xA0), Datatype(0xB0), Datatype(0xC0));

        assert_eq!(registry.identity_of(&a), 0);
        assert_eq!(registry.identity_of(&b), 1);
        assert_eq!(registry.identity_of(&a), 0);

        assert_eq!(registry.release(&a), Some(0));
        assert_eq!(registry.identity_of(&c), 0);
        assert_eq!(registry.identity_of(&a), 2);
    }

    #[test]
    fn null_handle_is_invalid()
    {
        let mut registry = ObjectRegistry::new();
        assert_eq!(registry.identity_of(&Datatype(0)), INVALID_IDENTITY);
        assert_eq!(registry.lookup(&Datatype(0)), None);
        assert_eq!(registry.release(&Datatype(0)), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn releasing_unknown_handle_is_harmless()
    {
        let mut registry = ObjectRegistry::new();
        registry.identity_of(&Datatype(1));
        assert_eq!(registry.release(&Datatype(2)), None);
        assert_eq!(registry.identity_of(&Datatype(2)), 1);
    }

    #[test]
    fn payload_is_fixed_at_first_sight()
    {
        let mut registry = ObjectRegistry::<Datatype, &str>::default();
        let a = Datatype(0xA0);

        assert_eq!(registry.identity_with(&a, || "first"), 0);
        assert_eq!(registry.identity_with(&a, || "second"), 0);
        assert_eq!(registry.get(&a), Some((0, &"first")));

        assert_eq!(registry.remove(&a), Some((0, "first")));
        assert_eq!(registry.get(&a), None);
        assert_eq!(registry.identity_with(&a, || "third"), 0);
        assert_eq!(registry.get(&a), Some((0, &"third")));
    }

    #[test]
    fn cleanup_restarts_numbering()
    {
        let mut registry = ObjectRegistry::new();
        registry.identity_of(&Datatype(1));
        registry.identity_of(&Datatype(2));
        registry.release(&Datatype(1));
        registry.cleanup();
        assert!(registry.is_empty());
        assert_eq!(registry.identity_of(&Datatype(2)), 0);
    }

    proptest!
    {
        #[test]
        fn live_identities_are_unique_and_dense(
            ops in vec((1u64 .. 16, proptest::bool::ANY), 0 .. 200),
        )
        {
            let mut registry = ObjectRegistry::new();
            let mut live = HashSet::new();
            let mut peak = 0;

            for (raw, create) in ops {
                let handle = Datatype(raw);
                if create {
                    let id = registry.identity_of(&handle);
                    assert_eq!(registry.lookup(&handle), Some(id));
                    live.insert(raw);
                } else {
                    assert_eq!(registry.release(&handle).is_some(),
                               live.remove(&raw));
                }
                peak = peak.max(live.len());

                let ids: HashSet<_> = live.iter()
                    .map(|&raw| registry.lookup(&Datatype(raw)).unwrap())
                    .collect();
                assert_eq!(ids.len(), live.len());
                assert!(ids.iter().all(|&id| (id as usize) < peak));
            }
        }
    }
}
