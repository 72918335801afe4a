use std::collections::VecDeque;

/// Small integer substituted for a handle in recorded events.
///
/// Real identities are non-negative.
/// They are dense: each kind of object numbers its identities from zero.
pub type Identity = i32;

/// Identity of null handles.
///
/// Never issued for a live object.
pub const INVALID_IDENTITY: Identity = -1;

/// Source of identities for one kind of object.
///
/// Released identities are reissued before new ones are minted,
/// oldest release first.
/// This bounds the issued range to the peak number of live objects,
/// rather than the total number of objects ever created.
#[derive(Debug, Default)]
pub struct IdPool
{
    /// Released identities, in order of release.
    free: VecDeque<Identity>,

    /// The identity to mint when the free list is empty.
    next: Identity,
}

impl IdPool
{
    /// Create a pool that starts minting at zero.
    pub const fn new() -> Self
    {
        Self{free: VecDeque::new(), next: 0}
    }

    /// Take an identity from the free list, or mint a new one.
    pub fn acquire(&mut self) -> Identity
    {
        match self.free.pop_front() {
            Some(id) => id,
            None => {
                let id = self.next;
                self.next += 1;
                id
            },
        }
    }

    /// Return an identity to the free list.
    pub fn release(&mut self, id: Identity)
    {
        debug_assert!((0 .. self.next).contains(&id), "Foreign identity {id}");
        self.free.push_back(id);
    }

    /// Forget all identities, both free and issued.
    ///
    /// The pool starts minting at zero again.
    pub fn clear(&mut self)
    {
        self.free.clear();
        self.next = 0;
    }

    /// The number of identities minted so far.
    pub fn minted(&self) -> usize
    {
        self.next as usize
    }

    /// The number of identities waiting on the free list.
    pub fn free_len(&self) -> usize
    {
        self.free.len()
    }
}
