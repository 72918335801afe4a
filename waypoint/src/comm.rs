//! Identities for communicators.
//!
//! Unlike other handles, a communicator is shared by all of its members,
//! and events on different processes must name it the same way.
//! A [`CommId`] is built from the handle bytes of one designated member
//! together with that member's rank in the world communicator.
//! No two members of a run hold the same handle at the same rank,
//! so these blobs cannot collide.
//!
//! The members agree on the designated member when the communicator
//! is created, through [`generate_intracomm_id`] or [`generate_intercomm_id`].
//! Both are collective: every member must call them.

use {
    crate::{Error, Handle, HandleKey, Result, Transport},
    scope_exit::guard,
    smallvec::SmallVec,
    std::{cmp::Ordering, collections::HashMap, fmt, mem::size_of},
};

/// Globally unique name of a communicator.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct CommId(SmallVec<[u8; 16]>);

impl CommId
{
    /// The name a member gives a communicator when it is designated.
    pub fn new<C>(comm: &C, world_rank: i32) -> Self
        where C: Handle
    {
        let mut bytes = SmallVec::from_slice(comm.as_bytes());
        bytes.extend_from_slice(&world_rank.to_ne_bytes());
        Self(bytes)
    }

    /// Buffer the size of a communicator name, for receiving one.
    fn zeroed<C>() -> Self
        where C: Handle
    {
        Self(SmallVec::from_elem(0, size_of::<C>() + size_of::<i32>()))
    }

    /// The bytes of the name.
    pub fn as_bytes(&self) -> &[u8]
    {
        &self.0
    }

    fn as_bytes_mut(&mut self) -> &mut [u8]
    {
        &mut self.0
    }

    /// The handle bytes of the designated member.
    pub fn handle_bytes(&self) -> &[u8]
    {
        &self.0[.. self.0.len() - size_of::<i32>()]
    }

    /// The world rank of the designated member.
    pub fn world_rank(&self) -> i32
    {
        let (_, rank) = self.0.split_at(self.0.len() - size_of::<i32>());
        i32::from_ne_bytes([rank[0], rank[1], rank[2], rank[3]])
    }
}

impl fmt::Debug for CommId
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "CommId(")?;
        for byte in self.handle_bytes().iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "@{})", self.world_rank())
    }
}

/// Name of a predefined communicator.
///
/// Predefined handles are the same constant on every process,
/// so their names need no communication.
pub fn get_predefined_comm_id<C>(comm: &C) -> CommId
    where C: Handle
{
    CommId::new(comm, 0)
}

/// Name a communicator after the calling process.
fn mint<T>(transport: &T, comm: &T::Comm) -> Result<CommId>
    where T: Transport
{
    Ok(CommId::new(comm, transport.world_rank()?))
}

/// Agree on the name of a newly created intra-communicator.
///
/// Rank 0 names the communicator and broadcasts the name.
/// If `comm` turns out to be an inter-communicator,
/// both groups are merged for the duration of the call,
/// so that a single member names it for both.
pub fn generate_intracomm_id<T>(transport: &T, comm: T::Comm) -> Result<CommId>
    where T: Transport
{
    if comm.is_null() {
        return Ok(get_predefined_comm_id(&comm));
    }

    if !transport.comm_test_inter(comm)? {
        return name_from_rank_zero(transport, comm, comm);
    }

    let merged = transport.intercomm_merge(comm, false)?;
    let merged = guard(merged, |merged| {
        if let Err(err) = transport.comm_free(merged) {
            tracing::error!(%err, "Cannot free merged communicator");
        }
    });
    name_from_rank_zero(transport, comm, *merged)
}

/// Have rank 0 of `over` name `comm` and broadcast the name over `over`.
fn name_from_rank_zero<T>(transport: &T, comm: T::Comm, over: T::Comm)
    -> Result<CommId>
    where T: Transport
{
    let mut id = if transport.comm_rank(over)? == 0 {
        mint(transport, &comm)?
    } else {
        CommId::zeroed::<T::Comm>()
    };
    transport.bcast(id.as_bytes_mut(), 0, over)?;
    Ok(id)
}

/// Agree on the name of a newly created inter-communicator.
///
/// The leaders of both groups exchange `draw` over `comm` with `tag`.
/// The leader with the smaller draw names the communicator
/// and sends the name to the other leader.
/// Each leader then broadcasts the name over its `local_comm`.
///
/// Equal draws leave the leaders without a namer,
/// and fail with [`Error::TieBreak`].
/// The members of `local_comm` are then still waiting for the broadcast,
/// so the caller must abort the run.
pub fn generate_intercomm_id<T>(
    transport: &T,
    local_comm: T::Comm,
    comm: T::Comm,
    tag: i32,
    draw: i32,
) -> Result<CommId>
    where T: Transport
{
    if comm.is_null() {
        return Ok(get_predefined_comm_id(&comm));
    }

    let mut id = CommId::zeroed::<T::Comm>();
    if transport.comm_rank(comm)? == 0 {
        let theirs = transport.sendrecv_int(draw, 0, tag, comm)?;
        match draw.cmp(&theirs) {
            Ordering::Less => {
                id = mint(transport, &comm)?;
                transport.send(id.as_bytes(), 0, tag, comm)?;
            },
            Ordering::Greater =>
                transport.recv(id.as_bytes_mut(), 0, tag, comm)?,
            Ordering::Equal =>
                return Err(Error::TieBreak(draw)),
        }
    }
    transport.bcast(id.as_bytes_mut(), 0, local_comm)?;
    Ok(id)
}

/// Names of the communicators of this process.
///
/// Predefined communicators are never entered.
pub struct CommTable<T>
    where T: Transport
{
    entries: HashMap<HandleKey, CommId>,
    predefined: [(T::Comm, CommId); 3],
}

impl<T> Default for CommTable<T>
    where T: Transport
{
    fn default() -> Self
    {
        let predefined = [T::COMM_NULL, T::COMM_WORLD, T::COMM_SELF]
            .map(|comm| (comm, get_predefined_comm_id(&comm)));
        Self{entries: HashMap::new(), predefined}
    }
}

impl<T> CommTable<T>
    where T: Transport
{
    /// Create a table without entries.
    pub fn new() -> Self
    {
        Self::default()
    }

    fn predefined(&self, comm: &T::Comm) -> Option<&CommId>
    {
        self.predefined.iter()
            .find(|(predefined, _)| predefined == comm)
            .map(|(_, id)| id)
    }

    /// Name of a communicator.
    ///
    /// Every communicator other than the predefined ones
    /// must have been entered when it was created.
    /// If it was not, the processes no longer agree on its name:
    /// this is logged, and a name only this process uses is returned.
    pub fn identity_of(&self, transport: &T, comm: &T::Comm) -> Result<CommId>
    {
        if let Some(id) = self.predefined(comm) {
            return Ok(id.clone());
        }
        let key = HandleKey::of(comm);
        match self.entries.get(&key) {
            Some(id) => Ok(id.clone()),
            None => {
                tracing::error!(handle = ?key,
                                "Communicator was never named; \
                                 naming it after this process only");
                mint(transport, comm)
            },
        }
    }

    /// Record the name agreed on for a new communicator.
    ///
    /// Predefined communicators are not recorded.
    pub fn insert(&mut self, comm: &T::Comm, id: CommId)
    {
        if self.predefined(comm).is_none() {
            self.entries.insert(HandleKey::of(comm), id);
        }
    }

    /// Forget a communicator, as it is being freed.
    pub fn release(&mut self, comm: &T::Comm) -> Option<CommId>
    {
        if self.predefined(comm).is_some() {
            return None;
        }
        self.entries.remove(&HandleKey::of(comm))
    }

    /// Forget all communicators.
    pub fn cleanup(&mut self)
    {
        self.entries.clear();
    }

    /// The number of recorded communicators.
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Whether no communicator is recorded.
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}
