//! In-process transport for testing, with one thread per rank.
//!
//! Every rank owns a [`Loopback`] that shares a [`Fabric`] with the others.
//! Messages are queued in mailboxes keyed by communicator context,
//! sender, receiver, and tag, so they are matched in order per pair,
//! the way the real runtime matches them.
//! Collectives are built from point-to-point messages on reserved tags.
//!
//! Communicator handles are numbered per rank starting from the same value,
//! so equal handle bytes on different ranks are the rule, not the exception.

use {
    crate::{Transport, TransportError, TransportResult},
    parking_lot::{Condvar, Mutex},
    std::{
        collections::{HashMap, VecDeque},
        mem::size_of,
        panic::resume_unwind,
        sync::{Arc, atomic::{AtomicU64, Ordering::SeqCst}},
        thread,
        time::Duration,
    },
};

crate::int_handle! {
    /// Communicator handle.
    pub struct Comm(u64) null 0;
    /// Datatype handle.
    pub struct Datatype(u64) null 0;
    /// Info object handle.
    pub struct Info(u64) null 0;
    /// File handle.
    pub struct File(u64) null 0;
    /// Window handle.
    pub struct Win(u64) null 0;
    /// Group handle.
    pub struct Group(u64) null 0;
    /// Reduction operation handle.
    pub struct Op(u64) null 0;
    /// Matched message handle.
    pub struct Message(u64) null 0;
    /// Request handle.
    pub struct Request(u64) null 0;
}

pub const COMM_NULL:  Comm = Comm(0);
pub const COMM_WORLD: Comm = Comm(1);
pub const COMM_SELF:  Comm = Comm(2);

/// Handle of the first communicator created on each rank.
pub const FIRST_HANDLE: u64 = 0x1000;

// Tags reserved for collectives.
const BCAST_TAG:   i32 = -100;
const GATHER_TAG:  i32 = -101;
const GATHERV_TAG: i32 = -102;

/// How long a receive waits before reporting a hang.
const RECV_TIMEOUT: Duration = Duration::from_secs(20);

// Error codes, after the runtime's classes.
const ERR_COMM:      i32 = 5;
const ERR_TRUNCATE:  i32 = 15;
const ERR_TIMEOUT:   i32 = 99;

#[derive(Clone, Debug)]
struct CommInfo
{
    context: u64,

    /// World ranks of the local group, in rank order.
    local: Vec<usize>,

    /// World ranks of the remote group, for inter-communicators.
    remote: Option<Vec<usize>>,
}

impl CommInfo
{
    /// World ranks that point-to-point ranks refer to.
    fn peers(&self) -> &[usize]
    {
        self.remote.as_deref().unwrap_or(&self.local)
    }
}

#[derive(Clone, Eq, Hash, PartialEq)]
struct Envelope
{
    context: u64,
    source: usize,
    dest: usize,
    tag: i32,
}

/// Identifies one communicator creation, identically on every member.
type CreationKey = (u64, Vec<Vec<usize>>);

/// State shared by all ranks.
pub struct Fabric
{
    size: usize,
    mailboxes: Mutex<HashMap<Envelope, VecDeque<Vec<u8>>>>,
    arrived: Condvar,
    contexts: Mutex<HashMap<(CreationKey, u32), u64>>,
    next_context: AtomicU64,
}

/// One rank's view of the fabric.
pub struct Loopback
{
    fabric: Arc<Fabric>,
    rank: usize,
    comms: Mutex<HashMap<u64, CommInfo>>,
    next_handle: AtomicU64,
    creations: Mutex<HashMap<CreationKey, u32>>,
}

/// Run `f` on `size` ranks, each on its own thread.
///
/// Returns the results in rank order.
pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where F: Fn(Loopback) -> R + Sync, R: Send
{
    let fabric = Arc::new(Fabric{
        size,
        mailboxes: Mutex::new(HashMap::new()),
        arrived: Condvar::new(),
        contexts: Mutex::new(HashMap::new()),
        next_context: AtomicU64::new(1),
    });

    thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = (0 .. size)
            .map(|rank| {
                let loopback = Loopback::new(fabric.clone(), rank);
                s.spawn(move || f(loopback))
            })
            .collect();
        handles.into_iter()
            .map(|h| h.join().unwrap_or_else(|payload| resume_unwind(payload)))
            .collect()
    })
}

impl Loopback
{
    fn new(fabric: Arc<Fabric>, rank: usize) -> Self
    {
        let world = CommInfo{
            context: 0,
            local: (0 .. fabric.size).collect(),
            remote: None,
        };
        let own = CommInfo{
            context: u64::MAX - rank as u64,
            local: vec![rank],
            remote: None,
        };
        let comms = [(COMM_WORLD.0, world), (COMM_SELF.0, own)];
        Self{
            fabric,
            rank,
            comms: Mutex::new(comms.into_iter().collect()),
            next_handle: AtomicU64::new(FIRST_HANDLE),
            creations: Mutex::new(HashMap::new()),
        }
    }

    /// World rank of this process.
    pub fn rank(&self) -> usize
    {
        self.rank
    }

    /// Create an intra-communicator of the given world ranks.
    ///
    /// Every member must call this; others get the null communicator.
    pub fn comm_create(&self, parent: Comm, members: &[usize]) -> Comm
    {
        if !members.contains(&self.rank) {
            return COMM_NULL;
        }
        let parent = self.info(parent).expect("Invalid parent communicator");
        let context = self.context_for(parent.context, vec![members.to_vec()]);
        self.register(CommInfo{context, local: members.to_vec(), remote: None})
    }

    /// Create an inter-communicator between two disjoint groups.
    ///
    /// Every member of both groups must call this,
    /// passing its own group first.
    pub fn intercomm_create(&self, parent: Comm, local: &[usize], remote: &[usize])
        -> Comm
    {
        let parent = self.info(parent).expect("Invalid parent communicator");
        let mut groups = vec![local.to_vec(), remote.to_vec()];
        groups.sort();
        let context = self.context_for(parent.context, groups);
        self.register(CommInfo{
            context,
            local: local.to_vec(),
            remote: Some(remote.to_vec()),
        })
    }

    /// Whether a handle refers to a live communicator on this rank.
    pub fn is_live(&self, comm: Comm) -> bool
    {
        self.comms.lock().contains_key(&comm.0)
    }

    /// Allocate a context that all members of a creation agree on.
    fn context_for(&self, parent: u64, groups: Vec<Vec<usize>>) -> u64
    {
        let key = (parent, groups);
        let seq = {
            let mut creations = self.creations.lock();
            let seq = creations.entry(key.clone()).or_insert(0);
            *seq += 1;
            *seq
        };
        let mut contexts = self.fabric.contexts.lock();
        *contexts.entry((key, seq))
            .or_insert_with(|| self.fabric.next_context.fetch_add(1, SeqCst))
    }

    fn register(&self, info: CommInfo) -> Comm
    {
        let handle = self.next_handle.fetch_add(0x10, SeqCst);
        self.comms.lock().insert(handle, info);
        Comm(handle)
    }

    fn info(&self, comm: Comm) -> TransportResult<CommInfo>
    {
        self.comms.lock().get(&comm.0).cloned()
            .ok_or(TransportError{operation: "comm lookup", code: ERR_COMM})
    }

    fn intra_info(&self, comm: Comm, operation: &'static str)
        -> TransportResult<CommInfo>
    {
        let info = self.info(comm)?;
        if info.remote.is_some() {
            return Err(TransportError{operation, code: ERR_COMM});
        }
        Ok(info)
    }

    fn local_rank(&self, info: &CommInfo) -> usize
    {
        info.local.iter().position(|&r| r == self.rank)
            .expect("Process is not a member of its own communicator")
    }

    fn post(&self, context: u64, dest: usize, tag: i32, data: Vec<u8>)
    {
        let envelope = Envelope{context, source: self.rank, dest, tag};
        let mut mailboxes = self.fabric.mailboxes.lock();
        mailboxes.entry(envelope).or_default().push_back(data);
        self.fabric.arrived.notify_all();
    }

    fn take(&self, context: u64, source: usize, tag: i32)
        -> TransportResult<Vec<u8>>
    {
        let envelope = Envelope{context, source, dest: self.rank, tag};
        let mut mailboxes = self.fabric.mailboxes.lock();
        loop {
            if let Some(data) = mailboxes.get_mut(&envelope)
                .and_then(VecDeque::pop_front)
            {
                return Ok(data);
            }
            let timeout = self.fabric.arrived.wait_for(&mut mailboxes, RECV_TIMEOUT);
            if timeout.timed_out() {
                return Err(TransportError{operation: "recv", code: ERR_TIMEOUT});
            }
        }
    }
}

fn ints_to_bytes(ints: &[i32]) -> Vec<u8>
{
    ints.iter().flat_map(|i| i.to_ne_bytes()).collect()
}

fn bytes_to_ints(bytes: &[u8]) -> Vec<i32>
{
    bytes.chunks_exact(size_of::<i32>())
        .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn copy_exact(buf: &mut [u8], data: &[u8], operation: &'static str)
    -> TransportResult<()>
{
    if buf.len() != data.len() {
        return Err(TransportError{operation, code: ERR_TRUNCATE});
    }
    buf.copy_from_slice(data);
    Ok(())
}

impl Transport for Loopback
{
    type Comm     = Comm;
    type Datatype = Datatype;
    type Info     = Info;
    type File     = File;
    type Win      = Win;
    type Group    = Group;
    type Op       = Op;
    type Message  = Message;
    type Request  = Request;

    const COMM_NULL:  Comm = COMM_NULL;
    const COMM_WORLD: Comm = COMM_WORLD;
    const COMM_SELF:  Comm = COMM_SELF;
    const ANY_SOURCE: i32  = -2;
    const ANY_TAG:    i32  = -1;

    fn comm_rank(&self, comm: Comm) -> TransportResult<i32>
    {
        let info = self.info(comm)?;
        Ok(self.local_rank(&info) as i32)
    }

    fn comm_size(&self, comm: Comm) -> TransportResult<i32>
    {
        Ok(self.info(comm)?.local.len() as i32)
    }

    fn comm_test_inter(&self, comm: Comm) -> TransportResult<bool>
    {
        Ok(self.info(comm)?.remote.is_some())
    }

    fn intercomm_merge(&self, comm: Comm, _high: bool) -> TransportResult<Comm>
    {
        let info = self.info(comm)?;
        let remote = info.remote.clone()
            .ok_or(TransportError{operation: "intercomm merge", code: ERR_COMM})?;

        // The group holding the lowest world rank goes first on both sides.
        let (first, second) = if info.local[0] < remote[0] {
            (info.local, remote)
        } else {
            (remote, info.local)
        };
        let members: Vec<_> = first.into_iter().chain(second).collect();

        let context = self.context_for(info.context, vec![members.clone()]);
        Ok(self.register(CommInfo{context, local: members, remote: None}))
    }

    fn comm_free(&self, comm: Comm) -> TransportResult<()>
    {
        if [COMM_NULL, COMM_WORLD, COMM_SELF].contains(&comm) {
            return Err(TransportError{operation: "comm free", code: ERR_COMM});
        }
        self.comms.lock().remove(&comm.0)
            .map(drop)
            .ok_or(TransportError{operation: "comm free", code: ERR_COMM})
    }

    fn bcast(&self, buf: &mut [u8], root: i32, comm: Comm) -> TransportResult<()>
    {
        let info = self.intra_info(comm, "bcast")?;
        let root = root as usize;
        if self.local_rank(&info) == root {
            for (i, &member) in info.local.iter().enumerate() {
                if i != root {
                    self.post(info.context, member, BCAST_TAG, buf.to_vec());
                }
            }
            Ok(())
        } else {
            let data = self.take(info.context, info.local[root], BCAST_TAG)?;
            copy_exact(buf, &data, "bcast")
        }
    }

    fn send(&self, buf: &[u8], dest: i32, tag: i32, comm: Comm)
        -> TransportResult<()>
    {
        let info = self.info(comm)?;
        let dest = info.peers()[dest as usize];
        self.post(info.context, dest, tag, buf.to_vec());
        Ok(())
    }

    fn recv(&self, buf: &mut [u8], source: i32, tag: i32, comm: Comm)
        -> TransportResult<()>
    {
        let info = self.info(comm)?;
        let source = info.peers()[source as usize];
        let data = self.take(info.context, source, tag)?;
        copy_exact(buf, &data, "recv")
    }

    fn sendrecv_int(&self, value: i32, peer: i32, tag: i32, comm: Comm)
        -> TransportResult<i32>
    {
        self.send(&value.to_ne_bytes(), peer, tag, comm)?;
        let mut buf = [0; size_of::<i32>()];
        self.recv(&mut buf, peer, tag, comm)?;
        Ok(i32::from_ne_bytes(buf))
    }

    fn gather_int(&self, value: i32, root: i32, comm: Comm)
        -> TransportResult<Vec<i32>>
    {
        let info = self.intra_info(comm, "gather")?;
        let root = root as usize;
        if self.local_rank(&info) != root {
            self.post(info.context, info.local[root], GATHER_TAG,
                      value.to_ne_bytes().to_vec());
            return Ok(Vec::new());
        }

        let mut values = Vec::with_capacity(info.local.len());
        for (i, &member) in info.local.iter().enumerate() {
            if i == root {
                values.push(value);
            } else {
                let data = self.take(info.context, member, GATHER_TAG)?;
                values.extend(bytes_to_ints(&data));
            }
        }
        Ok(values)
    }

    fn gatherv_int(
        &self,
        send: &[i32],
        counts: &[i32],
        displs: &[i32],
        total: usize,
        root: i32,
        comm: Comm,
    ) -> TransportResult<Vec<i32>>
    {
        let info = self.intra_info(comm, "gatherv")?;
        let root = root as usize;
        if self.local_rank(&info) != root {
            self.post(info.context, info.local[root], GATHERV_TAG,
                      ints_to_bytes(send));
            return Ok(Vec::new());
        }

        let mut buf = vec![0; total];
        for (i, &member) in info.local.iter().enumerate() {
            let data = if i == root {
                send.to_vec()
            } else {
                bytes_to_ints(&self.take(info.context, member, GATHERV_TAG)?)
            };
            let (count, displ) = (counts[i] as usize, displs[i] as usize);
            if data.len() != count || displ + count > total {
                return Err(TransportError{operation: "gatherv", code: ERR_TRUNCATE});
            }
            buf[displ .. displ + count].copy_from_slice(&data);
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn collectives_reach_every_rank()
    {
        let results = run(4, |t| {
            let mut buf = [0u8; 3];
            if t.rank() == 2 {
                buf = [1, 2, 3];
            }
            t.bcast(&mut buf, 2, COMM_WORLD).unwrap();
            let gathered = t.gather_int(t.rank() as i32 * 10, 0, COMM_WORLD).unwrap();
            (buf, gathered)
        });

        for (rank, (buf, gathered)) in results.into_iter().enumerate() {
            assert_eq!(buf, [1, 2, 3]);
            if rank == 0 {
                assert_eq!(gathered, [0, 10, 20, 30]);
            } else {
                assert!(gathered.is_empty());
            }
        }
    }

    #[test]
    fn intercomm_peers_are_remote_group()
    {
        let results = run(4, |t| {
            let (local, remote): (&[usize], &[usize]) = if t.rank() < 2 {
                (&[0, 1], &[2, 3])
            } else {
                (&[2, 3], &[0, 1])
            };
            let inter = t.intercomm_create(COMM_WORLD, local, remote);
            let rank = t.comm_rank(inter).unwrap();
            let other = t.sendrecv_int(t.rank() as i32, rank, 7, inter).unwrap();

            let merged = t.intercomm_merge(inter, false).unwrap();
            let merged_rank = t.comm_rank(merged).unwrap();
            t.comm_free(merged).unwrap();
            (other, merged_rank, t.is_live(merged))
        });

        let others: Vec<_> = results.iter().map(|r| r.0).collect();
        assert_eq!(others, [2, 3, 0, 1]);
        let merged: Vec<_> = results.iter().map(|r| r.1).collect();
        assert_eq!(merged, [0, 1, 2, 3]);
        assert!(results.iter().all(|r| !r.2));
    }
}
