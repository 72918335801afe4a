use {crate::Handle, thiserror::Error};

/// Failure reported by the communication runtime.
///
/// The identity layer never retries communication;
/// a failed operation is fatal to the run.
#[derive(Debug, Error, Eq, PartialEq)]
#[error("{operation} failed with error code {code}")]
pub struct TransportError
{
    /// Name of the failed operation.
    pub operation: &'static str,

    /// Error code returned by the runtime.
    pub code: i32,
}

/// Result of a communication operation.
pub type TransportResult<T> = Result<T, TransportError>;

/// Profiling interface of the communication runtime.
///
/// The identity layer calls these operations directly,
/// bypassing any interception of the traced program's own calls.
/// Each method corresponds to one primitive of the runtime
/// and blocks with the runtime's own completion semantics.
/// Ranks are relative to the communicator the operation is given;
/// for inter-communicators, peer ranks index the remote group.
///
/// The associated handle types are the runtime's opaque handles,
/// one per kind of object that receives an identity.
pub trait Transport
{
    /// Communicator handle.
    type Comm: Handle + Eq;

    /// Datatype handle.
    type Datatype: Handle;

    /// Info object handle.
    type Info: Handle;

    /// File handle.
    type File: Handle;

    /// Window handle.
    type Win: Handle;

    /// Group handle.
    type Group: Handle;

    /// Reduction operation handle.
    type Op: Handle;

    /// Matched message handle.
    type Message: Handle;

    /// Request handle.
    type Request: Handle;

    /// The null communicator.
    const COMM_NULL: Self::Comm;

    /// The communicator of all processes.
    const COMM_WORLD: Self::Comm;

    /// The communicator of only the calling process.
    const COMM_SELF: Self::Comm;

    /// Source value accepting messages from any rank.
    const ANY_SOURCE: i32;

    /// Tag value accepting messages with any tag.
    const ANY_TAG: i32;

    /// Rank of the calling process in a communicator.
    ///
    /// For inter-communicators, this is the rank in the local group.
    fn comm_rank(&self, comm: Self::Comm) -> TransportResult<i32>;

    /// Number of processes in a communicator (its local group).
    fn comm_size(&self, comm: Self::Comm) -> TransportResult<i32>;

    /// Whether a communicator is an inter-communicator.
    fn comm_test_inter(&self, comm: Self::Comm) -> TransportResult<bool>;

    /// Merge an inter-communicator into an intra-communicator.
    ///
    /// Collective over both groups.
    fn intercomm_merge(&self, comm: Self::Comm, high: bool)
        -> TransportResult<Self::Comm>;

    /// Free a communicator created by the runtime.
    fn comm_free(&self, comm: Self::Comm) -> TransportResult<()>;

    /// Broadcast bytes from `root` to every member of an intra-communicator.
    fn bcast(&self, buf: &mut [u8], root: i32, comm: Self::Comm)
        -> TransportResult<()>;

    /// Send bytes to a peer.
    fn send(&self, buf: &[u8], dest: i32, tag: i32, comm: Self::Comm)
        -> TransportResult<()>;

    /// Receive exactly `buf.len()` bytes from a peer.
    fn recv(&self, buf: &mut [u8], source: i32, tag: i32, comm: Self::Comm)
        -> TransportResult<()>;

    /// Exchange one integer with a peer.
    fn sendrecv_int(&self, value: i32, peer: i32, tag: i32, comm: Self::Comm)
        -> TransportResult<i32>;

    /// Gather one integer from every member at `root`.
    ///
    /// Returns the integers in rank order at `root`, and nothing elsewhere.
    fn gather_int(&self, value: i32, root: i32, comm: Self::Comm)
        -> TransportResult<Vec<i32>>;

    /// Gather variable-length integer arrays at `root`.
    ///
    /// At `root`, `counts` and `displs` give the length and offset
    /// of each member's contribution in the returned buffer,
    /// which has room for `total` integers.
    /// Other members pass empty slices and get an empty result.
    fn gatherv_int(
        &self,
        send: &[i32],
        counts: &[i32],
        displs: &[i32],
        total: usize,
        root: i32,
        comm: Self::Comm,
    ) -> TransportResult<Vec<i32>>;

    /// Rank of the calling process in [`COMM_WORLD`][`Self::COMM_WORLD`].
    fn world_rank(&self) -> TransportResult<i32>
    {
        self.comm_rank(Self::COMM_WORLD)
    }
}
