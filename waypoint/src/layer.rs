use {
    crate::{
        Config,
        Identity,
        MemoryTracker,
        Result,
        Transport,
        comm::{self, CommId, CommTable},
        grammar::{self, Rule, SymbolConvention},
        registry::ObjectRegistry,
        request::{RequestEntry, RequestRegistry, Wildcards},
    },
    allocator_ext::Libc,
    libc::c_void,
    parking_lot::Mutex,
};

/// Identities of all handles a traced process uses.
///
/// The wrappers of the intercepted calls own one of these,
/// and ask it for the identity of every handle they record.
/// Each kind of object has its own registry behind its own lock,
/// so the layer may be shared between threads.
/// Communicator naming and trace collection are collective;
/// they must be called by every member in the same order,
/// as the intercepted calls themselves are.
pub struct IdentityLayer<'a, T, A = Libc>
    where T: Transport
{
    transport: T,
    tracker: &'a MemoryTracker<A>,
    config: Config,
    objects: Objects<T>,
    requests: Mutex<RequestRegistry<T::Request>>,
    comms: Mutex<CommTable<T>>,
}

// Registries of objects named by plain handles, and their accessors.
macro_rules! object_kinds
{
    { $(
        $field:ident : $handle:ident, $what:literal,
            $identity_of:ident, $release:ident, $cleanup:ident;
    )* } => {
        struct Objects<T>
            where T: Transport
        {
            $( $field: Mutex<ObjectRegistry<T::$handle>>, )*
        }

        impl<T> Objects<T>
            where T: Transport
        {
            fn new() -> Self
            {
                Self{ $( $field: Mutex::new(ObjectRegistry::new()), )* }
            }

            fn cleanup(&self)
            {
                $( self.$field.lock().cleanup(); )*
            }
        }

        impl<'a, T, A> IdentityLayer<'a, T, A>
            where T: Transport
        {
            $(
                #[doc = concat!("Identity of a ", $what, " handle.")]
                pub fn $identity_of(&self, handle: &T::$handle) -> Identity
                {
                    self.objects.$field.lock().identity_of(handle)
                }

                #[doc = concat!("Forget a ", $what, " handle, as it is being freed.")]
                pub fn $release(&self, handle: &T::$handle) -> Option<Identity>
                {
                    self.objects.$field.lock().release(handle)
                }

                #[doc = concat!("Forget all ", $what, " handles.")]
                pub fn $cleanup(&self)
                {
                    self.objects.$field.lock().cleanup();
                }
            )*
        }
    };
}

object_kinds! {
    datatypes: Datatype, "datatype",
        identity_of_datatype, release_datatype, cleanup_datatypes;
    infos: Info, "info object",
        identity_of_info, release_info, cleanup_infos;
    files: File, "file",
        identity_of_file, release_file, cleanup_files;
    wins: Win, "window",
        identity_of_win, release_win, cleanup_wins;
    groups: Group, "group",
        identity_of_group, release_group, cleanup_groups;
    ops: Op, "reduction operation",
        identity_of_op, release_op, cleanup_ops;
    messages: Message, "matched message",
        identity_of_message, release_message, cleanup_messages;
}

impl<'a, T, A> IdentityLayer<'a, T, A>
    where T: Transport
{
    /// Create a layer with empty registries.
    ///
    /// Buffer identities come from `tracker`,
    /// which is usually the one the allocator hooks feed.
    pub fn new(transport: T, tracker: &'a MemoryTracker<A>, config: Config)
        -> Self
    {
        Self{
            transport,
            tracker,
            config,
            objects: Objects::new(),
            requests: Mutex::new(RequestRegistry::new()),
            comms: Mutex::new(CommTable::new()),
        }
    }

    /// The transport the layer communicates through.
    pub fn transport(&self) -> &T
    {
        &self.transport
    }

    /// The configuration the layer was created with.
    pub fn config(&self) -> &Config
    {
        &self.config
    }

    /// Reset all state and start tracking buffers.
    pub fn install(&self)
    {
        self.cleanup_all();
        self.tracker.install(&self.config);
    }

    /// Stop tracking buffers and drop all state.
    pub fn uninstall(&self)
    {
        self.tracker.uninstall();
        self.cleanup_all();
    }

    fn cleanup_all(&self)
    {
        self.objects.cleanup();
        self.cleanup_requests();
        self.cleanup_communicators();
    }

    /// Identity of the buffer `ptr` points into.
    pub fn identity_of_buffer(&self, ptr: *const c_void) -> Identity
    {
        self.tracker.address_to_identity(ptr)
    }

    /// Identity of a request posted with the given source and tag.
    ///
    /// Whether the source and tag are wildcards is remembered
    /// from the first time the request is seen.
    pub fn identity_of_request(&self, handle: &T::Request, source: i32, tag: i32)
        -> Identity
    {
        let wildcards = Wildcards::of(source, tag, T::ANY_SOURCE, T::ANY_TAG);
        self.requests.lock().identity_of(handle, wildcards)
    }

    /// Identity and posting wildcards of a registered request.
    pub fn request_entry(&self, handle: &T::Request) -> Option<RequestEntry>
    {
        self.requests.lock().entry(handle)
    }

    /// Posting wildcards of a registered request.
    pub fn request_flags(&self, handle: &T::Request) -> Option<Wildcards>
    {
        self.request_entry(handle).map(|e| e.wildcards)
    }

    /// Forget a request, as it completed or was freed.
    pub fn release_request(&self, handle: &T::Request) -> Option<RequestEntry>
    {
        self.requests.lock().release(handle)
    }

    /// Forget all requests.
    pub fn cleanup_requests(&self)
    {
        self.requests.lock().cleanup();
    }

    /// Name of a communicator.
    ///
    /// See [`CommTable::identity_of`].
    pub fn identity_of_communicator(&self, comm: &T::Comm) -> Result<CommId>
    {
        self.comms.lock().identity_of(&self.transport, comm)
    }

    /// Agree on and record the name of a new intra-communicator.
    ///
    /// Collective over `comm`.
    pub fn new_intracomm_identity(&self, comm: T::Comm) -> Result<CommId>
    {
        // The table is not locked while waiting for the other members.
        let id = comm::generate_intracomm_id(&self.transport, comm)?;
        self.comms.lock().insert(&comm, id.clone());
        Ok(id)
    }

    /// Agree on and record the name of a new inter-communicator.
    ///
    /// Collective over `comm`.
    /// `local_comm` is the communicator of the local group
    /// the inter-communicator was created from,
    /// and `tag` must not be in use between the group leaders.
    pub fn new_intercomm_identity(&self, local_comm: T::Comm, comm: T::Comm, tag: i32)
        -> Result<CommId>
    {
        let draw = rand::random();
        let id = comm::generate_intercomm_id(
            &self.transport, local_comm, comm, tag, draw)?;
        self.comms.lock().insert(&comm, id.clone());
        Ok(id)
    }

    /// Forget a communicator, as it is being freed.
    pub fn release_communicator(&self, comm: &T::Comm) -> Option<CommId>
    {
        self.comms.lock().release(comm)
    }

    /// Forget all communicators.
    pub fn cleanup_communicators(&self)
    {
        self.comms.lock().cleanup();
    }

    /// Flatten the local grammar and collect all grammars
    /// into the configured trace file.
    ///
    /// Collective over the world communicator.
    /// See [`grammar::dump`].
    pub fn dump_grammar<C>(
        &self,
        rules:      &[Rule],
        remap:      Option<&[i32]>,
        convention: &C,
    ) -> Result<Option<Vec<i32>>>
        where C: SymbolConvention + ?Sized
    {
        grammar::dump(&self.transport, &self.config.trace_path,
                      rules, remap, convention)
    }
}
