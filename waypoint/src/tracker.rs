use {
    crate::{Config, IdPool, Identity, range_index::RangeIndex},
    allocator_ext::RawAlloc,
    libc::c_void,
    parking_lot::{Mutex, const_mutex},
    std::sync::atomic::{AtomicBool, AtomicU64, Ordering::{Acquire, Relaxed, Release}},
};

/// Identity shared by all buffers while addresses are not tracked.
pub const PLACEHOLDER_IDENTITY: Identity = 0;

/// Maps buffer addresses to identities by watching the allocator.
///
/// The allocator hooks of an interposition library forward to
/// [`allocate`], [`zeroed_allocate`], [`reallocate`], and [`free`],
/// which call the underlying allocator `A` and record the regions it returns.
/// [`address_to_identity`] then maps any address within a region
/// to the identity of that region.
/// Addresses the allocator never returned, such as stack buffers,
/// are given a one-byte region when first looked up.
///
/// Because the hooks run before anything else in the process,
/// the tracker can be constructed in a `static` and starts out uninstalled.
/// While uninstalled, or while address tracking is disabled,
/// the hooks forward to `A` without recording anything,
/// and every address maps to [`PLACEHOLDER_IDENTITY`].
///
/// All operations may be called from any thread.
///
/// [`allocate`]: `Self::allocate`
/// [`zeroed_allocate`]: `Self::zeroed_allocate`
/// [`reallocate`]: `Self::reallocate`
/// [`free`]: `Self::free`
/// [`address_to_identity`]: `Self::address_to_identity`
pub struct MemoryTracker<A>
{
    /// The underlying allocator.
    alloc: A,

    /// Set between install and uninstall.
    installed: AtomicBool,

    /// Whether addresses are tracked while installed.
    track_addresses: AtomicBool,

    // The index must not allocate through the hooks it serves.
    // In the interposition library, the global allocator
    // bypasses the hooks, so this holds for Rust collections.
    state: Mutex<TrackerState>,

    /// Frees of non-null pointers that matched no region.
    untracked_frees: AtomicU64,
}

struct TrackerState
{
    index: RangeIndex,
    ids: IdPool,
}

impl TrackerState
{
    /// Start tracking a heap-owned region.
    fn track(&mut self, address: usize, size: usize)
    {
        // Regions starting inside the new one were freed behind our back.
        for stale in self.index.insert(address, size, true) {
            if let Some(id) = stale.identity {
                self.ids.release(id);
            }
        }
    }

    /// Track a heap-owned region that was resized in place.
    ///
    /// The region keeps the identity of the region that started there.
    fn resize(&mut self, address: usize, size: usize)
    {
        let kept = self.index.delete(address)
            .and_then(|interval| interval.identity);
        self.track(address, size);
        if let Some(interval) = self.index.search_mut(address) {
            interval.identity = kept;
        }
    }

    /// Stop tracking the region that starts at `address`.
    fn untrack(&mut self, address: usize)
    {
        if let Some(interval) = self.index.delete(address) {
            if let Some(id) = interval.identity {
                self.ids.release(id);
            }
        }
    }
}

impl<A> MemoryTracker<A>
{
    /// Create an uninstalled tracker on top of an allocator.
    pub const fn new(alloc: A) -> Self
    {
        Self{
            alloc,
            installed: AtomicBool::new(false),
            track_addresses: AtomicBool::new(false),
            state: const_mutex(TrackerState{
                index: RangeIndex::new(),
                ids: IdPool::new(),
            }),
            untracked_frees: AtomicU64::new(0),
        }
    }

    /// The underlying allocator.
    pub fn underlying(&self) -> &A
    {
        &self.alloc
    }

    /// Start tracking with empty state.
    ///
    /// Regions allocated before this call are unknown to the tracker.
    /// Freeing them afterwards counts as an [untracked free].
    ///
    /// [untracked free]: `Self::untracked_frees`
    pub fn install(&self, config: &Config)
    {
        {
            let mut state = self.state.lock();
            state.index.drain().for_each(drop);
            state.ids.clear();
        }
        self.untracked_frees.store(0, Relaxed);
        self.track_addresses.store(config.track_addresses, Relaxed);
        self.installed.store(true, Release);
        tracing::debug!(track_addresses = config.track_addresses,
                        "Installed memory tracker");
    }

    /// Stop tracking and drop all state.
    ///
    /// Afterwards the hooks forward to the underlying allocator
    /// and every address maps to [`PLACEHOLDER_IDENTITY`].
    pub fn uninstall(&self)
    {
        self.installed.store(false, Release);

        let regions = {
            let mut state = self.state.lock();
            state.ids.clear();
            state.index.drain().count()
        };

        let untracked_frees = self.untracked_frees.load(Relaxed);
        if untracked_frees != 0 {
            tracing::warn!(untracked_frees,
                           "Untracked pointers were freed; their memory leaked");
        }
        tracing::debug!(regions, "Uninstalled memory tracker");
    }

    /// Whether the tracker is between install and uninstall.
    pub fn is_installed(&self) -> bool
    {
        self.installed.load(Acquire)
    }

    /// Whether allocations are currently being recorded.
    fn is_tracking(&self) -> bool
    {
        self.is_installed() && self.track_addresses.load(Relaxed)
    }

    /// The number of frees of non-null pointers that matched no region.
    ///
    /// The memory of such pointers is not released,
    /// as the tracker cannot tell whether the allocator owns it.
    pub fn untracked_frees(&self) -> u64
    {
        self.untracked_frees.load(Relaxed)
    }

    /// The number of regions currently tracked.
    pub fn tracked_regions(&self) -> usize
    {
        self.state.lock().index.len()
    }

    /// Identity of the region covering `ptr`.
    ///
    /// The region and its identity are created on first use.
    /// The identity stays the same until the region is freed,
    /// after which it is reissued to the next region that needs one.
    pub fn address_to_identity(&self, ptr: *const c_void) -> Identity
    {
        if !self.is_tracking() {
            return PLACEHOLDER_IDENTITY;
        }

        let mut state = self.state.lock();
        let TrackerState{index, ids} = &mut *state;
        let interval = index.search_or_synthesize(ptr as usize);
        *interval.identity.get_or_insert_with(|| ids.acquire())
    }
}

impl<A> MemoryTracker<A>
    where A: RawAlloc
{
    /// Allocate memory and track it.
    ///
    /// The result of the underlying allocator is returned unchanged.
    pub fn allocate(&self, size: usize) -> *mut c_void
    {
        let ptr = self.alloc.malloc(size);
        if !ptr.is_null() && self.is_tracking() {
            self.state.lock().track(ptr as usize, size);
        }
        ptr
    }

    /// Allocate zeroed memory for `nmemb` elements and track it.
    pub fn zeroed_allocate(&self, nmemb: usize, size: usize) -> *mut c_void
    {
        let ptr = self.alloc.calloc(nmemb, size);
        if !ptr.is_null() && self.is_tracking() {
            // The allocator fails on overflow, so this cannot overflow.
            self.state.lock().track(ptr as usize, nmemb.wrapping_mul(size));
        }
        ptr
    }

    /// Resize memory and update its region.
    ///
    /// A region that stays in place keeps its identity.
    /// A region that moves is tracked anew at its new address,
    /// and its old identity is released.
    /// The index stays locked while the underlying allocator runs,
    /// so `A` must not call back into the tracker.
    ///
    /// # Safety
    ///
    /// Same as for [`RawAlloc::realloc`].
    pub unsafe fn reallocate(&self, ptr: *mut c_void, size: usize)
        -> *mut c_void
    {
        if ptr.is_null() {
            return self.allocate(size);
        }

        if !self.is_tracking() {
            return self.alloc.realloc(ptr, size);
        }

        // The allocator may hand out the old block to another thread
        // as soon as it moves, so the index is updated before the lock
        // is released.
        let mut state = self.state.lock();
        let new_ptr = self.alloc.realloc(ptr, size);

        let (old, new) = (ptr as usize, new_ptr as usize);
        if new_ptr.is_null() {
            // Zero-size reallocation frees the block.
            // Otherwise it failed and the block is untouched.
            if size == 0 {
                state.untrack(old);
            }
        } else if new == old {
            state.resize(old, size);
        } else {
            state.untrack(old);
            state.track(new, size);
        }

        new_ptr
    }

    /// Stop tracking memory and free it.
    ///
    /// The memory is only passed to the underlying allocator
    /// if the allocator returned the region and `ptr` is its start.
    /// Freeing a pointer that matches no region does nothing
    /// except count an [untracked free].
    ///
    /// # Safety
    ///
    /// Same as for [`RawAlloc::free`].
    ///
    /// [untracked free]: `Self::untracked_frees`
    pub unsafe fn free(&self, ptr: *mut c_void)
    {
        if !self.is_tracking() {
            self.alloc.free(ptr);
            return;
        }

        let address = ptr as usize;
        let release = {
            let mut state = self.state.lock();
            match state.index.search(address).map(|i| i.address) {
                Some(start) => {
                    let interval = state.index.delete(start);
                    let interval = interval
                        .unwrap_or_else(|| unreachable!("Interval vanished"));
                    if let Some(id) = interval.identity {
                        state.ids.release(id);
                    }
                    interval.heap_owned && interval.address == address
                },
                None => {
                    if !ptr.is_null() {
                        self.untracked_frees.fetch_add(1, Relaxed);
                    }
                    false
                },
            }
        };

        if release {
            self.alloc.free(ptr);
        }
    }
}
