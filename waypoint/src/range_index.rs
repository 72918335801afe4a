//! Ordered index over address intervals.
//!
//! The index maps any address inside a tracked region to that region,
//! not only the address the region starts at.
//! Regions are keyed by their start address;
//! at most one region starts at any given address.
//! A new region evicts every region that starts inside it,
//! as the allocator never hands out memory that overlaps live allocations.
//! Looking up an address covered by several regions
//! finds the one that starts closest below it.

use {crate::Identity, smallvec::SmallVec, std::collections::BTreeMap};

/// Tracked region of memory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Interval
{
    /// First address of the region.
    pub address: usize,

    /// Number of bytes in the region.
    ///
    /// A region of zero bytes still covers its start address,
    /// because `malloc(0)` returns a unique pointer that is later freed.
    pub size: usize,

    /// Whether the region came from the tracked allocator.
    ///
    /// Regions synthesized for addresses the allocator never returned,
    /// such as stack buffers, are never passed to the allocator's free.
    pub heap_owned: bool,

    /// Identity of the region, assigned on first lookup.
    pub identity: Option<Identity>,
}

impl Interval
{
    /// Whether the region covers `address`.
    pub fn contains(&self, address: usize) -> bool
    {
        address.wrapping_sub(self.address) < self.size.max(1)
    }
}

/// Ordered index over address intervals.
#[derive(Debug, Default)]
pub struct RangeIndex
{
    intervals: BTreeMap<usize, Interval>,
}

impl RangeIndex
{
    /// Create an empty index.
    pub const fn new() -> Self
    {
        Self{intervals: BTreeMap::new()}
    }

    /// Add a region to the index.
    ///
    /// Regions starting inside the new one, including one
    /// starting at `address`, are removed and returned.
    pub fn insert(&mut self, address: usize, size: usize, heap_owned: bool)
        -> SmallVec<[Interval; 1]>
    {
        let end = address.saturating_add(size.max(1));
        let covered: SmallVec<[usize; 4]> =
            self.intervals.range(address .. end)
                .map(|(&start, _)| start)
                .collect();

        let evicted = covered.into_iter()
            .filter_map(|start| self.intervals.remove(&start))
            .collect();

        let interval = Interval{address, size, heap_owned, identity: None};
        self.intervals.insert(address, interval);
        evicted
    }

    /// Find the region that covers `address`.
    pub fn search(&self, address: usize) -> Option<&Interval>
    {
        self.intervals.range(..= address)
            .next_back()
            .map(|(_, interval)| interval)
            .filter(|interval| interval.contains(address))
    }

    /// Find the region that covers `address`, for modification.
    pub fn search_mut(&mut self, address: usize) -> Option<&mut Interval>
    {
        self.intervals.range_mut(..= address)
            .next_back()
            .map(|(_, interval)| interval)
            .filter(|interval| interval.contains(address))
    }

    /// Find the region that covers `address`,
    /// or insert a one-byte region that is not heap-owned.
    pub fn search_or_synthesize(&mut self, address: usize) -> &mut Interval
    {
        let start = match self.search(address) {
            Some(interval) => interval.address,
            None => {
                self.insert(address, 1, false);
                address
            },
        };
        self.intervals.get_mut(&start)
            .unwrap_or_else(|| unreachable!("Interval vanished from index"))
    }

    /// Remove the region starting exactly at `address`.
    ///
    /// The memory of the region itself is not touched.
    pub fn delete(&mut self, address: usize) -> Option<Interval>
    {
        self.intervals.remove(&address)
    }

    /// The number of regions in the index.
    pub fn len(&self) -> usize
    {
        self.intervals.len()
    }

    /// Whether the index has no regions.
    pub fn is_empty(&self) -> bool
    {
        self.intervals.is_empty()
    }

    /// Remove all regions, yielding them in address order.
    pub fn drain(&mut self) -> impl Iterator<Item=Interval>
    {
        std::mem::take(&mut self.intervals).into_values()
    }
}
