//! Saved controller context
//!
//! A [`SavedContext`] is the handle a core gets back from `suspend` and must
//! hand to `resume`. It carries the core's redistributor snapshot and, when
//! the core was the last one out of the cluster, the distributor snapshot.
//!
//! Handles are stamped with the epoch of the save that produced them. The
//! lifecycle only accepts the handle from the latest save of a core, so a
//! stale or fabricated handle is rejected rather than replayed.

use core::fmt;

use heapless::Vec;

use crate::irq::{CoreIndex, MAX_CORES};
use crate::{Error, Result};

/// Distributor snapshot taken by the last core out of the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot<D> {
    epoch: u32,
    state: D,
}

impl<D> ClusterSnapshot<D> {
    pub(crate) fn new(epoch: u32, state: D) -> Self {
        Self { epoch, state }
    }

    /// Epoch of the save that produced this snapshot
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Driver-defined distributor state
    pub fn state(&self) -> &D {
        &self.state
    }
}

/// Per-core context returned by `suspend`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedContext<D, R> {
    core: CoreIndex,
    epoch: u32,
    redistributor: R,
    cluster: Option<ClusterSnapshot<D>>,
}

impl<D, R> SavedContext<D, R> {
    pub(crate) fn new(
        core: CoreIndex,
        epoch: u32,
        redistributor: R,
        cluster: Option<ClusterSnapshot<D>>,
    ) -> Self {
        Self {
            core,
            epoch,
            redistributor,
            cluster,
        }
    }

    /// Core the context was saved on
    pub fn core(&self) -> CoreIndex {
        self.core
    }

    /// Save epoch
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Driver-defined redistributor state
    pub fn redistributor(&self) -> &R {
        &self.redistributor
    }

    /// Distributor snapshot, present on the last core out
    pub fn cluster(&self) -> Option<&ClusterSnapshot<D>> {
        self.cluster.as_ref()
    }

    /// Check whether this handle carries the distributor snapshot
    pub fn has_cluster(&self) -> bool {
        self.cluster.is_some()
    }

    /// Detach the distributor snapshot
    ///
    /// The coordinator uses this together with [`attach_cluster`] when the
    /// first core back in is not the one that went out last.
    ///
    /// [`attach_cluster`]: SavedContext::attach_cluster
    pub fn take_cluster(&mut self) -> Option<ClusterSnapshot<D>> {
        self.cluster.take()
    }

    /// Attach a distributor snapshot, returning the one it replaces
    pub fn attach_cluster(&mut self, cluster: ClusterSnapshot<D>) -> Option<ClusterSnapshot<D>> {
        self.cluster.replace(cluster)
    }
}

/// Set of logical cores, backed by a bitmask
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreSet(u64);

impl CoreSet {
    /// Empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Cores `0..count`
    pub fn all(count: usize) -> Self {
        match count {
            0 => Self(0),
            n if n >= MAX_CORES => Self(u64::MAX),
            n => Self((1u64 << n) - 1),
        }
    }

    /// Builder form of [`insert`](CoreSet::insert)
    pub fn with(mut self, core: CoreIndex) -> Self {
        self.insert(core);
        self
    }

    /// Add a core; indices beyond `MAX_CORES` are ignored
    pub fn insert(&mut self, core: CoreIndex) {
        if core.get() < MAX_CORES {
            self.0 |= 1 << core.get();
        }
    }

    /// Remove a core
    pub fn remove(&mut self, core: CoreIndex) {
        if core.get() < MAX_CORES {
            self.0 &= !(1 << core.get());
        }
    }

    /// Check membership
    pub fn contains(&self, core: CoreIndex) -> bool {
        core.get() < MAX_CORES && self.0 & (1 << core.get()) != 0
    }

    /// Number of cores in the set
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = CoreIndex> + '_ {
        let mask = self.0;
        (0..MAX_CORES)
            .filter(move |i| mask & (1 << i) != 0)
            .map(CoreIndex::new)
    }
}

impl fmt::Debug for CoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(CoreIndex::get)).finish()
    }
}

impl FromIterator<CoreIndex> for CoreSet {
    fn from_iter<I: IntoIterator<Item = CoreIndex>>(iter: I) -> Self {
        let mut set = Self::empty();
        for core in iter {
            set.insert(core);
        }
        set
    }
}

/// Contexts of every core taken down by one cluster suspend
///
/// Holds one slot per configured core plus the distributor snapshot. Only
/// the lifecycle fills or drains it.
#[derive(Debug)]
pub struct ContextStore<D, R> {
    cluster: Option<ClusterSnapshot<D>>,
    slots: Vec<Option<SavedContext<D, R>>, MAX_CORES>,
}

impl<D, R> ContextStore<D, R> {
    pub(crate) fn new(core_count: usize) -> Result<Self> {
        let mut slots = Vec::new();
        for _ in 0..core_count {
            slots
                .push(None)
                .map_err(|_| Error::InvalidConfig("core count exceeds MAX_CORES"))?;
        }
        Ok(Self {
            cluster: None,
            slots,
        })
    }

    /// Cores with a stored context
    pub fn cores(&self) -> CoreSet {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| CoreIndex::new(i))
            .collect()
    }

    /// Stored context of `core`
    pub fn get(&self, core: CoreIndex) -> Option<&SavedContext<D, R>> {
        self.slots.get(core.get()).and_then(Option::as_ref)
    }

    /// Distributor snapshot of the cluster
    pub fn cluster(&self) -> Option<&ClusterSnapshot<D>> {
        self.cluster.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub(crate) fn insert(&mut self, ctx: SavedContext<D, R>) {
        if let Some(slot) = self.slots.get_mut(ctx.core().get()) {
            *slot = Some(ctx);
        }
    }

    pub(crate) fn take(&mut self, core: CoreIndex) -> Option<SavedContext<D, R>> {
        self.slots.get_mut(core.get()).and_then(Option::take)
    }

    pub(crate) fn set_cluster(&mut self, cluster: ClusterSnapshot<D>) {
        self.cluster = Some(cluster);
    }

    pub(crate) fn take_cluster(&mut self) -> Option<ClusterSnapshot<D>> {
        self.cluster.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0 => 0; "none")]
    #[test_case(6 => 6; "imx8qm")]
    #[test_case(64 => 64; "full mask")]
    fn test_core_set_all(count: usize) -> usize {
        CoreSet::all(count).len()
    }

    #[test]
    fn test_core_set_ops() {
        let mut set = CoreSet::empty().with(CoreIndex::new(3)).with(CoreIndex::new(0));
        assert!(set.contains(CoreIndex::new(0)));
        assert!(!set.contains(CoreIndex::new(1)));
        assert_eq!(set.len(), 2);

        let order: std::vec::Vec<usize> = set.iter().map(CoreIndex::get).collect();
        assert_eq!(order, [0, 3]);

        set.remove(CoreIndex::new(0));
        set.remove(CoreIndex::new(3));
        assert!(set.is_empty());

        set.insert(CoreIndex::new(MAX_CORES));
        assert!(set.is_empty());
    }

    #[test]
    fn test_cluster_handoff() {
        let mut last_out: SavedContext<u32, u8> =
            SavedContext::new(CoreIndex::new(1), 7, 0xaa, Some(ClusterSnapshot::new(7, 0x55)));
        let mut first_in: SavedContext<u32, u8> =
            SavedContext::new(CoreIndex::new(0), 3, 0xbb, None);

        let cluster = last_out.take_cluster().unwrap();
        assert!(!last_out.has_cluster());
        assert_eq!(first_in.attach_cluster(cluster), None);
        assert_eq!(first_in.cluster().map(ClusterSnapshot::epoch), Some(7));
        assert_eq!(first_in.cluster().map(|c| *c.state()), Some(0x55));
    }

    #[test]
    fn test_store_capacity() {
        assert!(ContextStore::<u32, u8>::new(MAX_CORES).is_ok());
        assert_eq!(
            ContextStore::<u32, u8>::new(MAX_CORES + 1).err().map(|e| e.to_string()),
            Some("invalid configuration: core count exceeds MAX_CORES".into())
        );
    }

    #[test]
    fn test_store_slots() {
        let mut store: ContextStore<u32, u8> = ContextStore::new(4).unwrap();
        assert!(store.is_empty());

        store.insert(SavedContext::new(CoreIndex::new(2), 1, 0x22, None));
        store.insert(SavedContext::new(CoreIndex::new(9), 2, 0x99, None));
        assert_eq!(store.cores(), CoreSet::empty().with(CoreIndex::new(2)));
        assert_eq!(store.get(CoreIndex::new(2)).map(|c| *c.redistributor()), Some(0x22));

        assert!(store.take(CoreIndex::new(2)).is_some());
        assert!(store.take(CoreIndex::new(2)).is_none());
        assert!(store.is_empty());
    }
}
