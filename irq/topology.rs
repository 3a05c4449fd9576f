//! Core identity resolution
//!
//! Maps a hardware MPIDR to the dense [`CoreIndex`] used for per-core
//! tables. Platforms pick one mapping when they build the configuration:
//!
//! - [`AffinityTopology`]: linear platform core position,
//!   `cluster * cores_per_cluster + core` (threads folded in when MT is set)
//! - [`TableTopology`]: explicit MPIDR list in redistributor order, for
//!   partitioned SoCs whose GIC numbering differs from the platform's
//!
//! Resolution never allocates or blocks, so it is usable before the rest of
//! the firmware is up.

use core::fmt;

use heapless::Vec;

use crate::arch::{AffinityLevel, Mpidr};
use crate::irq::MAX_CORES;
use crate::{CoreRef, Error, Result};

/// Dense logical core index, `0..core_count`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreIndex(usize);

impl CoreIndex {
    /// Create from a raw index
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get raw index
    pub const fn get(self) -> usize {
        self.0
    }
}

impl From<CoreIndex> for usize {
    fn from(core: CoreIndex) -> Self {
        core.0
    }
}

impl fmt::Display for CoreIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hardware id to logical index mapping
pub trait CoreResolver {
    /// Number of cores covered by the mapping
    fn core_count(&self) -> usize;

    /// Map a hardware MPIDR to its logical index
    fn resolve(&self, mpidr: Mpidr) -> Result<CoreIndex>;

    /// Map a logical index back to its MPIDR
    fn hardware_id(&self, core: CoreIndex) -> Result<Mpidr>;
}

/// Linear mapping derived from MPIDR affinity fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffinityTopology {
    clusters: usize,
    cores_per_cluster: usize,
    threads_per_core: usize,
    core_count: usize,
}

impl AffinityTopology {
    /// Create a topology with `clusters` clusters of `cores_per_cluster` cores
    pub fn new(clusters: usize, cores_per_cluster: usize) -> Result<Self> {
        Self::with_threads(clusters, cores_per_cluster, 1)
    }

    /// Create a multithreaded topology (MT bit set in every MPIDR)
    pub fn with_threads(
        clusters: usize,
        cores_per_cluster: usize,
        threads_per_core: usize,
    ) -> Result<Self> {
        if clusters == 0 || cores_per_cluster == 0 || threads_per_core == 0 {
            return Err(Error::InvalidConfig("empty affinity level"));
        }

        if clusters > 256 || cores_per_cluster > 256 || threads_per_core > 256 {
            return Err(Error::InvalidConfig("affinity level wider than 8 bits"));
        }

        let core_count = clusters * cores_per_cluster * threads_per_core;
        if core_count > MAX_CORES {
            return Err(Error::InvalidConfig("topology exceeds MAX_CORES"));
        }

        Ok(Self {
            clusters,
            cores_per_cluster,
            threads_per_core,
            core_count,
        })
    }

    /// Limit the mapping to the first `core_count` positions
    ///
    /// For SoCs with unevenly populated clusters, e.g. 4 + 2 cores laid out
    /// with a stride of 4.
    pub fn truncated(mut self, core_count: usize) -> Result<Self> {
        if core_count == 0 || core_count > self.core_count {
            return Err(Error::InvalidConfig("truncated core count out of range"));
        }
        self.core_count = core_count;
        Ok(self)
    }

    fn multithreaded(&self) -> bool {
        self.threads_per_core > 1
    }

    /// Affinity levels holding the cluster, cpu and thread fields
    fn levels(&self) -> (AffinityLevel, AffinityLevel, Option<AffinityLevel>) {
        if self.multithreaded() {
            (AffinityLevel::Level2, AffinityLevel::Level1, Some(AffinityLevel::Level0))
        } else {
            (AffinityLevel::Level1, AffinityLevel::Level0, None)
        }
    }
}

impl CoreResolver for AffinityTopology {
    fn core_count(&self) -> usize {
        self.core_count
    }

    fn resolve(&self, mpidr: Mpidr) -> Result<CoreIndex> {
        let unknown = Error::UnknownCore(CoreRef::Mpidr(mpidr.raw));
        let (cluster_level, cpu_level, thread_level) = self.levels();

        // Fields above the cluster level must be zero
        let upper = mpidr.affinity_bits() >> (cluster_level.mpidr_shift() + 8);
        if mpidr.is_multithreaded() != self.multithreaded() || upper != 0 {
            return Err(unknown);
        }

        let cluster = mpidr.affinity(cluster_level) as usize;
        let cpu = mpidr.affinity(cpu_level) as usize;
        let thread = thread_level.map_or(0, |level| mpidr.affinity(level)) as usize;

        if cluster >= self.clusters
            || cpu >= self.cores_per_cluster
            || thread >= self.threads_per_core
        {
            return Err(unknown);
        }

        let index = (cluster * self.cores_per_cluster + cpu) * self.threads_per_core + thread;
        if index >= self.core_count {
            return Err(unknown);
        }

        Ok(CoreIndex::new(index))
    }

    fn hardware_id(&self, core: CoreIndex) -> Result<Mpidr> {
        let index = core.get();
        if index >= self.core_count {
            return Err(Error::UnknownCore(CoreRef::Index(index)));
        }

        let thread = (index % self.threads_per_core) as u8;
        let cpu = ((index / self.threads_per_core) % self.cores_per_cluster) as u8;
        let cluster = (index / (self.threads_per_core * self.cores_per_cluster)) as u8;

        let (cluster_level, cpu_level, thread_level) = self.levels();
        let mut mpidr = Mpidr::new(0)
            .with_affinity(cluster_level, cluster)
            .with_affinity(cpu_level, cpu);
        if let Some(level) = thread_level {
            mpidr = Mpidr::new(mpidr.raw | Mpidr::MT_BIT).with_affinity(level, thread);
        }
        Ok(mpidr)
    }
}

/// Explicit MPIDR list; position in the list is the logical index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTopology {
    entries: Vec<Mpidr, MAX_CORES>,
}

impl TableTopology {
    /// Build from raw MPIDR values in logical order
    pub fn from_mpidrs(mpidrs: &[u64]) -> Result<Self> {
        if mpidrs.is_empty() {
            return Err(Error::InvalidConfig("empty core table"));
        }

        let mut entries = Vec::new();
        for &raw in mpidrs {
            let mpidr = Mpidr::new(raw);
            if entries.iter().any(|e: &Mpidr| e.same_core(mpidr)) {
                return Err(Error::InvalidConfig("MPIDR listed twice in core table"));
            }
            entries
                .push(mpidr)
                .map_err(|_| Error::InvalidConfig("core table exceeds MAX_CORES"))?;
        }

        Ok(Self { entries })
    }
}

impl CoreResolver for TableTopology {
    fn core_count(&self) -> usize {
        self.entries.len()
    }

    fn resolve(&self, mpidr: Mpidr) -> Result<CoreIndex> {
        self.entries
            .iter()
            .position(|e| e.same_core(mpidr))
            .map(CoreIndex::new)
            .ok_or(Error::UnknownCore(CoreRef::Mpidr(mpidr.raw)))
    }

    fn hardware_id(&self, core: CoreIndex) -> Result<Mpidr> {
        self.entries
            .get(core.get())
            .copied()
            .ok_or(Error::UnknownCore(CoreRef::Index(core.get())))
    }
}

/// Mapping chosen by the platform configuration at run time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// Linear affinity-derived positions
    Affinity(AffinityTopology),
    /// Explicit table
    Table(TableTopology),
}

impl CoreResolver for Topology {
    fn core_count(&self) -> usize {
        match self {
            Topology::Affinity(t) => t.core_count(),
            Topology::Table(t) => t.core_count(),
        }
    }

    fn resolve(&self, mpidr: Mpidr) -> Result<CoreIndex> {
        match self {
            Topology::Affinity(t) => t.resolve(mpidr),
            Topology::Table(t) => t.resolve(mpidr),
        }
    }

    fn hardware_id(&self, core: CoreIndex) -> Result<Mpidr> {
        match self {
            Topology::Affinity(t) => t.hardware_id(core),
            Topology::Table(t) => t.hardware_id(core),
        }
    }
}

impl From<AffinityTopology> for Topology {
    fn from(t: AffinityTopology) -> Self {
        Topology::Affinity(t)
    }
}

impl From<TableTopology> for Topology {
    fn from(t: TableTopology) -> Self {
        Topology::Table(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0x0000_0000 => Ok(0); "cluster 0 core 0")]
    #[test_case(0x8000_0003 => Ok(3); "res1 bit ignored")]
    #[test_case(0x0000_0100 => Ok(4); "cluster 1 core 0")]
    #[test_case(0x0000_0101 => Ok(5); "cluster 1 core 1")]
    #[test_case(0x0000_0102 => Err(()); "beyond truncated count")]
    #[test_case(0x0000_0200 => Err(()); "cluster out of range")]
    #[test_case(0x0001_0000 => Err(()); "aff2 set")]
    #[test_case(0x0100_0000 => Err(()); "mt bit on single-threaded topology")]
    fn test_imx8qm_affinity(raw: u64) -> core::result::Result<usize, ()> {
        // 4x A53 in cluster 0, 2x A72 in cluster 1
        let topology = AffinityTopology::new(2, 4).and_then(|t| t.truncated(6)).unwrap();
        topology
            .resolve(Mpidr::new(raw))
            .map(CoreIndex::get)
            .map_err(|_| ())
    }

    #[test]
    fn test_affinity_bijective() {
        let topology = AffinityTopology::with_threads(2, 2, 2).unwrap();
        assert_eq!(topology.core_count(), 8);

        for index in 0..topology.core_count() {
            let core = CoreIndex::new(index);
            let mpidr = topology.hardware_id(core).unwrap();
            assert!(mpidr.is_multithreaded());
            assert_eq!(topology.resolve(mpidr), Ok(core));
        }

        assert_eq!(
            topology.hardware_id(CoreIndex::new(8)),
            Err(Error::UnknownCore(CoreRef::Index(8)))
        );
    }

    #[test]
    fn test_affinity_multithreaded_fields() {
        let topology = AffinityTopology::with_threads(2, 2, 2).unwrap();
        // Cluster 1, cpu 0, thread 1
        assert_eq!(topology.resolve(Mpidr::new(0x0101_0001)), Ok(CoreIndex::new(5)));
        assert_eq!(topology.hardware_id(CoreIndex::new(5)), Ok(Mpidr::new(0x0101_0001)));
        // Aff3 set
        assert!(topology.resolve(Mpidr::new(0x01_0100_0001)).is_err());
    }

    #[test]
    fn test_affinity_rejects_bad_shape() {
        assert!(AffinityTopology::new(0, 4).is_err());
        assert!(AffinityTopology::new(16, 8).is_err());
        assert!(AffinityTopology::new(2, 4).unwrap().truncated(9).is_err());
    }

    #[test]
    fn test_table_topology() {
        // GIC numbering of a partition where the A72 pair comes first
        let topology = TableTopology::from_mpidrs(&[0x100, 0x101, 0x0, 0x1]).unwrap();
        assert_eq!(topology.core_count(), 4);
        assert_eq!(topology.resolve(Mpidr::new(0x8000_0100)), Ok(CoreIndex::new(0)));
        assert_eq!(topology.resolve(Mpidr::new(0x1)), Ok(CoreIndex::new(3)));
        assert_eq!(
            topology.resolve(Mpidr::new(0x2)),
            Err(Error::UnknownCore(CoreRef::Mpidr(0x2)))
        );
        assert_eq!(topology.hardware_id(CoreIndex::new(1)), Ok(Mpidr::new(0x101)));
    }

    #[test]
    fn test_table_rejects_duplicates() {
        assert_eq!(
            TableTopology::from_mpidrs(&[0x0, 0x8000_0000]),
            Err(Error::InvalidConfig("MPIDR listed twice in core table"))
        );
        assert!(TableTopology::from_mpidrs(&[]).is_err());
    }

    #[test]
    fn test_topology_dispatch() {
        let topology: Topology = TableTopology::from_mpidrs(&[0x1, 0x0]).unwrap().into();
        assert_eq!(topology.core_count(), 2);
        assert_eq!(topology.resolve(Mpidr::new(0x0)), Ok(CoreIndex::new(1)));

        let topology: Topology = AffinityTopology::new(1, 2).unwrap().into();
        assert_eq!(topology.resolve(Mpidr::new(0x1)), Ok(CoreIndex::new(1)));
    }
}
