//! Interrupt controller lifecycle
//!
//! Keeps the GIC consistent across CPU and cluster power transitions.
//!
//! ## State machines
//!
//! Two orthogonal machines share [`LifecycleState`]:
//! - the cluster: `Uninitialized -> DistributorReady`, once per cluster boot
//! - each core: `Uninitialized -> CoreActive -> CoreSuspended -> Restoring -> CoreActive`
//!
//! ## Ordering
//!
//! Power-down saves every participating redistributor before the
//! distributor. Power-up restores the distributor before any redistributor
//! and only then re-enables CPU interface delivery.
//!
//! ## Concurrency
//!
//! Nothing here locks. The power-domain coordinator serializes first-in /
//! last-out cluster work and wraps the controller in its own cross-core lock.

pub mod context;
pub mod driver;
pub mod lifecycle;
pub mod topology;


// Re-export commonly used types
pub use context::{ClusterSnapshot, ContextStore, CoreSet, SavedContext};
pub use driver::{DriverError, DriverResult, GicDriver, Operation};
pub use lifecycle::{ClusterContext, CoreContext, GicLifecycle};
pub use topology::{AffinityTopology, CoreIndex, CoreResolver, TableTopology, Topology};

/// Maximum number of cores tracked by one controller
pub const MAX_CORES: usize = 64;

/// Controller lifecycle state
///
/// `Uninitialized` and `DistributorReady` describe the cluster; the
/// remaining states describe one core. A core that has never been brought
/// up is also `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing configured yet
    Uninitialized,
    /// Distributor configured, by this image or an earlier stage
    DistributorReady,
    /// Redistributor initialized or restored; delivery may be gated
    CoreActive,
    /// Context saved, core powered down
    CoreSuspended,
    /// Context replay in progress
    Restoring,
}

impl LifecycleState {
    /// Check whether the core still counts as powered for last-core-out decisions
    pub fn is_powered(self) -> bool {
        matches!(self, Self::CoreActive | Self::Restoring)
    }
}
