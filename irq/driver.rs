//! GIC driver capability
//!
//! The lifecycle never touches GIC registers. It drives a platform
//! [`GicDriver`] and owns the protocol around it: which call happens when,
//! how often, and in what order.

use crate::config::GicConfig;
use crate::irq::CoreIndex;

/// Failure reported by a driver implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The driver has no redistributor for this core
    InvalidCore,
    /// A snapshot was rejected as malformed or belonging to another frame
    InvalidSnapshot,
    /// A register wait (RWP, ChildrenAsleep) did not settle
    Timeout,
    /// Implementation-defined hardware error code
    Hardware(u32),
}

/// Result type for driver calls
pub type DriverResult<T> = core::result::Result<T, DriverError>;

/// Register-level GIC driver consumed by the lifecycle
///
/// Every call is synchronous and atomic with respect to the calling core.
/// Snapshots are opaque to the lifecycle; it only moves them around.
pub trait GicDriver {
    /// Cluster-wide distributor snapshot
    type DistributorState;
    /// Per-core redistributor snapshot
    type RedistributorState;

    /// One-time global setup; called at most once per boot image
    fn driver_init(&mut self, config: &GicConfig) -> DriverResult<()>;

    /// Liveness check: is the distributor already configured?
    ///
    /// Typically backed by [`DistributorCheck`](crate::arch::DistributorCheck).
    fn distributor_enabled(&self) -> bool;

    /// Configure cluster-wide routing; at most once per cluster power lifetime
    fn distributor_init(&mut self) -> DriverResult<()>;

    /// Per-core setup; not idempotent
    fn redistributor_init(&mut self, core: CoreIndex) -> DriverResult<()>;

    /// Allow interrupt delivery to `core`
    fn interface_enable(&mut self, core: CoreIndex) -> DriverResult<()>;

    /// Gate interrupt delivery to `core`
    fn interface_disable(&mut self, core: CoreIndex) -> DriverResult<()>;

    /// Capture distributor state
    fn distributor_save(&mut self) -> DriverResult<Self::DistributorState>;

    /// Replay distributor state
    fn distributor_restore(&mut self, state: &Self::DistributorState) -> DriverResult<()>;

    /// Capture redistributor state of `core`
    fn redistributor_save(&mut self, core: CoreIndex) -> DriverResult<Self::RedistributorState>;

    /// Replay redistributor state of `core`
    fn redistributor_restore(
        &mut self,
        core: CoreIndex,
        state: &Self::RedistributorState,
    ) -> DriverResult<()>;
}

/// Step of the lifecycle, used to label errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Cluster boot by the first core
    Boot,
    /// Bring-up of a further core
    SecondaryBringUp,
    /// Per-core power-down
    Suspend,
    /// Per-core power-up
    Resume,
    /// Global driver setup
    DriverInit,
    /// Distributor init
    DistributorInit,
    /// Redistributor init
    RedistributorInit,
    /// CPU interface enable
    CpuifEnable,
    /// CPU interface disable
    CpuifDisable,
    /// Distributor save
    DistributorSave,
    /// Distributor restore
    DistributorRestore,
    /// Redistributor save
    RedistributorSave,
    /// Redistributor restore
    RedistributorRestore,
}

impl Operation {
    /// Convert operation to string
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Boot => "boot",
            Operation::SecondaryBringUp => "secondary bring-up",
            Operation::Suspend => "suspend",
            Operation::Resume => "resume",
            Operation::DriverInit => "driver init",
            Operation::DistributorInit => "distributor init",
            Operation::RedistributorInit => "redistributor init",
            Operation::CpuifEnable => "cpu interface enable",
            Operation::CpuifDisable => "cpu interface disable",
            Operation::DistributorSave => "distributor save",
            Operation::DistributorRestore => "distributor restore",
            Operation::RedistributorSave => "redistributor save",
            Operation::RedistributorRestore => "redistributor restore",
        }
    }
}
