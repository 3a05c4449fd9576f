//! gic-lifecycle - GICv3 controller lifecycle for secure firmware
//!
//! This crate owns the interrupt-controller side of CPU and cluster power
//! transitions: one-time distributor bring-up (skipped when an earlier boot
//! stage already enabled it), per-core redistributor and CPU interface
//! bring-up, and save/restore of distributor and redistributor context across
//! core and cluster power-down.
//!
//! Register programming is not done here. The platform supplies a
//! [`GicDriver`] implementation and a [`CoreResolver`] topology, and the
//! power-domain coordinator drives a [`GicLifecycle`] through its entry points.

#![cfg_attr(not(test), no_std)]

// Architecture-specific code
pub mod arch;

// Platform configuration
pub mod config;

// Controller lifecycle and context save/restore
pub mod irq;

use core::fmt;

// Re-export key types for convenience
pub use arch::{current_mpidr, AffinityLevel, DistributorCheck, GicdCtlr, Mpidr};
pub use config::{FirmwareStage, GicConfig, InterruptGroup, InterruptProp, Trigger};
pub use irq::{
    AffinityTopology, ClusterContext, ClusterSnapshot, ContextStore, CoreContext, CoreIndex,
    CoreResolver, CoreSet, DriverError, GicDriver, GicLifecycle, LifecycleState, Operation,
    SavedContext, TableTopology, Topology, MAX_CORES,
};

/// gic-lifecycle version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifies the core an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreRef {
    /// Hardware affinity value with no topology entry
    Mpidr(u64),
    /// Logical index outside the configured core count
    Index(usize),
}

/// Common error type for the controller lifecycle
///
/// Every variant is a coordinator contract violation or a hardware fault.
/// None of them is retried internally; the caller decides between aborting
/// the power transition and resetting the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Core identity could not be resolved
    UnknownCore(CoreRef),
    /// Distributor or core initialization requested in a ready state
    DoubleInit {
        op: Operation,
        core: Option<CoreIndex>,
        state: LifecycleState,
    },
    /// Restore requested without a matching prior save
    RestoreWithoutSave {
        op: Operation,
        core: CoreIndex,
        state: LifecycleState,
    },
    /// The driver capability reported a failure
    DriverFault {
        op: Operation,
        core: Option<CoreIndex>,
        state: LifecycleState,
        fault: DriverError,
    },
    /// Transition not allowed from the current state
    InvalidTransition {
        op: Operation,
        core: Option<CoreIndex>,
        state: LifecycleState,
    },
    /// Rejected configuration
    InvalidConfig(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownCore(CoreRef::Mpidr(raw)) => {
                write!(f, "no core matches MPIDR {:#x}", raw)
            }
            Error::UnknownCore(CoreRef::Index(index)) => {
                write!(f, "core index {} is outside the topology", index)
            }
            Error::DoubleInit { op, core, state } => {
                write!(f, "{} repeated", op.as_str())?;
                write_location(f, *core, *state)
            }
            Error::RestoreWithoutSave { op, core, state } => {
                write!(f, "{} without a matching save", op.as_str())?;
                write_location(f, Some(*core), *state)
            }
            Error::DriverFault { op, core, state, fault } => {
                write!(f, "{} failed ({:?})", op.as_str(), fault)?;
                write_location(f, *core, *state)
            }
            Error::InvalidTransition { op, core, state } => {
                write!(f, "{} not allowed", op.as_str())?;
                write_location(f, *core, *state)
            }
            Error::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
        }
    }
}

fn write_location(
    f: &mut fmt::Formatter<'_>,
    core: Option<CoreIndex>,
    state: LifecycleState,
) -> fmt::Result {
    match core {
        Some(core) => write!(f, " on core {} in state {:?}", core, state),
        None => write!(f, " on cluster in state {:?}", state),
    }
}

/// Result type alias
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DriverFault {
            op: Operation::RedistributorSave,
            core: Some(CoreIndex::new(2)),
            state: LifecycleState::CoreActive,
            fault: DriverError::Timeout,
        };
        assert_eq!(
            err.to_string(),
            "redistributor save failed (Timeout) on core 2 in state CoreActive"
        );

        let err = Error::UnknownCore(CoreRef::Mpidr(0x101));
        assert_eq!(err.to_string(), "no core matches MPIDR 0x101");
    }
}
