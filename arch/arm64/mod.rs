//! ARM64 definitions used by the controller lifecycle
//!
//! Only the pieces the lifecycle needs to reason about live here: MPIDR
//! affinity decoding for core identity, and the distributor control register
//! used as the "already configured" liveness check.

pub mod gicd;
pub mod mpidr;

// Re-export commonly used types
pub use gicd::{DistributorCheck, GicdControlRegs, GicdCtlr};
pub use mpidr::{AffinityLevel, Mpidr};
