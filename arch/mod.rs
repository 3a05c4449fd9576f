//! Architecture support

pub mod arm64;

pub use arm64::{AffinityLevel, DistributorCheck, GicdControlRegs, GicdCtlr, Mpidr};

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        /// Read the MPIDR of the calling core
        ///
        /// Requires EL1 or higher.
        #[inline]
        pub fn current_mpidr() -> Option<Mpidr> {
            use aarch64_cpu::registers::{Readable, MPIDR_EL1};
            Some(Mpidr::new(MPIDR_EL1.get()))
        }
    } else {
        /// Read the MPIDR of the calling core
        ///
        /// Always `None` off AArch64; callers resolve cores explicitly.
        #[inline]
        pub fn current_mpidr() -> Option<Mpidr> {
            None
        }
    }
}
