//! GIC distributor control register and liveness check
//!
//! Reference: ARM IHI 0069 (GICv3/v4 architecture specification), GICD_CTLR
//!
//! When a co-resident partition reboots, an earlier boot stage may already
//! have enabled the distributor. Re-running distributor init at that point
//! would race with live interrupt traffic. Any group-enable bit set in
//! GICD_CTLR is taken as "already configured".

use bitflags::bitflags;
use tock_registers::interfaces::Readable;
use tock_registers::register_structs;
use tock_registers::registers::{ReadOnly, ReadWrite};

bitflags! {
    /// GICD_CTLR bits, two security states, Secure access view
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GicdCtlr: u32 {
        /// Enable Group 0 interrupts
        const ENABLE_G0 = 1 << 0;
        /// Enable Non-secure Group 1 interrupts
        const ENABLE_G1NS = 1 << 1;
        /// Enable Secure Group 1 interrupts
        const ENABLE_G1S = 1 << 2;
        /// Affinity routing enable, Secure state
        const ARE_S = 1 << 4;
        /// Affinity routing enable, Non-secure state
        const ARE_NS = 1 << 5;
        /// Disable security
        const DS = 1 << 6;
        /// Register write pending
        const RWP = 1 << 31;
    }
}

impl GicdCtlr {
    /// All group-enable bits
    pub const GROUP_ENABLES: Self = Self::ENABLE_G0
        .union(Self::ENABLE_G1NS)
        .union(Self::ENABLE_G1S);

    /// Check whether any interrupt group is enabled
    pub fn any_group_enabled(self) -> bool {
        self.intersects(Self::GROUP_ENABLES)
    }
}

register_structs! {
    /// Leading distributor registers read by the liveness check
    pub GicdControlRegs {
        /// Distributor Control Register
        (0x000 => pub ctlr: ReadWrite<u32>),
        /// Interrupt Controller Type Register
        (0x004 => pub typer: ReadOnly<u32>),
        /// Distributor Implementer Identification Register
        (0x008 => pub iidr: ReadOnly<u32>),
        (0x00c => @END),
    }
}

/// Reads GICD_CTLR to decide whether the distributor is already live
///
/// Driver implementations delegate `GicDriver::distributor_enabled` here.
#[derive(Clone, Copy)]
pub struct DistributorCheck<'a> {
    regs: &'a GicdControlRegs,
}

impl<'a> DistributorCheck<'a> {
    /// Create a liveness check over a mapped distributor frame
    pub fn new(regs: &'a GicdControlRegs) -> Self {
        Self { regs }
    }

    /// Read the current control register value
    pub fn ctlr(&self) -> GicdCtlr {
        GicdCtlr::from_bits_retain(self.regs.ctlr.get())
    }

    /// Check whether a prior boot stage already configured the distributor
    pub fn is_configured(&self) -> bool {
        let ctlr = self.ctlr();
        log::debug!("GIC: GICD_CTLR = {:#010x}", ctlr.bits());
        ctlr.any_group_enabled()
    }
}

impl DistributorCheck<'static> {
    /// Create a liveness check from the distributor base address
    ///
    /// # Safety
    /// `base` must be the address of a GICD frame that stays mapped as device
    /// memory for the rest of the boot image.
    pub unsafe fn from_base(base: usize) -> Option<Self> {
        let ptr = base as *const GicdControlRegs;
        // SAFETY: the caller guarantees `base` is a live GICD mapping.
        unsafe { ptr.as_ref() }.map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn ctlr_configured(value: u32) -> bool {
        let mut frame = [0u32; 3];
        frame[0] = value;
        // SAFETY: `frame` matches the register block layout and outlives the check.
        let regs = unsafe { &*(frame.as_mut_ptr() as *const GicdControlRegs) };
        DistributorCheck::new(regs).is_configured()
    }

    #[test_case(0 => false; "reset value")]
    #[test_case(GicdCtlr::ENABLE_G0.bits() => true; "group 0 only")]
    #[test_case(GicdCtlr::ENABLE_G1S.bits() => true; "secure group 1 only")]
    #[test_case(GicdCtlr::ENABLE_G1NS.bits() => true; "non-secure group 1 only")]
    #[test_case((GicdCtlr::ARE_S | GicdCtlr::ARE_NS).bits() => false; "routing without enables")]
    #[test_case(GicdCtlr::RWP.bits() => false; "write pending only")]
    fn test_ctlr_configured(ctlr: u32) -> bool {
        ctlr_configured(ctlr)
    }

    #[test]
    fn test_group_enables() {
        assert_eq!(GicdCtlr::GROUP_ENABLES.bits(), 0b111);
        assert!(!GicdCtlr::DS.any_group_enabled());
    }

    #[test]
    fn test_from_null_base() {
        // SAFETY: a null base is rejected before any access.
        assert!(unsafe { DistributorCheck::from_base(0) }.is_none());
    }
}
