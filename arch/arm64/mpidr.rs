//! MPIDR (Multiprocessor Affinity Register) decoding
//!
//! Reference: ARM DDI 0487, MPIDR_EL1
//!
//! Affinity fields:
//! - Aff0 [7:0], Aff1 [15:8], Aff2 [23:16], Aff3 [39:32]
//! - MT [24]: lowest affinity level is a hardware thread

use core::fmt;

/// CPU affinity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AffinityLevel {
    /// Level 0 - Thread/core
    Level0 = 0,
    /// Level 1 - Cluster (e.g., group of cores)
    Level1 = 1,
    /// Level 2 - SOC/package
    Level2 = 2,
    /// Level 3 - System/multichip
    Level3 = 3,
}

impl AffinityLevel {
    /// Get bit shift for MPIDR affinity field
    pub fn mpidr_shift(self) -> u32 {
        match self {
            Self::Level0 => 0,
            Self::Level1 => 8,
            Self::Level2 => 16,
            Self::Level3 => 32,
        }
    }
}

/// MPIDR value of one core
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mpidr {
    pub raw: u64,
}

impl Mpidr {
    /// Bits that identify a core (Aff3..Aff0)
    pub const AFFINITY_MASK: u64 = 0xFF_00FF_FFFF;

    /// MT bit: lowest affinity level is a hardware thread
    pub const MT_BIT: u64 = 1 << 24;

    /// Create from raw MPIDR value
    pub const fn new(raw: u64) -> Self {
        Self { raw }
    }

    /// Replace the affinity field at `level`
    pub fn with_affinity(self, level: AffinityLevel, value: u8) -> Self {
        let shift = level.mpidr_shift();
        let raw = (self.raw & !(0xFF << shift)) | ((value as u64) << shift);
        Self { raw }
    }

    /// Get affinity level 0 (core)
    pub fn aff0(&self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Get affinity level 1 (cluster)
    pub fn aff1(&self) -> u8 {
        ((self.raw >> 8) & 0xFF) as u8
    }

    /// Get affinity level 2 (SOC)
    pub fn aff2(&self) -> u8 {
        ((self.raw >> 16) & 0xFF) as u8
    }

    /// Get affinity level 3 (system)
    pub fn aff3(&self) -> u8 {
        ((self.raw >> 32) & 0xFF) as u8
    }

    /// Get affinity at specific level
    pub fn affinity(&self, level: AffinityLevel) -> u8 {
        match level {
            AffinityLevel::Level0 => self.aff0(),
            AffinityLevel::Level1 => self.aff1(),
            AffinityLevel::Level2 => self.aff2(),
            AffinityLevel::Level3 => self.aff3(),
        }
    }

    /// Affinity fields only, with MT/U and RES1 bits stripped
    pub fn affinity_bits(&self) -> u64 {
        self.raw & Self::AFFINITY_MASK
    }

    /// Check if MT (Multi-threading) bit is set
    pub fn is_multithreaded(&self) -> bool {
        (self.raw & Self::MT_BIT) != 0
    }

    /// Same core, ignoring non-affinity bits
    pub fn same_core(&self, other: Mpidr) -> bool {
        self.affinity_bits() == other.affinity_bits()
    }
}

impl From<u64> for Mpidr {
    fn from(raw: u64) -> Self {
        Self::new(raw)
    }
}

impl fmt::Debug for Mpidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mpidr({:#012x})", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_level() {
        assert_eq!(AffinityLevel::Level0.mpidr_shift(), 0);
        assert_eq!(AffinityLevel::Level2.mpidr_shift(), 16);
        assert_eq!(AffinityLevel::Level3.mpidr_shift(), 32);
    }

    #[test]
    fn test_mpidr_fields() {
        let mpidr = Mpidr::new(0x0000_0102);
        assert_eq!(mpidr.aff0(), 2);
        assert_eq!(mpidr.aff1(), 1);
        assert_eq!(mpidr.aff2(), 0);
        assert_eq!(mpidr.aff3(), 0);
        assert_eq!(mpidr.affinity(AffinityLevel::Level1), 1);

        let mpidr = Mpidr::new(0x8100_0010);
        assert_eq!(mpidr.aff0(), 0x10);
        assert!(mpidr.is_multithreaded());
    }

    #[test]
    fn test_with_affinity() {
        let mpidr = Mpidr::new(Mpidr::MT_BIT)
            .with_affinity(AffinityLevel::Level3, 0x12)
            .with_affinity(AffinityLevel::Level1, 0x34)
            .with_affinity(AffinityLevel::Level1, 0x56);
        assert_eq!(mpidr.raw, 0x12_0100_5600);
        assert_eq!(mpidr.affinity(AffinityLevel::Level3), 0x12);
        assert_eq!(mpidr.affinity(AffinityLevel::Level1), 0x56);
        assert!(mpidr.is_multithreaded());
    }

    #[test]
    fn test_same_core_ignores_res1() {
        // RES1 bit 31 is set on real hardware
        let hw = Mpidr::new(0x8000_0101);
        assert!(hw.same_core(Mpidr::new(0x101)));
        assert!(!hw.same_core(Mpidr::new(0x100)));
    }
}
