//! Configuration management
//!
//! This module holds the platform description the controller is built
//! from: GIC frame addresses, core count, the firmware stage the image runs
//! at, and the secure interrupts the driver programs during global init.
//! A configuration is owned by one `GicLifecycle` for the life of the boot
//! image; there is no global copy.

use crate::irq::{CoreIndex, MAX_CORES};
use crate::{Error, Result};

/// Highest priority a secure interrupt can be given
pub const GIC_HIGHEST_SEC_PRIORITY: u8 = 0x00;
/// Lowest priority still visible to the secure world
pub const GIC_LOWEST_SEC_PRIORITY: u8 = 0x7f;

/// Largest valid SPI interrupt id
pub const MAX_SPI_ID: u32 = 1019;

/// Size of one redistributor (RD_base + SGI_base frames)
pub const GICR_FRAME_STRIDE: u64 = 0x2_0000;

/// i.MX8 distributor base
pub const IMX8_GICD_BASE: u64 = 0x51a0_0000;
/// i.MX8 redistributor base
pub const IMX8_GICR_BASE: u64 = 0x51b0_0000;
/// i.MX8QM cores with a redistributor (4x A53 + 2x A72)
pub const IMX8_CORE_COUNT: usize = 6;

/// Interrupt group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptGroup {
    /// Group 0, delivered as FIQ to EL3
    Group0,
    /// Secure Group 1
    Group1Secure,
    /// Non-secure Group 1
    Group1NonSecure,
}

/// Trigger mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Level-sensitive
    Level,
    /// Edge-triggered
    Edge,
}

/// Properties of one interrupt programmed during driver init
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptProp {
    /// Interrupt id
    pub intid: u32,
    /// Priority
    pub priority: u8,
    /// Group
    pub group: InterruptGroup,
    /// Trigger mode
    pub trigger: Trigger,
}

impl InterruptProp {
    /// Create an interrupt property descriptor
    pub const fn new(intid: u32, priority: u8, group: InterruptGroup, trigger: Trigger) -> Self {
        Self {
            intid,
            priority,
            group,
            trigger,
        }
    }
}

/// Secure interrupts of the i.MX8 runtime firmware
pub static IMX8_SECURE_INTERRUPTS: [InterruptProp; 1] = [InterruptProp::new(
    8,
    GIC_HIGHEST_SEC_PRIORITY,
    InterruptGroup::Group0,
    Trigger::Level,
)];

/// Firmware stage the image runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareStage {
    /// EL3 runtime firmware; owns the GIC driver
    Runtime,
    /// Secure EL1 payload; uses system registers, the driver is already set up
    SecureEl1,
}

impl FirmwareStage {
    /// Check whether this stage performs driver init
    pub fn owns_driver(self) -> bool {
        matches!(self, Self::Runtime)
    }
}

/// GIC platform configuration
#[derive(Debug, Clone)]
pub struct GicConfig {
    /// Distributor base address
    pub gicd_base: u64,
    /// First redistributor base address
    pub gicr_base: u64,
    /// Distance between consecutive redistributors
    pub gicr_stride: u64,
    /// Number of cores with a redistributor
    pub core_count: usize,
    /// Stage this image runs at
    pub stage: FirmwareStage,
    /// Secure interrupts programmed by driver init
    pub interrupt_props: &'static [InterruptProp],
}

impl Default for GicConfig {
    fn default() -> Self {
        Self {
            gicd_base: IMX8_GICD_BASE,
            gicr_base: IMX8_GICR_BASE,
            gicr_stride: GICR_FRAME_STRIDE,
            core_count: IMX8_CORE_COUNT,
            stage: FirmwareStage::Runtime,
            interrupt_props: &IMX8_SECURE_INTERRUPTS,
        }
    }
}

impl GicConfig {
    /// Create a configuration for `core_count` cores with default frames
    pub fn with_core_count(core_count: usize) -> Self {
        Self {
            core_count,
            ..Self::default()
        }
    }

    /// Redistributor base address of a core
    pub fn redistributor_base(&self, core: CoreIndex) -> u64 {
        self.gicr_base + self.gicr_stride * core.get() as u64
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.core_count == 0 {
            return Err(Error::InvalidConfig("core count is zero"));
        }

        if self.core_count > MAX_CORES {
            return Err(Error::InvalidConfig("core count exceeds MAX_CORES"));
        }

        if self.gicd_base == 0 || self.gicr_base == 0 {
            return Err(Error::InvalidConfig("GIC base address is null"));
        }

        // Both frames are 64KiB aligned
        if self.gicd_base & 0xffff != 0 || self.gicr_base & 0xffff != 0 {
            return Err(Error::InvalidConfig("GIC base address is not 64KiB aligned"));
        }

        if self.gicr_stride < GICR_FRAME_STRIDE || self.gicr_stride & 0xffff != 0 {
            return Err(Error::InvalidConfig("redistributor stride is too small or unaligned"));
        }

        for (i, prop) in self.interrupt_props.iter().enumerate() {
            if prop.intid > MAX_SPI_ID {
                return Err(Error::InvalidConfig("interrupt id out of range"));
            }
            if self.interrupt_props[..i].iter().any(|p| p.intid == prop.intid) {
                return Err(Error::InvalidConfig("interrupt id listed twice"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static DUPLICATE_PROPS: [InterruptProp; 2] = [
        InterruptProp::new(29, 0x10, InterruptGroup::Group1Secure, Trigger::Level),
        InterruptProp::new(29, 0x20, InterruptGroup::Group0, Trigger::Edge),
    ];

    static BAD_INTID_PROPS: [InterruptProp; 1] = [InterruptProp::new(
        1020,
        GIC_LOWEST_SEC_PRIORITY,
        InterruptGroup::Group1Secure,
        Trigger::Level,
    )];

    #[test]
    fn test_default_config() {
        let config = GicConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.interrupt_props.len(), 1);
        assert_eq!(config.interrupt_props[0].intid, 8);
        assert_eq!(config.interrupt_props[0].group, InterruptGroup::Group0);
        assert!(config.stage.owns_driver());
    }

    #[test]
    fn test_redistributor_base() {
        let config = GicConfig::default();
        assert_eq!(config.redistributor_base(CoreIndex::new(0)), IMX8_GICR_BASE);
        assert_eq!(
            config.redistributor_base(CoreIndex::new(3)),
            IMX8_GICR_BASE + 3 * GICR_FRAME_STRIDE
        );
    }

    #[test]
    fn test_validate_core_count() {
        assert!(GicConfig::with_core_count(0).validate().is_err());
        assert!(GicConfig::with_core_count(MAX_CORES + 1).validate().is_err());
        assert_eq!(GicConfig::with_core_count(MAX_CORES).validate(), Ok(()));
    }

    #[test]
    fn test_validate_addresses() {
        let config = GicConfig {
            gicd_base: 0,
            ..GicConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GicConfig {
            gicr_base: IMX8_GICR_BASE + 0x100,
            ..GicConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GicConfig {
            gicr_stride: 0x1_0000,
            ..GicConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_interrupts() {
        let config = GicConfig {
            interrupt_props: &DUPLICATE_PROPS,
            ..GicConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(Error::InvalidConfig("interrupt id listed twice"))
        );

        let config = GicConfig {
            interrupt_props: &BAD_INTID_PROPS,
            ..GicConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(Error::InvalidConfig("interrupt id out of range"))
        );
    }
}
