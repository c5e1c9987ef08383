use core::ops::{BitOr, BitOrAssign};

use super::types::Error;
use crate::memory_map::FLASH_SIZE;

pub const SPEED_13M: u32 = 13_000_000;
pub const SPEED_26M: u32 = 26_000_000;
pub const SPEED_52M: u32 = 52_000_000;
pub const SPEED_78M: u32 = 78_000_000;
pub const SPEED_104M: u32 = 104_000_000;
pub const SPEED_208M: u32 = 208_000_000;

/// Remap slots the largest supported controller provides.
pub const MAX_REMAP_SLOTS: usize = 8;

/// Set of flash access modes, requested from or reported by the chip.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OpMode(u32);

impl OpMode {
    pub const NONE: Self = Self(0);
    pub const STAND_SPI: Self = Self(1 << 0);
    pub const FAST_SPI: Self = Self(1 << 1);
    pub const DUAL_OUTPUT: Self = Self(1 << 2);
    pub const DUAL_IO: Self = Self(1 << 3);
    pub const QUAD_OUTPUT: Self = Self(1 << 4);
    pub const QUAD_IO: Self = Self(1 << 5);
    pub const CONTINUOUS_READ: Self = Self(1 << 6);
    pub const READ_WRAP: Self = Self(1 << 7);
    pub const PAGE_PROGRAM: Self = Self(1 << 8);
    pub const DUAL_PAGE_PROGRAM: Self = Self(1 << 9);
    pub const QUAD_PAGE_PROGRAM: Self = Self(1 << 10);
    pub const SUSPEND: Self = Self(1 << 11);
    pub const ERASE_IN_STD: Self = Self(1 << 12);
    pub const HIGH_PERFORMANCE: Self = Self(1 << 13);

    /// Every read and program mode the controller can drive.
    pub const ALL_ACCESS: Self = Self(
        Self::STAND_SPI.0
            | Self::FAST_SPI.0
            | Self::DUAL_OUTPUT.0
            | Self::DUAL_IO.0
            | Self::QUAD_OUTPUT.0
            | Self::QUAD_IO.0
            | Self::CONTINUOUS_READ.0
            | Self::READ_WRAP.0
            | Self::PAGE_PROGRAM.0
            | Self::DUAL_PAGE_PROGRAM.0
            | Self::QUAD_PAGE_PROGRAM.0,
    );

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for OpMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for OpMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// System clock steps the clock unit can run the flash from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CmuFreq {
    F26M,
    F52M,
    F78M,
    F104M,
    F208M,
}

impl CmuFreq {
    /// Picks the fastest step not above the requested flash source clock.
    pub const fn from_flash_clock(hz: u32) -> Self {
        if hz >= SPEED_208M {
            Self::F208M
        } else if hz >= SPEED_104M {
            Self::F104M
        } else if hz >= SPEED_78M {
            Self::F78M
        } else if hz >= SPEED_52M {
            Self::F52M
        } else {
            Self::F26M
        }
    }
}

/// Raw controller timing applied instead of divider init and calibration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingOverride {
    pub divider: u8,
    pub cmd_quad: bool,
    pub sample_delay: u8,
    pub spi_ru_en: bool,
    pub spi_rd_en: bool,
    pub read_cmd: u8,
    pub fast_read_cmd: u8,
    pub quad_read_cmd: u8,
}

/// On-the-fly decryption window (BEST1400 family).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecryptWindow {
    pub address: u32,
    pub size: u32,
    pub key_index: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NorFlashConfig {
    pub source_clock_hz: u32,
    pub speed_hz: u32,
    pub mode: OpMode,
    pub timing_override: Option<TimingOverride>,
    pub decrypt: Option<DecryptWindow>,
    /// Upper bound on controller idle polls before giving up with `Timeout`.
    pub max_busy_polls: u32,
    /// Clamp applied to the device size when planning remap windows.
    /// `None` for programmer builds that may see larger devices.
    pub remap_size_limit: Option<u32>,
}

impl Default for NorFlashConfig {
    fn default() -> Self {
        Self {
            source_clock_hz: SPEED_52M,
            speed_hz: SPEED_52M,
            mode: OpMode::ALL_ACCESS,
            timing_override: None,
            decrypt: None,
            max_busy_polls: 2_000_000,
            remap_size_limit: Some(FLASH_SIZE),
        }
    }
}

impl NorFlashConfig {
    /// Mode set actually requested from the chip at open.
    pub fn effective_mode(&self) -> OpMode {
        if self.speed_hz >= SPEED_104M {
            self.mode | OpMode::HIGH_PERFORMANCE
        } else {
            self.mode
        }
    }
}

/// What the target silicon can do. Read once when the driver is built;
/// anything missing makes the matching operation return `BadOperation`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities {
    pub controller_version: u8,
    pub suspend: bool,
    pub security_register: bool,
    /// Security registers are read through the RX FIFO instead of the mapped window.
    pub sec_reg_fifo_read: bool,
    /// Keep 1024-byte security program pages on a v1 controller.
    pub sec_reg_pp_1024: bool,
    pub unique_id: bool,
    pub deep_sleep: bool,
    /// Flash runs from the low-speed clock tree.
    pub low_speed: bool,
    pub remap_slots: u8,
    pub rx_fifo_size: usize,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            controller_version: 2,
            suspend: true,
            security_register: true,
            sec_reg_fifo_read: false,
            sec_reg_pp_1024: false,
            unique_id: true,
            deep_sleep: false,
            low_speed: false,
            remap_slots: 4,
            rx_fifo_size: 16,
        }
    }
}

impl Capabilities {
    pub const fn supports_remap(&self) -> bool {
        self.controller_version >= 2 && self.remap_slots > 0
    }
}

pub(crate) fn validate(config: &NorFlashConfig, caps: &Capabilities) -> Result<(), Error> {
    if config.max_busy_polls == 0 || caps.rx_fifo_size == 0 {
        return Err(Error::InvalidConfiguration);
    }
    if config.speed_hz == 0 || config.source_clock_hz < config.speed_hz {
        return Err(Error::InvalidConfiguration);
    }
    if caps.remap_slots as usize > MAX_REMAP_SLOTS {
        return Err(Error::InvalidConfiguration);
    }
    if let Some(dec) = config.decrypt {
        if dec.address.checked_add(dec.size).is_none() {
            return Err(Error::InvalidConfiguration);
        }
    }
    Ok(())
}
