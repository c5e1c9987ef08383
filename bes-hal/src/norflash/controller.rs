//! Hardware seam between the range-splitting driver and one flash controller
//! revision.
//!
//! Implementations issue single native commands (one sector erase, one page
//! program, one FIFO read) and report whether the chip paused them. They never
//! split ranges or track suspend state; [`NorFlash`](super::NorFlash) does that.

use super::config::{CmuFreq, DecryptWindow, NorFlashConfig, OpMode, TimingOverride};
use super::geometry::{Geometry, DEVICE_ID_LEN};
use super::types::{Error, Progress};

/// Native erase unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EraseKind {
    Sector,
    Block,
    Chip,
}

/// What the chip match table knows about an identified device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipInfo {
    pub geometry: Geometry,
    pub supported_modes: OpMode,
}

/// Security-register layout fused into the chip, as raw field codes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecRegFuse {
    pub enabled: bool,
    pub base: u8,
    pub size: u8,
    pub offset: u8,
    pub count: u8,
    pub page_program: u8,
}

impl SecRegFuse {
    pub const BASE_0X1000: u8 = 0;
    pub const BASE_0X0000: u8 = 1;

    pub const SIZE_256: u8 = 0;
    pub const SIZE_512: u8 = 1;
    pub const SIZE_1024: u8 = 2;

    pub const OFFSET_0X1000: u8 = 0;
    pub const OFFSET_0X0100: u8 = 1;

    pub const CNT_3: u8 = 0;
    pub const CNT_4: u8 = 1;

    pub const PP_256: u8 = 0;
    pub const PP_1024: u8 = 1;
}

pub trait Controller {
    /// Resets the chip while the controller runs the slow default clock.
    fn reset(&mut self);

    /// Restores the default divider and sample delay.
    fn reset_timing(&mut self);

    fn apply_timing_override(&mut self, timing: &TimingOverride);

    fn read_id(&mut self, id: &mut [u8; DEVICE_ID_LEN]);

    /// Looks the id up in the board's chip table and selects its command set.
    fn match_chip(&mut self, id: &[u8; DEVICE_ID_LEN]) -> Option<ChipInfo>;

    fn init_divider(&mut self, config: &NorFlashConfig) -> Result<(), Error>;

    fn divider(&self) -> u8;

    fn set_divider(&mut self, divider: u8);

    fn set_mode(&mut self, mode: OpMode) -> Result<(), Error>;

    fn sample_delay_calib(&mut self) -> Result<(), Error>;

    fn read_unique_id(&mut self, out: &mut [u8]) -> Result<(), Error>;

    /// Clock service: keep the system clock at or above `freq`.
    fn request_min_system_freq(&mut self, _freq: CmuFreq) {}

    /// Clock service: source clock for the flash controller.
    fn set_flash_clock(&mut self, _freq: CmuFreq) {}

    fn configure_decryption(&mut self, _window: Option<DecryptWindow>) {}

    /// Opens a command bracket: correct clocks and mode, no transfer in flight.
    fn pre_operation(&mut self);

    /// Closes a command bracket and restores the idle read mode.
    fn post_operation(&mut self);

    fn erase(
        &mut self,
        address: u32,
        kind: EraseKind,
        allow_suspend: bool,
    ) -> Result<Progress, Error>;

    fn program(
        &mut self,
        address: u32,
        data: &[u8],
        allow_suspend: bool,
    ) -> Result<Progress, Error>;

    fn read(&mut self, address: u32, out: &mut [u8]) -> Result<(), Error>;

    fn erase_resume(&mut self, allow_suspend: bool) -> Result<Progress, Error>;

    fn program_resume(&mut self, allow_suspend: bool) -> Result<Progress, Error>;

    /// Marks `irq` as one that may suspend a running erase/program.
    fn suspend_check_irq(&mut self, _irq: u32) -> Result<(), Error> {
        Ok(())
    }

    fn security_register_config(&mut self) -> SecRegFuse {
        SecRegFuse::default()
    }

    fn security_register_lock(&mut self, _index: u32) -> Result<(), Error> {
        Err(Error::BadOperation)
    }

    fn security_register_erase(&mut self, _address: u32) -> Result<(), Error> {
        Err(Error::BadOperation)
    }

    fn security_register_program(&mut self, _address: u32, _data: &[u8]) -> Result<(), Error> {
        Err(Error::BadOperation)
    }

    /// FIFO read of at most one RX FIFO worth of bytes.
    fn security_register_read(&mut self, _address: u32, _out: &mut [u8]) -> Result<(), Error> {
        Err(Error::BadOperation)
    }

    /// Switches the mapped window to security-register reads; returns the
    /// previous read mode for [`Controller::security_register_disable_read`].
    fn security_register_enable_read(&mut self) -> u32 {
        0
    }

    fn security_register_disable_read(&mut self, _saved_mode: u32) {}

    /// Copy out of the mapped window while security reads are enabled.
    fn security_register_read_mapped(&mut self, _address: u32, _out: &mut [u8]) {}

    fn is_busy(&self) -> bool;

    fn clear_fifos(&mut self);

    fn clear_rx_fifo(&mut self);

    fn configure_remap_section(
        &mut self,
        _slot: u8,
        _address: u32,
        _len: u32,
        _target: u32,
    ) -> Result<(), Error> {
        Err(Error::BadOperation)
    }

    fn set_remap_enabled(&mut self, _enable: bool) {}

    fn remap_enabled(&self) -> bool {
        false
    }

    /// Controller-side low power.
    fn controller_sleep(&mut self) {}

    fn controller_wakeup(&mut self) {}

    /// Chip deep power-down.
    fn deep_power_down(&mut self) {}

    fn release_deep_power_down(&mut self) {}
}
