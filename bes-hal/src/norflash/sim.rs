//! RAM-backed controller used by the unit tests.

use core::cell::Cell;

use super::config::{CmuFreq, DecryptWindow, NorFlashConfig, OpMode, TimingOverride};
use super::controller::{ChipInfo, Controller, EraseKind, SecRegFuse};
use super::geometry::{Geometry, DEVICE_ID_LEN};
use super::remap::RemapRegion;
use super::types::{Error, Progress};
use crate::memory_map::FLASH_ADDR_MASK;

pub(crate) const SIM_ID: [u8; DEVICE_ID_LEN] = [0xc8, 0x60, 0x12];
pub(crate) const SMALL: Geometry = Geometry::new(4096, 4096, 1024, 256);
pub(crate) const SAVED_READ_MODE: u32 = 0xa5;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Op {
    Reset,
    ResetTiming,
    ApplyTimingOverride,
    ReadId,
    InitDivider,
    SetDivider(u8),
    SetMode(OpMode),
    SampleDelayCalib,
    ReadUniqueId { divider: u8 },
    MinSystemFreq(CmuFreq),
    FlashClock(CmuFreq),
    Decryption(Option<DecryptWindow>),
    PreOperation,
    PostOperation,
    Erase { address: u32, kind: EraseKind, allow_suspend: bool },
    Program { address: u32, len: usize, allow_suspend: bool },
    Read { address: u32, len: usize },
    EraseResume,
    ProgramResume,
    SuspendCheckIrq(u32),
    SecLock(u32),
    SecErase(u32),
    SecProgram { address: u32, len: usize },
    SecRead { address: u32, len: usize },
    SecEnableRead,
    SecDisableRead(u32),
    SecReadMapped { address: u32, len: usize },
    ClearFifos,
    ClearRxFifo,
    RemapSection(RemapRegion),
    RemapEnable(bool),
    ControllerSleep,
    ControllerWakeup,
    DeepPowerDown,
    ReleaseDeepPowerDown,
}

#[derive(Clone, Debug)]
enum Pending {
    Erase(u32, EraseKind),
    Program(u32, Vec<u8>),
}

pub(crate) struct SimController {
    pub mem: Vec<u8>,
    pub sec_mem: Vec<u8>,
    pub chip: Option<ChipInfo>,
    pub id: [u8; DEVICE_ID_LEN],
    /// Id seen once the divider has been switched, if it differs.
    pub id_after_divider: Option<[u8; DEVICE_ID_LEN]>,
    pub fuse: SecRegFuse,
    pub fail_init_divider: bool,
    pub fail_calib: bool,
    pub fail_set_mode: bool,
    pub fail_erase_at: Option<u32>,
    pub fail_remap_slot: Option<u8>,
    pub rx_fifo_size: usize,
    pub divider: u8,
    pub remap: Vec<RemapRegion>,
    pub remap_on: bool,
    /// Polls that still report busy; `u32::MAX` never goes idle.
    pub busy_polls: Cell<u32>,
    divider_switched: bool,
    suspend_in: Option<usize>,
    resuspend: u32,
    pending: Option<Pending>,
    in_bracket: bool,
    brackets: usize,
    log: Vec<Op>,
}

impl SimController {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            mem: vec![0xff; geometry.total_size as usize],
            sec_mem: vec![0xff; 0x4000],
            chip: Some(ChipInfo {
                geometry,
                supported_modes: OpMode::ALL_ACCESS | OpMode::SUSPEND,
            }),
            id: SIM_ID,
            id_after_divider: None,
            fuse: SecRegFuse {
                enabled: true,
                base: SecRegFuse::BASE_0X1000,
                size: SecRegFuse::SIZE_1024,
                offset: SecRegFuse::OFFSET_0X1000,
                count: SecRegFuse::CNT_3,
                page_program: SecRegFuse::PP_256,
            },
            fail_init_divider: false,
            fail_calib: false,
            fail_set_mode: false,
            fail_erase_at: None,
            fail_remap_slot: None,
            rx_fifo_size: 16,
            divider: 8,
            remap: Vec::new(),
            remap_on: false,
            busy_polls: Cell::new(0),
            divider_switched: false,
            suspend_in: None,
            resuspend: 0,
            pending: None,
            in_bracket: false,
            brackets: 0,
            log: Vec::new(),
        }
    }

    /// 4 KiB device: one block, four 1 KiB sectors, 256-byte pages.
    pub fn small() -> Self {
        Self::new(SMALL)
    }

    /// The `n`th suspendable erase/program from now (0-based) gets suspended.
    pub fn suspend_after(&mut self, n: usize) {
        self.suspend_in = Some(n);
    }

    /// Resumes report `Suspended` again this many times before finishing.
    pub fn resuspend(&mut self, times: u32) {
        self.resuspend = times;
    }

    pub fn without_suspend(&mut self) {
        if let Some(chip) = self.chip.as_mut() {
            chip.supported_modes = OpMode::ALL_ACCESS;
        }
    }

    pub fn ops(&self) -> Vec<Op> {
        self.log.clone()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn brackets(&self) -> usize {
        self.brackets
    }

    pub fn in_bracket(&self) -> bool {
        self.in_bracket
    }

    fn record(&mut self, op: Op) {
        self.log.push(op);
    }

    fn should_suspend(&mut self, allow: bool) -> bool {
        if !allow {
            return false;
        }
        match self.suspend_in {
            Some(0) => {
                self.suspend_in = None;
                true
            }
            Some(n) => {
                self.suspend_in = Some(n - 1);
                false
            }
            None => false,
        }
    }

    fn geometry(&self) -> Geometry {
        self.chip.map(|c| c.geometry).unwrap_or(SMALL)
    }

    fn apply_erase(&mut self, address: u32, kind: EraseKind) {
        let g = self.geometry();
        let (start, len) = match kind {
            EraseKind::Chip => (0, g.total_size),
            EraseKind::Block => (address, g.block_size),
            EraseKind::Sector => (address, g.sector_size),
        };
        let start = start as usize;
        self.mem[start..start + len as usize].fill(0xff);
    }

    fn apply_program(&mut self, address: u32, data: &[u8]) {
        let start = address as usize;
        for (cell, byte) in self.mem[start..start + data.len()].iter_mut().zip(data) {
            *cell &= *byte;
        }
    }

    fn sec_index(address: u32) -> usize {
        (address & FLASH_ADDR_MASK) as usize
    }
}

impl Controller for SimController {
    fn reset(&mut self) {
        self.divider_switched = false;
        self.record(Op::Reset);
    }

    fn reset_timing(&mut self) {
        self.divider = 8;
        self.record(Op::ResetTiming);
    }

    fn apply_timing_override(&mut self, timing: &TimingOverride) {
        self.divider = timing.divider;
        self.record(Op::ApplyTimingOverride);
    }

    fn read_id(&mut self, id: &mut [u8; DEVICE_ID_LEN]) {
        self.record(Op::ReadId);
        *id = match self.id_after_divider {
            Some(other) if self.divider_switched => other,
            _ => self.id,
        };
    }

    fn match_chip(&mut self, _id: &[u8; DEVICE_ID_LEN]) -> Option<ChipInfo> {
        self.chip
    }

    fn init_divider(&mut self, config: &NorFlashConfig) -> Result<(), Error> {
        self.record(Op::InitDivider);
        if self.fail_init_divider {
            return Err(Error::Controller);
        }
        self.divider = (config.source_clock_hz / config.speed_hz).max(1) as u8;
        self.divider_switched = true;
        Ok(())
    }

    fn divider(&self) -> u8 {
        self.divider
    }

    fn set_divider(&mut self, divider: u8) {
        self.divider = divider;
        self.record(Op::SetDivider(divider));
    }

    fn set_mode(&mut self, mode: OpMode) -> Result<(), Error> {
        self.record(Op::SetMode(mode));
        if self.fail_set_mode {
            return Err(Error::Controller);
        }
        Ok(())
    }

    fn sample_delay_calib(&mut self) -> Result<(), Error> {
        self.record(Op::SampleDelayCalib);
        if self.fail_calib {
            return Err(Error::Controller);
        }
        Ok(())
    }

    fn read_unique_id(&mut self, out: &mut [u8]) -> Result<(), Error> {
        self.record(Op::ReadUniqueId {
            divider: self.divider,
        });
        for (i, b) in out.iter_mut().enumerate() {
            *b = i as u8 + 1;
        }
        Ok(())
    }

    fn request_min_system_freq(&mut self, freq: CmuFreq) {
        self.record(Op::MinSystemFreq(freq));
    }

    fn set_flash_clock(&mut self, freq: CmuFreq) {
        self.record(Op::FlashClock(freq));
    }

    fn configure_decryption(&mut self, window: Option<DecryptWindow>) {
        self.record(Op::Decryption(window));
    }

    fn pre_operation(&mut self) {
        assert!(!self.in_bracket, "sim bracket nested");
        self.in_bracket = true;
        self.brackets += 1;
        self.record(Op::PreOperation);
    }

    fn post_operation(&mut self) {
        assert!(self.in_bracket, "sim bracket not open");
        self.in_bracket = false;
        self.record(Op::PostOperation);
    }

    fn erase(
        &mut self,
        address: u32,
        kind: EraseKind,
        allow_suspend: bool,
    ) -> Result<Progress, Error> {
        assert!(self.in_bracket, "erase outside bracket");
        self.record(Op::Erase {
            address,
            kind,
            allow_suspend,
        });
        if self.fail_erase_at == Some(address) {
            return Err(Error::Controller);
        }
        if self.should_suspend(allow_suspend) {
            self.pending = Some(Pending::Erase(address, kind));
            return Ok(Progress::Suspended);
        }
        self.apply_erase(address, kind);
        Ok(Progress::Done)
    }

    fn program(
        &mut self,
        address: u32,
        data: &[u8],
        allow_suspend: bool,
    ) -> Result<Progress, Error> {
        assert!(self.in_bracket, "program outside bracket");
        self.record(Op::Program {
            address,
            len: data.len(),
            allow_suspend,
        });
        if self.should_suspend(allow_suspend) {
            self.pending = Some(Pending::Program(address, data.to_vec()));
            return Ok(Progress::Suspended);
        }
        self.apply_program(address, data);
        Ok(Progress::Done)
    }

    fn read(&mut self, address: u32, out: &mut [u8]) -> Result<(), Error> {
        assert!(self.in_bracket, "read outside bracket");
        assert!(out.len() <= self.rx_fifo_size, "read larger than rx fifo");
        self.record(Op::Read {
            address,
            len: out.len(),
        });
        let start = address as usize;
        out.copy_from_slice(&self.mem[start..start + out.len()]);
        Ok(())
    }

    fn erase_resume(&mut self, allow_suspend: bool) -> Result<Progress, Error> {
        self.record(Op::EraseResume);
        let Some(Pending::Erase(address, kind)) = self.pending.clone() else {
            return Err(Error::BadOperation);
        };
        if allow_suspend && self.resuspend > 0 {
            self.resuspend -= 1;
            return Ok(Progress::Suspended);
        }
        self.pending = None;
        self.apply_erase(address, kind);
        Ok(Progress::Done)
    }

    fn program_resume(&mut self, allow_suspend: bool) -> Result<Progress, Error> {
        self.record(Op::ProgramResume);
        let Some(Pending::Program(address, data)) = self.pending.clone() else {
            return Err(Error::BadOperation);
        };
        if allow_suspend && self.resuspend > 0 {
            self.resuspend -= 1;
            return Ok(Progress::Suspended);
        }
        self.pending = None;
        self.apply_program(address, &data);
        Ok(Progress::Done)
    }

    fn suspend_check_irq(&mut self, irq: u32) -> Result<(), Error> {
        self.record(Op::SuspendCheckIrq(irq));
        if irq >= 128 {
            return Err(Error::Controller);
        }
        Ok(())
    }

    fn security_register_config(&mut self) -> SecRegFuse {
        self.fuse
    }

    fn security_register_lock(&mut self, index: u32) -> Result<(), Error> {
        self.record(Op::SecLock(index));
        Ok(())
    }

    fn security_register_erase(&mut self, address: u32) -> Result<(), Error> {
        self.record(Op::SecErase(address));
        let start = Self::sec_index(address);
        self.sec_mem[start..start + 1024].fill(0xff);
        Ok(())
    }

    fn security_register_program(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        self.record(Op::SecProgram {
            address,
            len: data.len(),
        });
        let start = Self::sec_index(address);
        for (cell, byte) in self.sec_mem[start..start + data.len()].iter_mut().zip(data) {
            *cell &= *byte;
        }
        Ok(())
    }

    fn security_register_read(&mut self, address: u32, out: &mut [u8]) -> Result<(), Error> {
        assert!(out.len() <= self.rx_fifo_size, "read larger than rx fifo");
        self.record(Op::SecRead {
            address,
            len: out.len(),
        });
        let start = Self::sec_index(address);
        out.copy_from_slice(&self.sec_mem[start..start + out.len()]);
        Ok(())
    }

    fn security_register_enable_read(&mut self) -> u32 {
        self.record(Op::SecEnableRead);
        SAVED_READ_MODE
    }

    fn security_register_disable_read(&mut self, saved_mode: u32) {
        self.record(Op::SecDisableRead(saved_mode));
    }

    fn security_register_read_mapped(&mut self, address: u32, out: &mut [u8]) {
        self.record(Op::SecReadMapped {
            address,
            len: out.len(),
        });
        let start = Self::sec_index(address);
        out.copy_from_slice(&self.sec_mem[start..start + out.len()]);
    }

    fn is_busy(&self) -> bool {
        let left = self.busy_polls.get();
        if left == 0 {
            return false;
        }
        if left != u32::MAX {
            self.busy_polls.set(left - 1);
        }
        true
    }

    fn clear_fifos(&mut self) {
        self.record(Op::ClearFifos);
    }

    fn clear_rx_fifo(&mut self) {
        self.record(Op::ClearRxFifo);
    }

    fn configure_remap_section(
        &mut self,
        slot: u8,
        address: u32,
        len: u32,
        target: u32,
    ) -> Result<(), Error> {
        let region = RemapRegion {
            slot,
            address,
            len,
            target,
        };
        self.record(Op::RemapSection(region));
        if self.fail_remap_slot == Some(slot) {
            return Err(Error::Controller);
        }
        self.remap.push(region);
        Ok(())
    }

    fn set_remap_enabled(&mut self, enable: bool) {
        self.remap_on = enable;
        self.record(Op::RemapEnable(enable));
    }

    fn remap_enabled(&self) -> bool {
        self.remap_on
    }

    fn controller_sleep(&mut self) {
        self.record(Op::ControllerSleep);
    }

    fn controller_wakeup(&mut self) {
        self.record(Op::ControllerWakeup);
    }

    fn deep_power_down(&mut self) {
        self.record(Op::DeepPowerDown);
    }

    fn release_deep_power_down(&mut self) {
        self.record(Op::ReleaseDeepPowerDown);
    }
}
