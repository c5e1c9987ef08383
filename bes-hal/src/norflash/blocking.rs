use core::hint::spin_loop;

use embedded_storage::nor_flash::{
    check_erase, check_write, ErrorType, NorFlash as EmbeddedNorFlash,
    ReadNorFlash as EmbeddedReadNorFlash,
};

use super::config::{validate, Capabilities, CmuFreq, NorFlashConfig, OpMode};
use super::controller::Controller;
use super::geometry::{grow_to_unit, Boundary, Geometry, DEVICE_ID_LEN, UNIQUE_ID_LEN};
use super::remap::RemapPlan;
use super::security::SecurityRegisters;
use super::sequencer::Sequencer;
use super::split::{Chunks, EraseSteps};
use super::suspend::{Snapshot, SuspendState};
use super::types::{Error, Progress};
use crate::memory_map::{flash_offset, window_base};

/// Divider used while reading the unique id on v1 controllers.
const V1_UNIQUE_ID_DIVIDER: u8 = 8;

struct DeviceContext {
    opened: bool,
    open_state: Result<(), Error>,
    geometry: Geometry,
    supported_modes: OpMode,
    device_id: [u8; DEVICE_ID_LEN],
    unique_id: [u8; UNIQUE_ID_LEN],
}

impl DeviceContext {
    const fn new() -> Self {
        Self {
            opened: false,
            open_state: Err(Error::NotOpened),
            geometry: Geometry::new(0, 0, 0, 0),
            supported_modes: OpMode::NONE,
            device_id: [0; DEVICE_ID_LEN],
            unique_id: [0; UNIQUE_ID_LEN],
        }
    }
}

/// Driver for one NOR flash device.
pub struct NorFlash<C: Controller> {
    ctrl: C,
    sequencer: &'static Sequencer,
    config: NorFlashConfig,
    caps: Capabilities,
    ctx: DeviceContext,
    snapshot: Snapshot,
    security: Option<SecurityRegisters>,
    asleep: bool,
}

impl<C: Controller> NorFlash<C> {
    /// Builds a closed driver. Nothing touches the hardware until [`open`](Self::open).
    pub fn new(
        ctrl: C,
        sequencer: &'static Sequencer,
        config: NorFlashConfig,
        caps: Capabilities,
    ) -> Result<Self, Error> {
        validate(&config, &caps)?;
        Ok(Self {
            ctrl,
            sequencer,
            config,
            caps,
            ctx: DeviceContext::new(),
            snapshot: Snapshot::IDLE,
            security: None,
            asleep: false,
        })
    }

    /// Boot-time bring-up: program the flash source clock, open, and drop back
    /// to 26 MHz if the open fails.
    pub fn init(&mut self) -> Result<(), Error> {
        self.ctrl
            .set_flash_clock(CmuFreq::from_flash_clock(self.config.source_clock_hz));

        let result = self.open();
        if result.is_err() {
            self.ctrl.set_flash_clock(CmuFreq::F26M);
        }
        result
    }

    /// Identifies the chip and brings the controller to the configured speed.
    /// The outcome is kept and available from [`open_state`](Self::open_state).
    pub fn open(&mut self) -> Result<(), Error> {
        self.ctx.opened = false;
        self.snapshot.clear();
        self.security = None;

        let result = self.open_sequence();
        match result {
            Ok(()) => {
                self.ctx.opened = true;
                debug!(
                    "norflash opened: id {:?} size {}",
                    self.ctx.device_id,
                    self.ctx.geometry.total_size
                );
            }
            Err(e) => {
                self.ctrl.reset_timing();
                warn!("norflash open failed: {:?}", e);
            }
        }
        self.ctx.open_state = result;
        result
    }

    fn open_sequence(&mut self) -> Result<(), Error> {
        let config = self.config;
        let caps = self.caps;

        self.ctrl.reset_timing();
        self.ctrl.reset();
        if let Some(timing) = config.timing_override.as_ref() {
            self.ctrl.apply_timing_override(timing);
        }

        let mut id = [0u8; DEVICE_ID_LEN];
        self.ctrl.read_id(&mut id);
        self.ctx.device_id = id;
        let chip = self.ctrl.match_chip(&id).ok_or(Error::BadId)?;
        trace!("norflash id {:?} matched", id);

        if config.timing_override.is_none() {
            self.ctrl
                .init_divider(&config)
                .map_err(|_| Error::BadDivider)?;

            let mut again = [0u8; DEVICE_ID_LEN];
            self.ctrl.read_id(&mut again);
            if again != id {
                return Err(Error::DividerVerifyFailed);
            }
        }

        chip.geometry.validate()?;
        self.ctx.geometry = chip.geometry;
        self.ctx.supported_modes = chip.supported_modes;

        if caps.security_register {
            let fuse = self.ctrl.security_register_config();
            self.security = SecurityRegisters::parse(fuse, &caps)?;
        }

        if caps.unique_id {
            self.read_unique_id()?;
        }

        if caps.controller_version <= 1 && !caps.low_speed {
            self.ctrl.request_min_system_freq(CmuFreq::F52M);
        }

        self.ctrl
            .set_mode(config.effective_mode())
            .map_err(|_| Error::BadOperation)?;

        self.ctrl
            .configure_decryption(config.decrypt.filter(|d| d.size > 0));

        if config.timing_override.is_none() {
            self.ctrl
                .sample_delay_calib()
                .map_err(|_| Error::CalibrationFailed)?;
        }

        Ok(())
    }

    fn read_unique_id(&mut self) -> Result<(), Error> {
        let mut uid = [0u8; UNIQUE_ID_LEN];
        if self.caps.controller_version <= 1 {
            // Slow down to keep the RX FIFO from overflowing.
            let old = self.ctrl.divider();
            self.ctrl.set_divider(V1_UNIQUE_ID_DIVIDER);
            let result = self.ctrl.read_unique_id(&mut uid);
            self.ctrl.set_divider(old);
            result?;
        } else {
            self.ctrl.read_unique_id(&mut uid)?;
        }
        self.ctx.unique_id = uid;
        Ok(())
    }

    /// Marks the device closed. The hardware is left as is.
    pub fn close(&mut self) -> Result<(), Error> {
        self.ctx.opened = false;
        Ok(())
    }

    pub fn is_opened(&self) -> bool {
        self.ctx.opened
    }

    /// Outcome of the last [`open`](Self::open); `Err(NotOpened)` before the first one.
    pub fn open_state(&self) -> Result<(), Error> {
        self.ctx.open_state
    }

    pub fn geometry(&self) -> Geometry {
        self.ctx.geometry
    }

    pub fn total_size(&self) -> u32 {
        self.ctx.geometry.total_size
    }

    /// Id bytes read by the last open, whether or not it succeeded.
    pub fn device_id(&self) -> [u8; DEVICE_ID_LEN] {
        self.ctx.device_id
    }

    pub fn unique_id(&self) -> [u8; UNIQUE_ID_LEN] {
        self.ctx.unique_id
    }

    pub fn security_registers(&self) -> Option<SecurityRegisters> {
        self.security
    }

    pub fn suspend_state(&self) -> SuspendState {
        self.snapshot.state
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn is_busy(&self) -> bool {
        self.ctrl.is_busy()
    }

    pub fn controller(&self) -> &C {
        &self.ctrl
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.ctrl
    }

    pub fn release(self) -> C {
        self.ctrl
    }

    /// Block and sector starts around `address`, in the same flash window.
    pub fn boundary(&self, address: u32) -> Result<Boundary, Error> {
        self.assert_opened();

        let base = window_base(address, self.ctx.geometry.total_size).ok_or(Error::BadAddress)?;
        let inner = self.ctx.geometry.boundary(address - base);
        Ok(Boundary {
            block: base + inner.block,
            sector: base + inner.sector,
        })
    }

    pub fn erase_chip(&mut self) -> Result<(), Error> {
        self.assert_opened();
        self.erase(0, self.ctx.geometry.total_size)
    }

    /// Erases every sector touched by `[address, address + len)`.
    pub fn erase(&mut self, address: u32, len: u32) -> Result<(), Error> {
        let _ = self.erase_suspend(address, len, false)?;
        Ok(())
    }

    /// Like [`erase`](Self::erase), but lets the chip pause the operation.
    /// On `Suspended`, finish with [`erase_resume`](Self::erase_resume).
    pub fn erase_suspend(
        &mut self,
        address: u32,
        len: u32,
        allow_suspend: bool,
    ) -> Result<Progress, Error> {
        self.assert_opened();
        if self.snapshot.is_pending() {
            return Err(Error::BadOperation);
        }
        let allow_suspend = allow_suspend && self.suspend_supported();
        self.erase_range(address, len, allow_suspend)
    }

    pub fn erase_resume(&mut self, allow_suspend: bool) -> Result<Progress, Error> {
        self.assert_opened();
        if self.snapshot.state != SuspendState::Erase || !self.suspend_supported() {
            return Err(Error::BadOperation);
        }

        if self.resume_hardware(|ctrl| ctrl.erase_resume(allow_suspend))? {
            return Ok(Progress::Suspended);
        }
        let snap = self.snapshot;
        if snap.remaining == 0 {
            self.snapshot.clear();
            return Ok(Progress::Done);
        }
        self.erase_range(snap.next_address, snap.remaining, allow_suspend)
    }

    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        let _ = self.write_suspend(address, data, false)?;
        Ok(())
    }

    /// Like [`write`](Self::write), but lets the chip pause the operation.
    /// On `Suspended`, finish with [`write_resume`](Self::write_resume) and the same buffer.
    pub fn write_suspend(
        &mut self,
        address: u32,
        data: &[u8],
        allow_suspend: bool,
    ) -> Result<Progress, Error> {
        self.assert_opened();
        if self.snapshot.is_pending() {
            return Err(Error::BadOperation);
        }
        let allow_suspend = allow_suspend && self.suspend_supported();
        self.program_range(address, data, 0, allow_suspend)
    }

    /// `data` must be the buffer passed to the suspended [`write_suspend`](Self::write_suspend).
    pub fn write_resume(&mut self, data: &[u8], allow_suspend: bool) -> Result<Progress, Error> {
        self.assert_opened();
        if self.snapshot.state != SuspendState::Program || !self.suspend_supported() {
            return Err(Error::BadOperation);
        }
        if data.len() != self.snapshot.buffer_len {
            return Err(Error::BadLength);
        }

        if self.resume_hardware(|ctrl| ctrl.program_resume(allow_suspend))? {
            return Ok(Progress::Suspended);
        }
        let snap = self.snapshot;
        if snap.remaining == 0 {
            self.snapshot.clear();
            return Ok(Progress::Done);
        }
        self.program_range(snap.next_address, data, snap.buffer_offset, allow_suspend)
    }

    pub fn read(&mut self, address: u32, out: &mut [u8]) -> Result<(), Error> {
        self.assert_opened();
        let offset = flash_offset(address);
        self.ctx.geometry.check_range(offset, out.len())?;
        if out.is_empty() {
            return Ok(());
        }

        let fifo = self.caps.rx_fifo_size;
        self.sequencer.run(&mut self.ctrl, |ctrl| {
            for chunk in Chunks::bounded(offset, 0..out.len(), fifo) {
                ctrl.read(chunk.address, &mut out[chunk.range])?;
            }
            Ok(())
        })
    }

    /// Lets `irq` interrupt a suspendable erase or program.
    pub fn suspend_check_irq(&mut self, irq: u32) -> Result<(), Error> {
        if !self.caps.suspend {
            return Ok(());
        }
        self.ctrl.suspend_check_irq(irq)
    }

    pub fn security_register_lock(&mut self, start: u32, len: u32) -> Result<(), Error> {
        self.assert_opened();
        let regs = self.security.ok_or(Error::BadOperation)?;
        regs.check_range(start, len as usize)?;
        let covered = regs.covered(start, len);
        if covered.is_empty() {
            return Ok(());
        }

        self.sequencer.run(&mut self.ctrl, |ctrl| {
            for index in covered {
                ctrl.security_register_lock(index)?;
            }
            Ok(())
        })
    }

    pub fn security_register_erase(&mut self, start: u32, len: u32) -> Result<(), Error> {
        self.assert_opened();
        let regs = self.security.ok_or(Error::BadOperation)?;
        regs.check_range(start, len as usize)?;
        let covered = regs.covered(start, len);
        if covered.is_empty() {
            return Ok(());
        }

        self.sequencer.run(&mut self.ctrl, |ctrl| {
            for index in covered {
                ctrl.security_register_erase(regs.register_address(index))?;
            }
            Ok(())
        })
    }

    pub fn security_register_write(&mut self, start: u32, data: &[u8]) -> Result<(), Error> {
        self.assert_opened();
        let regs = self.security.ok_or(Error::BadOperation)?;
        regs.check_range(start, data.len())?;

        self.sequencer.run(&mut self.ctrl, |ctrl| {
            for seg in regs.segments(start, data.len()) {
                let reg_base = regs.register_address(seg.index);
                for chunk in Chunks::paged(seg.offset, seg.range, regs.page_size) {
                    ctrl.security_register_program(reg_base + chunk.address, &data[chunk.range])?;
                }
            }
            Ok(())
        })
    }

    pub fn security_register_read(&mut self, start: u32, out: &mut [u8]) -> Result<(), Error> {
        self.assert_opened();
        let regs = self.security.ok_or(Error::BadOperation)?;
        regs.check_range(start, out.len())?;

        let fifo = self.caps.rx_fifo_size;
        if self.caps.sec_reg_fifo_read {
            return self.sequencer.run(&mut self.ctrl, |ctrl| {
                for seg in regs.segments(start, out.len()) {
                    for chunk in Chunks::bounded(seg.address, seg.range, fifo) {
                        ctrl.security_register_read(chunk.address, &mut out[chunk.range])?;
                    }
                }
                Ok(())
            });
        }

        self.sequencer.run(&mut self.ctrl, |ctrl| {
            let mode = ctrl.security_register_enable_read();
            for seg in regs.segments(start, out.len()) {
                ctrl.security_register_read_mapped(seg.address, &mut out[seg.range]);
            }
            ctrl.security_register_disable_read(mode);
            Ok(())
        })
    }

    /// Maps `[address, size / 2)` onto the upper half of the device.
    pub fn enable_remap(&mut self, address: u32, len: u32) -> Result<(), Error> {
        if !self.caps.supports_remap() {
            return Err(Error::BadOperation);
        }
        if !self.ctx.opened {
            return Err(Error::NotOpened);
        }

        let mut flash_size = self.ctx.geometry.total_size;
        if let Some(limit) = self.config.remap_size_limit {
            flash_size = flash_size.min(limit);
        }
        let plan = RemapPlan::new(address, len, flash_size, self.caps.remap_slots)?;

        self.wait_idle()?;
        for region in plan.regions() {
            trace!(
                "norflash remap slot {}: {:x}+{:x} -> {:x}",
                region.slot,
                region.address,
                region.len,
                region.target
            );
            self.ctrl
                .configure_remap_section(region.slot, region.address, region.len, region.target)
                .map_err(|_| Error::BadOperation)?;
        }
        debug!(
            "norflash remap from {:x}, {} regions",
            address,
            plan.regions().len()
        );

        self.re_enable_remap()
    }

    pub fn disable_remap(&mut self) -> Result<(), Error> {
        self.toggle_remap(false)
    }

    pub fn re_enable_remap(&mut self) -> Result<(), Error> {
        self.toggle_remap(true)
    }

    pub fn remap_status(&self) -> bool {
        self.ctrl.remap_enabled()
    }

    /// Puts flash and controller in low power. Until [`wakeup`](Self::wakeup)
    /// the command bracket stays held unless the chip has deep power-down.
    pub fn sleep(&mut self) -> Result<(), Error> {
        if !self.ctx.opened || self.asleep {
            return Ok(());
        }

        if self.caps.deep_sleep {
            self.ctrl.deep_power_down();
        } else {
            self.sequencer.enter(&mut self.ctrl);
        }
        self.asleep = true;

        self.wait_idle()?;
        self.ctrl.controller_sleep();
        Ok(())
    }

    pub fn wakeup(&mut self) -> Result<(), Error> {
        if !self.ctx.opened || !self.asleep {
            return Ok(());
        }

        self.ctrl.controller_wakeup();
        if self.caps.deep_sleep {
            self.ctrl.release_deep_power_down();
        } else {
            self.sequencer.leave(&mut self.ctrl);
        }
        self.asleep = false;

        self.ctrl.clear_rx_fifo();
        self.wait_idle()
    }

    fn toggle_remap(&mut self, enable: bool) -> Result<(), Error> {
        if !self.caps.supports_remap() {
            return Err(Error::BadOperation);
        }
        self.wait_idle()?;
        self.ctrl.set_remap_enabled(enable);
        self.wait_idle()?;
        self.ctrl.clear_fifos();
        Ok(())
    }

    fn erase_range(
        &mut self,
        address: u32,
        len: u32,
        allow_suspend: bool,
    ) -> Result<Progress, Error> {
        let geometry = self.ctx.geometry;
        let offset = flash_offset(address);
        geometry.check_range(offset, len as usize)?;

        // An unaligned empty range still pulls in its sector.
        let (start, len) = grow_to_unit(offset, len, geometry.sector_size);
        if len == 0 {
            self.snapshot.clear();
            return Ok(Progress::Done);
        }
        let mut steps = EraseSteps::new(start, len, geometry);

        let result = self.sequencer.run(&mut self.ctrl, |ctrl| {
            for step in steps.by_ref() {
                if ctrl.erase(step.address, step.kind, allow_suspend)?.is_suspended() {
                    return Ok(Progress::Suspended);
                }
            }
            Ok(Progress::Done)
        });

        if let Ok(Progress::Suspended) = result {
            self.snapshot.park_erase(steps.address(), steps.remaining());
            debug!(
                "norflash erase suspended at {:x}, {} left",
                steps.address(),
                steps.remaining()
            );
        } else {
            self.snapshot.clear();
        }
        result
    }

    fn program_range(
        &mut self,
        address: u32,
        data: &[u8],
        from: usize,
        allow_suspend: bool,
    ) -> Result<Progress, Error> {
        let geometry = self.ctx.geometry;
        let offset = flash_offset(address);
        geometry.check_range(offset, data.len() - from)?;
        if from == data.len() {
            self.snapshot.clear();
            return Ok(Progress::Done);
        }

        let mut chunks = Chunks::paged(offset, from..data.len(), geometry.page_size);

        let result = self.sequencer.run(&mut self.ctrl, |ctrl| {
            for chunk in chunks.by_ref() {
                if ctrl
                    .program(chunk.address, &data[chunk.range], allow_suspend)?
                    .is_suspended()
                {
                    return Ok(Progress::Suspended);
                }
            }
            Ok(Progress::Done)
        });

        if let Ok(Progress::Suspended) = result {
            self.snapshot.park_program(
                chunks.address(),
                chunks.offset(),
                chunks.remaining(),
                data.len(),
            );
            debug!(
                "norflash program suspended at {:x}, {} left",
                chunks.address(),
                chunks.remaining()
            );
        } else {
            self.snapshot.clear();
        }
        result
    }

    /// Resumes the chip-side operation. `Ok(true)` when it paused again.
    fn resume_hardware(
        &mut self,
        resume: impl FnOnce(&mut C) -> Result<Progress, Error>,
    ) -> Result<bool, Error> {
        match self.sequencer.run(&mut self.ctrl, resume) {
            Ok(Progress::Suspended) => {
                trace!("norflash resume suspended again");
                Ok(true)
            }
            Ok(Progress::Done) => Ok(false),
            Err(e) => {
                warn!("norflash resume failed: {:?}", e);
                self.snapshot.clear();
                Err(e)
            }
        }
    }

    fn suspend_supported(&self) -> bool {
        self.caps.suspend && self.ctx.supported_modes.contains(OpMode::SUSPEND)
    }

    fn wait_idle(&self) -> Result<(), Error> {
        for _ in 0..self.config.max_busy_polls {
            if !self.ctrl.is_busy() {
                return Ok(());
            }
            spin_loop();
        }
        warn!("norflash controller stuck busy");
        Err(Error::Timeout)
    }

    /// Length of a non-empty embedded-storage `from..to` erase. Devices with
    /// sectors larger than `ERASE_SIZE` also need sector alignment.
    pub(crate) fn erase_span(&self, from: u32, to: u32) -> Result<u32, Error> {
        check_erase(self, from, to).map_err(Error::from)?;
        let sector = self.ctx.geometry.sector_size;
        if sector == 0 || from % sector != 0 || to % sector != 0 {
            return Err(Error::NotAligned);
        }
        Ok(to - from)
    }

    #[inline(always)]
    fn assert_opened(&self) {
        assert!(self.ctx.opened, "norflash not opened");
    }
}

impl<C: Controller> ErrorType for NorFlash<C> {
    type Error = Error;
}

impl<C: Controller> EmbeddedReadNorFlash for NorFlash<C> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        NorFlash::read(self, offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.total_size() as usize
    }
}

impl<C: Controller> EmbeddedNorFlash for NorFlash<C> {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = 4096;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from == to {
            return Ok(());
        }
        let len = self.erase_span(from, to)?;
        NorFlash::erase(self, from, len)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if bytes.is_empty() {
            return Ok(());
        }
        check_write(self, offset, bytes.len()).map_err(Error::from)?;
        NorFlash::write(self, offset, bytes)
    }
}
