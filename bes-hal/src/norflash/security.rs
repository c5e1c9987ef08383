//! Security-register address space.
//!
//! The chip exposes `count` registers of `register_size` bytes, `stride`
//! bytes apart, starting at `base` in the non-cached flash window. Callers see
//! them as one contiguous space `[0, total_size)`.

use core::cmp::min;
use core::ops::Range;

use super::config::Capabilities;
use super::controller::SecRegFuse;
use super::geometry::grow_to_unit;
use super::types::Error;
use crate::memory_map::FLASH_NC_BASE;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecurityRegisters {
    /// Bus address of register 0.
    pub base: u32,
    pub register_size: u32,
    pub stride: u32,
    pub count: u32,
    pub page_size: u32,
}

/// Part of a logical range that falls in one register.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Segment {
    pub index: u32,
    /// Bus address of the first byte.
    pub address: u32,
    /// Offset of the first byte inside the register.
    pub offset: u32,
    /// Matching slice of the caller's buffer.
    pub range: Range<usize>,
}

impl SecurityRegisters {
    /// Decodes the fused layout. `Ok(None)` when the fuse leaves the feature off.
    pub fn parse(fuse: SecRegFuse, caps: &Capabilities) -> Result<Option<Self>, Error> {
        if !fuse.enabled {
            return Ok(None);
        }

        let base = match fuse.base {
            SecRegFuse::BASE_0X1000 => 0x1000,
            SecRegFuse::BASE_0X0000 => 0,
            _ => return Err(Error::BadConfig),
        };
        let register_size = match fuse.size {
            SecRegFuse::SIZE_1024 => 1024,
            SecRegFuse::SIZE_512 => 512,
            SecRegFuse::SIZE_256 => 256,
            _ => return Err(Error::BadConfig),
        };
        let stride = match fuse.offset {
            SecRegFuse::OFFSET_0X1000 => 0x1000,
            SecRegFuse::OFFSET_0X0100 => 0x0100,
            _ => return Err(Error::BadConfig),
        };
        if register_size > stride {
            return Err(Error::BadConfig);
        }
        let count = match fuse.count {
            SecRegFuse::CNT_3 => 3,
            SecRegFuse::CNT_4 => 4,
            _ => return Err(Error::BadConfig),
        };
        let mut page_size = match fuse.page_program {
            SecRegFuse::PP_256 => 256,
            SecRegFuse::PP_1024 => 1024,
            _ => return Err(Error::BadConfig),
        };
        // v1 controllers underflow the TX FIFO on longer programs.
        if caps.controller_version <= 1 && !caps.sec_reg_pp_1024 {
            page_size = 256;
        }

        Ok(Some(Self {
            base: FLASH_NC_BASE + base,
            register_size,
            stride,
            count,
            page_size: min(page_size, register_size),
        }))
    }

    pub const fn total_size(&self) -> u32 {
        self.register_size * self.count
    }

    pub(crate) fn check_range(&self, start: u32, len: usize) -> Result<(), Error> {
        let total = self.total_size();
        if start >= total {
            return Err(Error::BadAddress);
        }
        if len > (total - start) as usize {
            return Err(Error::BadLength);
        }
        Ok(())
    }

    /// Registers touched by `[start, start + len)`, as indices. An empty range
    /// inside a register still touches that register.
    pub(crate) fn covered(&self, start: u32, len: u32) -> Range<u32> {
        let (start, len) = grow_to_unit(start, len, self.register_size);
        start / self.register_size..(start + len) / self.register_size
    }

    pub(crate) fn register_address(&self, index: u32) -> u32 {
        self.base + index * self.stride
    }

    /// Splits `[start, start + len)` per register.
    pub(crate) fn segments(&self, start: u32, len: usize) -> Segments<'_> {
        Segments {
            regs: self,
            pos: start,
            done: 0,
            len,
        }
    }
}

pub(crate) struct Segments<'a> {
    regs: &'a SecurityRegisters,
    pos: u32,
    done: usize,
    len: usize,
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.done == self.len {
            return None;
        }

        let size = self.regs.register_size;
        let index = self.pos / size;
        let offset = self.pos % size;
        let take = min((size - offset) as usize, self.len - self.done);

        let seg = Segment {
            index,
            address: self.regs.register_address(index) + offset,
            offset,
            range: self.done..self.done + take,
        };
        self.pos += take as u32;
        self.done += take;
        Some(seg)
    }
}
