//! Boot-bank remap planning.
//!
//! Remapping `[address, size / 2)` onto the upper half of the device needs
//! power-of-two regions, one per controller slot. Regions are taken from the
//! top of the lower half downwards, largest first.

use super::config::MAX_REMAP_SLOTS;
use super::types::Error;
use crate::memory_map::FLASH_ADDR_MASK;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RemapRegion {
    pub slot: u8,
    /// Bus address of the region (window bits kept from the request).
    pub address: u32,
    pub len: u32,
    pub target: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RemapPlan {
    regions: [RemapRegion; MAX_REMAP_SLOTS],
    used: usize,
}

impl RemapPlan {
    /// Plans the regions for `address`/`len` on a `flash_size` device with
    /// `slots` remap slots.
    pub fn new(address: u32, len: u32, flash_size: u32, slots: u8) -> Result<Self, Error> {
        let slots = (slots as usize).min(MAX_REMAP_SLOTS);
        let half = flash_size / 2;
        let granularity = flash_size >> (slots + 1);

        let offset = address & FLASH_ADDR_MASK;
        if granularity == 0 || offset < granularity || offset % granularity != 0 {
            return Err(Error::BadAddress);
        }
        if offset as u64 + len as u64 > half as u64 {
            return Err(Error::BadLength);
        }

        let window = address & !FLASH_ADDR_MASK;
        let mut plan = Self {
            regions: [RemapRegion::default(); MAX_REMAP_SLOTS],
            used: 0,
        };
        let mut end = half;
        let mut gap = half - offset;
        while gap != 0 && plan.used < slots {
            let len = 1u32 << (31 - gap.leading_zeros());
            let region = window + end - len;
            plan.regions[plan.used] = RemapRegion {
                slot: plan.used as u8,
                address: region,
                len,
                target: region + half,
            };
            plan.used += 1;
            gap -= len;
            end -= len;
        }

        if gap != 0 {
            return Err(Error::BadLength);
        }
        Ok(plan)
    }

    pub fn regions(&self) -> &[RemapRegion] {
        &self.regions[..self.used]
    }
}
