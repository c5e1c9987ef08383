use super::types::Error;

pub const DEVICE_ID_LEN: usize = 3;
/// 16-byte unique id followed by the 2-byte CP id.
pub const UNIQUE_ID_LEN: usize = 18;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Geometry {
    pub total_size: u32,
    pub block_size: u32,
    pub sector_size: u32,
    pub page_size: u32,
}

impl Geometry {
    pub const fn new(total_size: u32, block_size: u32, sector_size: u32, page_size: u32) -> Self {
        Self {
            total_size,
            block_size,
            sector_size,
            page_size,
        }
    }

    /// Every size must be a power of two and each must divide the next one up.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        let sizes = [
            self.page_size,
            self.sector_size,
            self.block_size,
            self.total_size,
        ];
        if sizes.iter().any(|s| !s.is_power_of_two()) {
            return Err(Error::InvalidGeometry);
        }
        if sizes.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::InvalidGeometry);
        }
        Ok(())
    }

    /// Bounds check for an already masked device offset.
    pub(crate) fn check_range(&self, offset: u32, len: usize) -> Result<(), Error> {
        if offset >= self.total_size {
            return Err(Error::BadAddress);
        }
        if len > (self.total_size - offset) as usize {
            return Err(Error::BadLength);
        }
        Ok(())
    }

    pub(crate) fn boundary(&self, offset: u32) -> Boundary {
        Boundary {
            block: align_down(offset, self.block_size),
            sector: align_down(offset, self.sector_size),
        }
    }
}

/// Block and sector starts containing an address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Boundary {
    pub block: u32,
    pub sector: u32,
}

#[inline(always)]
pub(crate) const fn align_down(value: u32, unit: u32) -> u32 {
    value & !(unit - 1)
}

/// Grows `(start, len)` outward so both ends sit on `unit` boundaries.
/// `unit` must be a power of two and the grown end must not overflow.
pub(crate) fn grow_to_unit(start: u32, len: u32, unit: u32) -> (u32, u32) {
    let head = start & (unit - 1);
    let start = start - head;
    let mut len = len + head;
    let tail = len & (unit - 1);
    if tail != 0 {
        len += unit - tail;
    }
    (start, len)
}
