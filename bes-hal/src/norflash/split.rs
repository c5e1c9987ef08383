//! Range splitting into native operations.
//!
//! Each cursor advances past a step as soon as it hands it out, so after any
//! step the cursor position is exactly the work still left.

use core::cmp::min;
use core::ops::Range;

use super::controller::EraseKind;
use super::geometry::Geometry;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct EraseStep {
    pub address: u32,
    pub kind: EraseKind,
}

/// Erase cursor over a sector-aligned range.
#[derive(Clone, Debug)]
pub(crate) struct EraseSteps {
    address: u32,
    remaining: u32,
    geometry: Geometry,
}

impl EraseSteps {
    pub fn new(address: u32, remaining: u32, geometry: Geometry) -> Self {
        Self {
            address,
            remaining,
            geometry,
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Iterator for EraseSteps {
    type Item = EraseStep;

    fn next(&mut self) -> Option<EraseStep> {
        if self.remaining == 0 {
            return None;
        }

        let g = &self.geometry;
        let address = self.address;
        let (kind, len) = if address == 0 && self.remaining >= g.total_size {
            (EraseKind::Chip, self.remaining)
        } else if self.remaining >= g.block_size && address & (g.block_size - 1) == 0 {
            (EraseKind::Block, g.block_size)
        } else {
            (EraseKind::Sector, g.sector_size)
        };

        self.address = address + len;
        self.remaining = self.remaining.saturating_sub(len);
        Some(EraseStep { address, kind })
    }
}

/// One transfer: device address plus the matching slice of the caller's buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Chunk {
    pub address: u32,
    pub range: Range<usize>,
}

/// Byte-range cursor producing chunks of at most `max` bytes, optionally
/// never crossing a `page` boundary.
#[derive(Clone, Debug)]
pub(crate) struct Chunks {
    address: u32,
    offset: usize,
    end: usize,
    page: Option<u32>,
    max: usize,
}

impl Chunks {
    /// Page-bounded chunks for programming.
    pub fn paged(address: u32, range: Range<usize>, page: u32) -> Self {
        Self {
            address,
            offset: range.start,
            end: range.end,
            page: Some(page),
            max: page as usize,
        }
    }

    /// Fixed-size chunks for FIFO reads.
    pub fn bounded(address: u32, range: Range<usize>, max: usize) -> Self {
        Self {
            address,
            offset: range.start,
            end: range.end,
            page: None,
            max,
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.end - self.offset
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let remaining = self.remaining();
        if remaining == 0 {
            return None;
        }

        let mut len = min(remaining, self.max);
        if let Some(page) = self.page {
            let page_left = (page - (self.address & (page - 1))) as usize;
            len = min(len, page_left);
        }

        let chunk = Chunk {
            address: self.address,
            range: self.offset..self.offset + len,
        };
        self.address += len as u32;
        self.offset += len;
        Some(chunk)
    }
}
