//! Platform address map constants.
//!
//! The NOR flash is visible through four aliased windows: cached and
//! non-cached, each on the system bus and the code bus. A flash offset is the
//! low [`FLASH_ADDR_MASK`] bits of any of them.

/// Cached flash window on the system bus.
pub const FLASH_BASE: u32 = 0x3C00_0000;
/// Non-cached flash window on the system bus.
pub const FLASH_NC_BASE: u32 = 0x3800_0000;
/// Cached flash window on the code bus.
pub const FLASHX_BASE: u32 = 0x0C00_0000;
/// Non-cached flash window on the code bus.
pub const FLASHX_NC_BASE: u32 = 0x0800_0000;

/// Bits of a bus address that select the byte inside the flash device.
pub const FLASH_ADDR_MASK: u32 = 0x00FF_FFFF;

/// Largest flash the memory map reserves room for.
pub const FLASH_SIZE: u32 = 0x0100_0000;

/// Flash control register block.
pub const FLASH_CTRL_BASE: u32 = 0x4014_0000;

/// All flash windows, in the order boundary lookups probe them.
pub const FLASH_WINDOWS: [u32; 4] = [FLASH_BASE, FLASHX_BASE, FLASH_NC_BASE, FLASHX_NC_BASE];

/// Strips the window bits from `address`.
#[inline(always)]
pub const fn flash_offset(address: u32) -> u32 {
    address & FLASH_ADDR_MASK
}

/// Returns the window base `address` falls in, given a device of `total_size` bytes.
pub fn window_base(address: u32, total_size: u32) -> Option<u32> {
    FLASH_WINDOWS
        .iter()
        .copied()
        .find(|&base| base <= address && address - base < total_size)
}
