#![cfg_attr(not(test), no_std)]
#![doc = "Hardware abstraction layer for BES Bluetooth SoCs."]
#![doc = ""]
#![doc = "Provides the NOR flash controller driver: range splitting, suspend/resume,"]
#![doc = "security registers and boot-bank remap windows."]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod memory_map;
pub mod norflash;
