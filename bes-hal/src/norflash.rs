//! NOR flash controller driver.
//!
//! [`NorFlash`] owns one flash device behind a [`Controller`] and splits
//! arbitrary byte ranges into the page/sector/block operations the chip
//! understands. All hardware traffic for a bus goes through one
//! [`Sequencer`] bracket.

mod r#async;
mod blocking;
mod config;
mod controller;
mod geometry;
mod remap;
mod security;
mod sequencer;
mod split;
mod suspend;

#[cfg(test)]
pub(crate) mod sim;

mod types {
    use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub enum Error {
        /// Address outside the device (or security-register space).
        BadAddress,
        /// Length runs past the end of the device, or remap slots ran out.
        BadLength,
        /// Operation not allowed now: feature missing, suspend pending, nothing to resume.
        BadOperation,
        /// Device id matched no known chip.
        BadId,
        /// Clock divider initialisation failed.
        BadDivider,
        /// Device id read back differently after switching dividers.
        DividerVerifyFailed,
        /// Sample delay calibration failed.
        CalibrationFailed,
        /// Malformed security-register configuration.
        BadConfig,
        NotOpened,
        /// Chip reported a geometry that is not a chain of power-of-two multiples.
        InvalidGeometry,
        InvalidConfiguration,
        NotAligned,
        Timeout,
        /// Generic controller failure.
        Controller,
    }

    impl NorFlashError for Error {
        fn kind(&self) -> NorFlashErrorKind {
            match self {
                Self::NotAligned => NorFlashErrorKind::NotAligned,
                Self::BadAddress | Self::BadLength => NorFlashErrorKind::OutOfBounds,
                Self::BadOperation
                | Self::BadId
                | Self::BadDivider
                | Self::DividerVerifyFailed
                | Self::CalibrationFailed
                | Self::BadConfig
                | Self::NotOpened
                | Self::InvalidGeometry
                | Self::InvalidConfiguration
                | Self::Timeout
                | Self::Controller => NorFlashErrorKind::Other,
            }
        }
    }

    impl From<NorFlashErrorKind> for Error {
        fn from(value: NorFlashErrorKind) -> Self {
            match value {
                NorFlashErrorKind::NotAligned => Self::NotAligned,
                NorFlashErrorKind::OutOfBounds => Self::BadAddress,
                _ => Self::Controller,
            }
        }
    }

    /// Outcome of an erase or program that was allowed to suspend.
    #[must_use]
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub enum Progress {
        Done,
        /// The chip paused the operation; call the matching `*_resume` later.
        Suspended,
    }

    impl Progress {
        pub const fn is_suspended(self) -> bool {
            matches!(self, Self::Suspended)
        }
    }
}

pub use self::r#async::AsyncNorFlash;
pub use blocking::NorFlash;
pub use config::{
    Capabilities, CmuFreq, DecryptWindow, NorFlashConfig, OpMode, TimingOverride,
    MAX_REMAP_SLOTS, SPEED_104M, SPEED_13M, SPEED_208M, SPEED_26M, SPEED_52M, SPEED_78M,
};
pub use controller::{ChipInfo, Controller, EraseKind, SecRegFuse};
pub use geometry::{Boundary, Geometry, DEVICE_ID_LEN, UNIQUE_ID_LEN};
pub use remap::{RemapPlan, RemapRegion};
pub use security::SecurityRegisters;
pub use sequencer::Sequencer;
pub use suspend::SuspendState;
pub use types::{Error, Progress};
