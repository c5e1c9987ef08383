/// Which interrupted operation is waiting for a resume.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SuspendState {
    #[default]
    None,
    Erase,
    Program,
}

/// Remaining work of a suspended erase or program.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Snapshot {
    pub state: SuspendState,
    pub next_address: u32,
    pub remaining: u32,
    /// Program only: where the rest of the data starts in the caller's buffer.
    pub buffer_offset: usize,
    /// Program only: caller's buffer length, checked again on resume.
    pub buffer_len: usize,
}

impl Snapshot {
    pub const IDLE: Self = Self {
        state: SuspendState::None,
        next_address: 0,
        remaining: 0,
        buffer_offset: 0,
        buffer_len: 0,
    };

    pub fn is_pending(&self) -> bool {
        self.state != SuspendState::None
    }

    pub fn park_erase(&mut self, next_address: u32, remaining: u32) {
        *self = Self {
            state: SuspendState::Erase,
            next_address,
            remaining,
            ..Self::IDLE
        };
    }

    pub fn park_program(
        &mut self,
        next_address: u32,
        buffer_offset: usize,
        remaining: usize,
        buffer_len: usize,
    ) {
        *self = Self {
            state: SuspendState::Program,
            next_address,
            remaining: remaining as u32,
            buffer_offset,
            buffer_len,
        };
    }

    pub fn clear(&mut self) {
        *self = Self::IDLE;
    }
}
