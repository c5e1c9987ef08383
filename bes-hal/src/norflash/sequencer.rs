use core::sync::atomic::{AtomicBool, Ordering};

use super::controller::Controller;

/// Command bracket shared by every driver on one flash bus.
///
/// Each multi-step transaction runs between `pre_operation` and
/// `post_operation`. Brackets do not nest: entering a held sequencer panics.
pub struct Sequencer {
    held: AtomicBool,
}

impl Sequencer {
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    pub(crate) fn enter<C: Controller>(&self, ctrl: &mut C) {
        let entered = self
            .held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed);
        assert!(entered.is_ok(), "norflash command bracket re-entered");
        ctrl.pre_operation();
    }

    pub(crate) fn leave<C: Controller>(&self, ctrl: &mut C) {
        debug_assert!(self.is_held());
        ctrl.post_operation();
        self.held.store(false, Ordering::Release);
    }

    /// Runs `f` inside one bracket.
    pub(crate) fn run<C: Controller, R>(&self, ctrl: &mut C, f: impl FnOnce(&mut C) -> R) -> R {
        self.enter(ctrl);
        let out = f(ctrl);
        self.leave(ctrl);
        out
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}
