//! Interrupt masking for Cortex-M0+

use cortex_m::register::primask;
use pagekeep_hal::InterruptControl;

/// PRIMASK based interrupt control
///
/// Restores the previous PRIMASK on resume, so a flash operation issued
/// from inside a critical section does not re-enable interrupts.
#[derive(Debug, Default, Clone, Copy)]
pub struct CortexMInterrupts;

impl InterruptControl for CortexMInterrupts {
    type State = bool;

    fn suspend(&mut self) -> bool {
        let was_enabled = primask::read().is_inactive();
        cortex_m::interrupt::disable();
        was_enabled
    }

    fn resume(&mut self, was_enabled: bool) {
        if was_enabled {
            // SAFETY: only re-enables interrupts that were enabled before suspend
            unsafe { cortex_m::interrupt::enable() }
        }
    }
}
