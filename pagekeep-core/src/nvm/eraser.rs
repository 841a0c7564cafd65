//! Page eraser
//!
//! Erasing is the only way back to a programmable page. The erase is a
//! fail-fast sequence: if the controller is stuck busy before the command
//! is issued, nothing is touched.

use pagekeep_hal::{BusyWait, FlashController, InterruptControl, StatusFlag};

use super::busy::settle;
use super::{NvError, NvFlash};

impl<C, D, I> NvFlash<C, D, I>
where
    C: FlashController,
    D: BusyWait,
    I: InterruptControl,
{
    /// Erase the reserved page
    ///
    /// Runs with interrupts suspended and the controller unlocked for the
    /// duration of the erase. On success every slot reads as all-ones.
    /// On failure the page contents are undefined.
    pub fn erase_page(&mut self) -> Result<(), NvError> {
        self.begin();
        let result = self.unlocked(|flash| flash.erase_unlocked());
        self.finish(result)
    }

    /// Erase sequence, controller already unlocked
    ///
    /// The erase-enable bit is cleared right after the start trigger, so it
    /// is never left set whichever way this returns.
    pub(super) fn erase_unlocked(&mut self) -> Result<(), NvError> {
        let bound = self.config.busy_timeout;

        if !settle(&mut self.controller, &mut self.delay, bound) {
            return Err(NvError::EraseTimeout);
        }

        self.controller.clear_status(StatusFlag::Errors);
        self.controller.select_page(self.layout.page);
        self.controller.start_erase();
        self.controller.end_erase();

        if !settle(&mut self.controller, &mut self.delay, bound) {
            return Err(NvError::EraseTimeout);
        }

        #[cfg(feature = "defmt")]
        defmt::trace!("Erased flash page {}", self.layout.page);

        Ok(())
    }
}
