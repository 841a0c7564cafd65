//! NVM page driver
//!
//! [`NvFlash`] owns the three capabilities it needs (controller, wait
//! primitive, interrupt masking) and exposes the erase, write and read
//! operations on the reserved page.
//!
//! # Write contract
//!
//! [`NvFlash::write_word`] means "erase the page, then program one word".
//! Every other slot in the page reads as erased afterwards. Callers that
//! keep several values in the page use [`NvFlash::update_word`], which
//! shadows the page in a caller-provided buffer and reprograms it. If that
//! fails after the erase, [`NvFlash::restore`] rewrites the page from the
//! same buffer.
//!
//! # Outcome
//!
//! Every mutating operation returns a `Result`. The last outcome is also
//! kept for callers that poll [`NvFlash::is_busy_or_failed`]; it is cleared
//! once at the start of each operation and set only if that operation failed.

mod busy;
mod eraser;
mod programmer;

use pagekeep_hal::{BusyWait, FlashController, InterruptControl};

use crate::config::{AddressError, DriverConfig, LayoutError, PageLayout};

/// Errors from erase and program operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NvError {
    /// Busy never cleared around the page erase
    EraseTimeout,
    /// Busy never cleared before programming, after a successful erase
    BusyTimeout,
    /// Program did not commit within the bounded commit wait
    CommitTimeout,
    /// Target address is not a slot of the reserved page
    Address(AddressError),
    /// Shadow buffer cannot hold every slot of the page
    ShadowTooSmall,
}

impl From<AddressError> for NvError {
    fn from(e: AddressError) -> Self {
        NvError::Address(e)
    }
}

/// Driver for the reserved flash page
///
/// The driver assumes it is the only code that erases or programs flash:
/// at most one operation is ever in flight and callers serialize access.
pub struct NvFlash<C, D, I> {
    controller: C,
    delay: D,
    interrupts: I,
    layout: PageLayout,
    config: DriverConfig,
    last_outcome: Option<Result<(), NvError>>,
}

impl<C, D, I> NvFlash<C, D, I>
where
    C: FlashController,
    D: BusyWait,
    I: InterruptControl,
{
    /// Create a driver with the default configuration
    pub fn new(controller: C, delay: D, interrupts: I, layout: PageLayout) -> Result<Self, LayoutError> {
        Self::with_config(controller, delay, interrupts, layout, DriverConfig::default())
    }

    /// Create a driver with an explicit configuration
    pub fn with_config(
        controller: C,
        delay: D,
        interrupts: I,
        layout: PageLayout,
        config: DriverConfig,
    ) -> Result<Self, LayoutError> {
        layout.validate()?;

        Ok(Self {
            controller,
            delay,
            interrupts,
            layout,
            config,
            last_outcome: None,
        })
    }

    /// Get the page layout
    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Get the driver configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Outcome of the most recent erase or write, if any
    pub fn last_outcome(&self) -> Option<Result<(), NvError>> {
        self.last_outcome
    }

    /// Check if the most recent erase or write failed
    pub fn is_busy_or_failed(&self) -> bool {
        matches!(self.last_outcome, Some(Err(_)))
    }

    /// Give back the capabilities
    pub fn release(self) -> (C, D, I) {
        (self.controller, self.delay, self.interrupts)
    }

    /// Start an operation: the previous outcome no longer applies
    fn begin(&mut self) {
        self.last_outcome = None;
    }

    /// Record the outcome of an operation
    fn finish(&mut self, result: Result<(), NvError>) -> Result<(), NvError> {
        #[cfg(feature = "defmt")]
        if let Err(e) = result {
            defmt::warn!("NVM operation failed: {}", e);
        }

        self.last_outcome = Some(result);
        result
    }

    /// Run `op` with interrupts suspended and the controller unlocked
    ///
    /// Whatever `op` returns, program mode is disabled, the controller is
    /// locked and the previous interrupt state is restored before returning.
    fn unlocked<R>(&mut self, op: impl FnOnce(&mut Self) -> Result<R, NvError>) -> Result<R, NvError> {
        let state = self.interrupts.suspend();
        self.controller.unlock();

        let result = op(self);

        self.controller.disable_program();
        self.controller.lock();
        self.interrupts.resume(state);

        result
    }
}
