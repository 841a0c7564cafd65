//! Flash controller abstractions
//!
//! The driver never touches register bits directly. Everything it needs
//! from the storage controller goes through [`FlashController`], which a
//! chip HAL implements as read/modify/write operations on its own layout.

/// Snapshot of the controller status register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashStatus {
    /// An erase or program operation is in flight
    pub busy: bool,
    /// The last operation completed (EOP)
    pub end_of_operation: bool,
    /// Any programming/erase error flag is raised
    pub error: bool,
}

impl FlashStatus {
    /// Check if the controller is busy
    pub fn is_busy(&self) -> bool {
        self.busy
    }
}

/// Status flags that can be cleared by writing them back (write-1-to-clear)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusFlag {
    /// All error flags left over from a previous operation
    Errors,
    /// End-of-operation completion flag
    EndOfOperation,
}

/// Storage controller capability
///
/// Implementations are non-reentrant by nature: the hardware only supports
/// one erase or program operation at a time, and callers must serialize.
pub trait FlashController {
    /// Apply the key sequence that unlocks the control register
    fn unlock(&mut self);

    /// Lock the control register again
    fn lock(&mut self);

    /// Read the status register
    fn read_status(&mut self) -> FlashStatus;

    /// Clear a status flag by writing it back
    fn clear_status(&mut self, flag: StatusFlag);

    /// Enable page erase and select the page number
    fn select_page(&mut self, page: u16);

    /// Trigger the erase of the selected page
    fn start_erase(&mut self);

    /// Clear the page-erase enable bit
    fn end_erase(&mut self);

    /// Enable program mode (PG)
    fn enable_program(&mut self);

    /// Disable program mode
    fn disable_program(&mut self);

    /// Write one 32-bit half of a double word
    ///
    /// The controller starts programming once both halves of an aligned
    /// double word have been written.
    fn program_half(&mut self, address: u32, half: u32);

    /// Instruction/memory barrier between bus transactions
    fn barrier(&mut self);

    /// Read one 32-bit unit of storage
    ///
    /// Reads are always legal and never require the controller to be unlocked.
    fn read_half(&self, address: u32) -> u32;
}

impl<T: FlashController + ?Sized> FlashController for &mut T {
    fn unlock(&mut self) {
        T::unlock(self)
    }

    fn lock(&mut self) {
        T::lock(self)
    }

    fn read_status(&mut self) -> FlashStatus {
        T::read_status(self)
    }

    fn clear_status(&mut self, flag: StatusFlag) {
        T::clear_status(self, flag)
    }

    fn select_page(&mut self, page: u16) {
        T::select_page(self, page)
    }

    fn start_erase(&mut self) {
        T::start_erase(self)
    }

    fn end_erase(&mut self) {
        T::end_erase(self)
    }

    fn enable_program(&mut self) {
        T::enable_program(self)
    }

    fn disable_program(&mut self) {
        T::disable_program(self)
    }

    fn program_half(&mut self, address: u32, half: u32) {
        T::program_half(self, address, half)
    }

    fn barrier(&mut self) {
        T::barrier(self)
    }

    fn read_half(&self, address: u32) -> u32 {
        T::read_half(self, address)
    }
}
