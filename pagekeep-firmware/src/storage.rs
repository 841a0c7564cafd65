//! Persistent values in the reserved flash page
//!
//! Slot assignments for this firmware. Both values share one page, so
//! every update goes through the shadowed update path.

use defmt::*;

use pagekeep_core::config::{AddressError, PageLayout, WordSlot, ERASED_WORD};
use pagekeep_core::{NvError, NvFlash};
use pagekeep_hal_stm32g0::{page_end, page_start, CortexMInterrupts, CycleBusyWait, Stm32g0Flash};

/// Reserved page; must match the hole left in memory.x
pub const STORAGE_LAYOUT: PageLayout = PageLayout::STM32G0_32K_LAST_PAGE;

const _: () = core::assert!(
    STORAGE_LAYOUT.start == page_start(STORAGE_LAYOUT.page)
        && STORAGE_LAYOUT.end == page_end(STORAGE_LAYOUT.page),
    "storage layout does not cover exactly one flash page"
);

/// Number of word slots in the reserved page
pub const SLOT_COUNT: usize = STORAGE_LAYOUT.slot_count() as usize;

/// Slot holding the boot counter
const BOOT_COUNT_SLOT: u32 = 0;

/// Slot holding the calibration word
const CALIBRATION_SLOT: u32 = 1;

/// Tag in the high half of the calibration slot ("CAL0")
const CALIBRATION_MAGIC: u32 = 0x4341_4C30;

/// NVM driver wired to the STM32G0 adapters
pub type Nvm = NvFlash<Stm32g0Flash<'static>, CycleBusyWait, CortexMInterrupts>;

/// Typed view over the firmware's slots
pub struct Storage {
    nvm: Nvm,
    shadow: &'static mut [u64; SLOT_COUNT],
}

impl Storage {
    /// Wrap a driver and its shadow buffer
    pub fn new(nvm: Nvm, shadow: &'static mut [u64; SLOT_COUNT]) -> Self {
        Self { nvm, shadow }
    }

    /// Increment and persist the boot counter
    ///
    /// Returns the new count. An erased slot counts as zero boots.
    pub fn record_boot(&mut self) -> Result<u64, NvError> {
        let slot = slot(BOOT_COUNT_SLOT)?;
        let previous = match self.nvm.read_slot(slot) {
            ERASED_WORD => 0,
            count => count,
        };
        let count = previous.wrapping_add(1);

        self.update(slot, count)?;
        debug!("Boot counter {} -> {}", previous, count);

        Ok(count)
    }

    /// Load the calibration value, if one was stored
    pub fn load_calibration(&self) -> Option<u32> {
        let word = self.nvm.read_slot(slot(CALIBRATION_SLOT).ok()?);
        if word == ERASED_WORD {
            debug!("No calibration in flash");
            return None;
        }

        if (word >> 32) as u32 != CALIBRATION_MAGIC {
            warn!("Calibration slot has bad magic: {=u64:x}", word);
            return None;
        }

        Some(word as u32)
    }

    /// Persist a calibration value
    pub fn save_calibration(&mut self, value: u32) -> Result<(), NvError> {
        let word = (u64::from(CALIBRATION_MAGIC) << 32) | u64::from(value);
        self.update(slot(CALIBRATION_SLOT)?, word)?;

        info!("Saved calibration {} to flash", value);
        Ok(())
    }

    /// Update one slot, rewriting the page from the shadow if the update
    /// failed part way
    fn update(&mut self, slot: WordSlot, word: u64) -> Result<(), NvError> {
        match self.nvm.update_word(slot.address(), word, &mut self.shadow[..]) {
            Err(e @ (NvError::EraseTimeout | NvError::BusyTimeout | NvError::CommitTimeout)) => {
                warn!("Page update failed: {:?}, restoring from shadow", e);
                self.nvm.restore(&self.shadow[..])
            }
            result => result,
        }
    }

    /// Check if the last storage operation failed
    pub fn is_busy_or_failed(&self) -> bool {
        self.nvm.is_busy_or_failed()
    }
}

fn slot(index: u32) -> Result<WordSlot, NvError> {
    STORAGE_LAYOUT
        .slot(index)
        .ok_or(NvError::Address(AddressError::OutOfPage))
}
