//! Word programmer and read path
//!
//! The controller programs double words, but its bus only carries 32 bits
//! per transaction. Each word goes out as two back-to-back writes, low half
//! first, with a barrier in between.

use pagekeep_hal::{BusyWait, FlashController, InterruptControl, StatusFlag};

use super::busy::{settle, wait_commit};
use super::{NvError, NvFlash};
use crate::config::{WordSlot, ERASED_WORD, HALF_WORD_SIZE};

impl<C, D, I> NvFlash<C, D, I>
where
    C: FlashController,
    D: BusyWait,
    I: InterruptControl,
{
    /// Erase the page, then program `value` at `address`
    ///
    /// Every other slot of the page is erased by this call. Each step is a
    /// commit point: an erase failure leaves the page undefined and nothing
    /// is programmed.
    pub fn write_word(&mut self, address: u32, value: u64) -> Result<(), NvError> {
        self.begin();
        let result = match self.layout.slot_at(address) {
            Ok(slot) => self.write_erased(slot, value),
            Err(e) => Err(e.into()),
        };
        self.finish(result)
    }

    /// Erase the page, then program `value` into `slot`
    pub fn write_slot(&mut self, slot: WordSlot, value: u64) -> Result<(), NvError> {
        self.write_word(slot.address(), value)
    }

    /// Program `value` at `address` while keeping every other slot
    ///
    /// The page is copied into `shadow`, erased once, and every slot that
    /// did not read as erased is programmed back. `shadow` must hold at
    /// least [`PageLayout::slot_count`](crate::config::PageLayout::slot_count)
    /// words. If the slot already holds `value` nothing is erased.
    ///
    /// # Failure
    ///
    /// An `EraseTimeout` leaves the page undefined. A `BusyTimeout` or
    /// `CommitTimeout` happens after the erase, so the page is partially
    /// programmed and the other slots may be gone from flash. In every case
    /// `shadow` still holds the intended page contents: pass it to
    /// [`restore`](Self::restore) before the next `update_word`, which
    /// refills `shadow` from flash.
    pub fn update_word(&mut self, address: u32, value: u64, shadow: &mut [u64]) -> Result<(), NvError> {
        self.begin();
        let result = self.update_inner(address, value, shadow);
        self.finish(result)
    }

    /// Erase the page and program back every non-erased word of `shadow`
    ///
    /// Recovers the page after a failed [`update_word`](Self::update_word)
    /// using the shadow it left behind.
    pub fn restore(&mut self, shadow: &[u64]) -> Result<(), NvError> {
        self.begin();
        let result = if shadow.len() < self.layout.slot_count() as usize {
            Err(NvError::ShadowTooSmall)
        } else {
            self.rewrite(shadow)
        };
        self.finish(result)
    }

    /// Read the 64-bit word at `address`
    ///
    /// No locking and no side effects. Never-written or erased cells read
    /// as all-ones. An address that is not 32-bit aligned also reads as
    /// all-ones, without touching the bus.
    pub fn read_word(&self, address: u32) -> u64 {
        if address % HALF_WORD_SIZE != 0 {
            return ERASED_WORD;
        }

        let low = self.controller.read_half(address);
        let high = self.controller.read_half(address.wrapping_add(HALF_WORD_SIZE));

        (u64::from(high) << 32) | u64::from(low)
    }

    /// Read the word stored in `slot`
    pub fn read_slot(&self, slot: WordSlot) -> u64 {
        self.read_word(slot.address())
    }

    /// Check if the word at `address` is in the erased state
    pub fn is_erased(&self, address: u32) -> bool {
        self.read_word(address) == ERASED_WORD
    }

    fn write_erased(&mut self, slot: WordSlot, value: u64) -> Result<(), NvError> {
        self.unlocked(|flash| {
            flash.erase_unlocked()?;
            flash.program_unlocked(slot, value)
        })
    }

    fn update_inner(&mut self, address: u32, value: u64, shadow: &mut [u64]) -> Result<(), NvError> {
        let target = self.layout.slot_at(address)?;
        let count = self.layout.slot_count() as usize;
        if shadow.len() < count {
            return Err(NvError::ShadowTooSmall);
        }

        if self.read_slot(target) == value {
            return Ok(());
        }

        let layout = self.layout;
        for (word, slot) in shadow.iter_mut().zip(layout.slots()) {
            *word = if slot == target { value } else { self.read_slot(slot) };
        }

        self.rewrite(shadow)
    }

    fn rewrite(&mut self, shadow: &[u64]) -> Result<(), NvError> {
        let layout = self.layout;
        self.unlocked(|flash| {
            flash.erase_unlocked()?;
            for (slot, &word) in layout.slots().zip(shadow) {
                if word != ERASED_WORD {
                    flash.program_unlocked(slot, word)?;
                }
            }
            Ok(())
        })
    }

    /// Program one erased slot, controller already unlocked
    fn program_unlocked(&mut self, slot: WordSlot, value: u64) -> Result<(), NvError> {
        if !settle(&mut self.controller, &mut self.delay, self.config.busy_timeout) {
            return Err(NvError::BusyTimeout);
        }

        self.controller.clear_status(StatusFlag::Errors);
        self.controller.enable_program();

        self.controller.program_half(slot.address(), value as u32);
        self.controller.barrier();
        self.controller.program_half(slot.high_address(), (value >> 32) as u32);

        if !wait_commit(&mut self.controller, self.config.commit_wait) {
            return Err(NvError::CommitTimeout);
        }

        if self.controller.read_status().end_of_operation {
            self.controller.clear_status(StatusFlag::EndOfOperation);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::config::{AddressError, DriverConfig, PageLayout, ERASED_WORD};
    use crate::nvm::{NvError, NvFlash};
    use crate::sim::{BusEvent, SimFlash};

    const LAYOUT: PageLayout = PageLayout::STM32G0_32K_LAST_PAGE;
    const SLOT_3: u32 = 0x0800_7818;

    fn bounded(sim: &SimFlash) -> NvFlash<&SimFlash, &SimFlash, &SimFlash> {
        NvFlash::with_config(sim, sim, sim, LAYOUT, DriverConfig::bounded(8)).unwrap()
    }

    #[test]
    fn test_write_read_round_trip() {
        let sim = SimFlash::new(LAYOUT);
        let mut flash = bounded(&sim);

        assert_eq!(flash.write_word(SLOT_3, 0xDEAD_BEEF_0000_0001), Ok(()));
        assert_eq!(flash.read_word(SLOT_3), 0xDEAD_BEEF_0000_0001);
        assert!(!flash.is_busy_or_failed());
        assert!(!sim.error_flag());
    }

    #[test]
    fn test_word_split_ordering() {
        let sim = SimFlash::new(LAYOUT);
        let mut flash = bounded(&sim);

        flash.write_word(SLOT_3, 0xAABB_CCDD_1122_3344).unwrap();

        let trace = sim.trace();
        let programs: heapless::Vec<usize, 4> = trace
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, BusEvent::Program { .. }))
            .map(|(i, _)| i)
            .collect();

        assert_eq!(programs.len(), 2);
        assert_eq!(
            trace[programs[0]],
            BusEvent::Program {
                address: SLOT_3,
                value: 0x1122_3344
            }
        );
        assert_eq!(trace[programs[0] + 1], BusEvent::Barrier);
        assert_eq!(
            trace[programs[0] + 2],
            BusEvent::Program {
                address: SLOT_3 + 4,
                value: 0xAABB_CCDD
            }
        );
    }

    #[test]
    fn test_write_protocol_order() {
        let sim = SimFlash::new(LAYOUT);
        let mut flash = bounded(&sim);

        flash.write_word(LAYOUT.start, 7).unwrap();
        assert_eq!(
            sim.trace().as_slice(),
            &[
                BusEvent::InterruptsSuspended,
                BusEvent::Unlock,
                // Erase
                BusEvent::ReadStatus { busy: false },
                BusEvent::ClearErrors,
                BusEvent::SelectPage(15),
                BusEvent::StartErase,
                BusEvent::EndErase,
                BusEvent::ReadStatus { busy: false },
                // Program
                BusEvent::ReadStatus { busy: false },
                BusEvent::ClearErrors,
                BusEvent::EnableProgram,
                BusEvent::Program {
                    address: LAYOUT.start,
                    value: 7
                },
                BusEvent::Barrier,
                BusEvent::Program {
                    address: LAYOUT.start + 4,
                    value: 0
                },
                BusEvent::ReadStatus { busy: false },
                BusEvent::ReadStatus { busy: false },
                BusEvent::ClearEndOfOperation,
                // Restore
                BusEvent::DisableProgram,
                BusEvent::Lock,
                BusEvent::InterruptsResumed,
            ]
        );
    }

    #[test]
    fn test_every_write_erases_the_page() {
        let sim = SimFlash::new(LAYOUT);
        let mut flash = bounded(&sim);
        let first = LAYOUT.slot(0).unwrap();
        let second = LAYOUT.slot(1).unwrap();

        flash.write_slot(first, 100).unwrap();
        flash.write_slot(second, 200).unwrap();

        // One erase per write call, and the second erase destroyed slot 0
        assert_eq!(sim.erase_count(), 2);
        assert_eq!(flash.read_slot(first), ERASED_WORD);
        assert_eq!(flash.read_slot(second), 200);
    }

    #[test]
    fn test_single_erase_per_write() {
        let sim = SimFlash::new(LAYOUT);
        let mut flash = bounded(&sim);

        flash.write_word(SLOT_3, 1).unwrap();
        let erases = sim
            .trace()
            .iter()
            .filter(|e| **e == BusEvent::StartErase)
            .count();
        assert_eq!(erases, 1);
    }

    #[test]
    fn test_erase_timeout_leaves_memory_untouched() {
        let sim = SimFlash::new(LAYOUT);
        sim.fill(SLOT_3, 0x5555);
        sim.stick_busy(true);
        let mut flash = bounded(&sim);

        assert_eq!(flash.write_word(SLOT_3, 0x1234), Err(NvError::EraseTimeout));
        assert!(flash.is_busy_or_failed());
        assert_eq!(sim.memory_word(SLOT_3), 0x5555);
        assert!(!sim
            .trace()
            .iter()
            .any(|e| matches!(e, BusEvent::Program { .. })));
        assert!(sim.is_locked());
        assert!(sim.interrupts_enabled());
    }

    #[test]
    fn test_busy_before_program_aborts() {
        let sim = SimFlash::new(LAYOUT);
        // Erase completes, then the controller reports busy twice
        sim.script_busy(&[false, false, true, true]);
        let mut flash = bounded(&sim);

        assert_eq!(flash.write_word(SLOT_3, 9), Err(NvError::BusyTimeout));
        assert_eq!(sim.erase_count(), 1);
        assert_eq!(flash.read_word(SLOT_3), ERASED_WORD);
        assert!(!sim.program_enabled());
        assert!(sim.is_locked());
        assert!(sim.interrupts_enabled());
    }

    #[test]
    fn test_bounded_commit_reports_timeout() {
        let sim = SimFlash::new(LAYOUT);
        // Erase and pre-program checks idle, then stuck for the commit
        sim.script_busy(&[false, false, false]);
        sim.set_latency(u32::MAX);
        let mut flash = bounded(&sim);

        assert_eq!(flash.write_word(SLOT_3, 9), Err(NvError::CommitTimeout));
        assert!(!sim.program_enabled());
        assert!(sim.is_locked());
    }

    #[test]
    fn test_failure_is_cleared_by_next_write() {
        let sim = SimFlash::new(LAYOUT);
        sim.stick_busy(true);
        let mut flash = bounded(&sim);

        assert!(flash.write_word(SLOT_3, 1).is_err());
        assert!(flash.is_busy_or_failed());

        sim.stick_busy(false);
        assert_eq!(flash.write_word(SLOT_3, 1), Ok(()));
        assert!(!flash.is_busy_or_failed());
    }

    #[test]
    fn test_invalid_address_rejected_before_hardware() {
        let sim = SimFlash::new(LAYOUT);
        let mut flash = bounded(&sim);

        assert_eq!(
            flash.write_word(SLOT_3 + 4, 1),
            Err(NvError::Address(AddressError::Misaligned))
        );
        assert_eq!(
            flash.write_word(LAYOUT.end + 1, 1),
            Err(NvError::Address(AddressError::OutOfPage))
        );
        assert!(flash.is_busy_or_failed());
        assert!(sim.trace().is_empty());
    }

    #[test]
    fn test_read_never_written_slot() {
        let sim = SimFlash::new(LAYOUT);
        let flash = bounded(&sim);

        assert_eq!(flash.read_word(SLOT_3), ERASED_WORD);
        assert!(flash.is_erased(SLOT_3));
        assert!(sim.trace().is_empty());
        assert_eq!(flash.last_outcome(), None);
    }

    #[test]
    fn test_write_respects_outer_critical_section() {
        let sim = SimFlash::new(LAYOUT);
        sim.set_interrupts_enabled(false);
        let mut flash = bounded(&sim);

        flash.write_word(SLOT_3, 1).unwrap();
        assert!(!sim.interrupts_enabled());
    }

    #[test]
    fn test_update_keeps_other_slots() {
        let sim = SimFlash::new(LAYOUT);
        let mut flash = bounded(&sim);
        let mut shadow = [0u64; 256];

        flash.update_word(LAYOUT.start, 11, &mut shadow).unwrap();
        flash.update_word(SLOT_3, 33, &mut shadow).unwrap();
        flash.update_word(LAYOUT.start, 12, &mut shadow).unwrap();

        assert_eq!(flash.read_word(LAYOUT.start), 12);
        assert_eq!(flash.read_word(SLOT_3), 33);
        assert_eq!(flash.read_word(LAYOUT.start + 8), ERASED_WORD);
        assert_eq!(sim.erase_count(), 3);
    }

    #[test]
    fn test_update_same_value_skips_erase() {
        let sim = SimFlash::new(LAYOUT);
        let mut flash = bounded(&sim);
        let mut shadow = [0u64; 256];

        flash.update_word(SLOT_3, 5, &mut shadow).unwrap();
        flash.update_word(SLOT_3, 5, &mut shadow).unwrap();
        assert_eq!(sim.erase_count(), 1);
        assert_eq!(flash.last_outcome(), Some(Ok(())));
    }

    #[test]
    fn test_update_rejects_small_shadow() {
        let sim = SimFlash::new(LAYOUT);
        let mut flash = bounded(&sim);
        let mut shadow = [0u64; 16];

        assert_eq!(
            flash.update_word(SLOT_3, 5, &mut shadow),
            Err(NvError::ShadowTooSmall)
        );
        assert_eq!(sim.erase_count(), 0);
    }

    #[test]
    fn test_unaligned_read_stays_off_the_bus() {
        let sim = SimFlash::new(LAYOUT);
        sim.fill(LAYOUT.start, 0x0102_0304_0506_0708);
        let flash = bounded(&sim);

        assert_eq!(flash.read_word(LAYOUT.start + 1), ERASED_WORD);
        assert_eq!(flash.read_word(LAYOUT.start + 6), ERASED_WORD);
        assert_eq!(flash.read_word(LAYOUT.start + 4), 0xFFFF_FFFF_0102_0304);
        assert!(sim.trace().is_empty());
    }

    #[test]
    fn test_failed_update_recovered_from_shadow() {
        let sim = SimFlash::new(LAYOUT);
        let mut flash = bounded(&sim);
        let mut shadow = [0u64; 256];

        flash.update_word(LAYOUT.start, 11, &mut shadow).unwrap();

        // Erase completes, then busy never clears before programming
        sim.script_busy(&[false, false, true, true]);
        assert_eq!(
            flash.update_word(LAYOUT.start + 8, 22, &mut shadow),
            Err(NvError::BusyTimeout)
        );
        assert_eq!(flash.read_word(LAYOUT.start), ERASED_WORD);
        assert_eq!(shadow[0], 11);
        assert_eq!(shadow[1], 22);
        assert!(sim.is_locked());

        assert_eq!(flash.restore(&shadow), Ok(()));
        assert!(!flash.is_busy_or_failed());
        assert_eq!(flash.read_word(LAYOUT.start), 11);
        assert_eq!(flash.read_word(LAYOUT.start + 8), 22);
        assert_eq!(sim.erase_count(), 3);
    }

    #[test]
    fn test_restore_rejects_small_shadow() {
        let sim = SimFlash::new(LAYOUT);
        let mut flash = bounded(&sim);

        assert_eq!(flash.restore(&[1, 2]), Err(NvError::ShadowTooSmall));
        assert!(flash.is_busy_or_failed());
        assert_eq!(sim.erase_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_write_then_read(index in 0u32..256, value in any::<u64>()) {
            let sim = SimFlash::new(LAYOUT);
            let mut flash = bounded(&sim);
            let slot = LAYOUT.slot(index).unwrap();

            prop_assert_eq!(flash.write_slot(slot, value), Ok(()));
            prop_assert_eq!(flash.read_slot(slot), value);
            prop_assert!(!sim.error_flag());
        }
    }
}
