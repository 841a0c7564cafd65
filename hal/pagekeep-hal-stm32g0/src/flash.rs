//! Flash controller driver for STM32G0
//!
//! Register-level implementation of [`FlashController`]. STM32G0 parts
//! have a single bank of 2 KiB pages and program 64-bit double words,
//! written as two 32-bit transactions.
//!
//! References: RM0444, section 3.3 (FLASH program/erase operations).

use core::ptr::{read_volatile, write_volatile};

use embassy_stm32::flash::{FLASH_BASE, FLASH_SIZE};
use embassy_stm32::pac;
use embassy_stm32::peripherals::FLASH;
use embassy_stm32::Peri;
use pagekeep_hal::{FlashController, FlashStatus, StatusFlag};

/// Flash page size for STM32G0 series
pub const FLASH_PAGE_SIZE: u32 = 2048;

/// Unlock key sequence for FLASH_KEYR
const KEY1: u32 = 0x4567_0123;
const KEY2: u32 = 0xCDEF_89AB;

/// Erased flash reads as all-ones
const ERASED_HALF: u32 = u32::MAX;

/// First byte of a flash page
pub const fn page_start(page: u16) -> u32 {
    FLASH_BASE as u32 + page as u32 * FLASH_PAGE_SIZE
}

/// Last byte of a flash page (inclusive)
pub const fn page_end(page: u16) -> u32 {
    page_start(page) + FLASH_PAGE_SIZE - 1
}

/// STM32G0 flash controller
///
/// Holds the FLASH peripheral token, so only one instance can exist.
/// Program transactions are only issued inside the reserved page, and
/// reads only inside main flash.
pub struct Stm32g0Flash<'d> {
    _flash: Peri<'d, FLASH>,
    page: u16,
}

impl<'d> Stm32g0Flash<'d> {
    /// Take ownership of the FLASH peripheral, reserving `page` for data
    pub fn new(flash: Peri<'d, FLASH>, page: u16) -> Self {
        Self { _flash: flash, page }
    }

    /// Check if the control register is locked
    pub fn is_locked(&self) -> bool {
        pac::FLASH.cr().read().lock()
    }

    fn is_writable(&self, address: u32) -> bool {
        address % 4 == 0 && address >= page_start(self.page) && address <= page_end(self.page)
    }
}

fn is_readable(address: u32) -> bool {
    let base = FLASH_BASE as u32;
    address % 4 == 0 && address >= base && address - base <= FLASH_SIZE as u32 - 4
}

impl FlashController for Stm32g0Flash<'_> {
    fn unlock(&mut self) {
        // Writing the keys to an unlocked controller raises a bus error
        if self.is_locked() {
            pac::FLASH.keyr().write_value(KEY1);
            pac::FLASH.keyr().write_value(KEY2);
        }
    }

    fn lock(&mut self) {
        pac::FLASH.cr().modify(|w| w.set_lock(true));
    }

    fn read_status(&mut self) -> FlashStatus {
        let sr = pac::FLASH.sr().read();

        FlashStatus {
            busy: sr.bsy(),
            end_of_operation: sr.eop(),
            error: sr.operr()
                || sr.progerr()
                || sr.wrperr()
                || sr.pgaerr()
                || sr.sizerr()
                || sr.pgserr()
                || sr.miserr()
                || sr.fasterr()
                || sr.rderr()
                || sr.optverr(),
        }
    }

    fn clear_status(&mut self, flag: StatusFlag) {
        match flag {
            // Writing back what was read clears every raised write-1-to-clear flag
            StatusFlag::Errors => pac::FLASH.sr().modify(|_| {}),
            StatusFlag::EndOfOperation => pac::FLASH.sr().write(|w| w.set_eop(true)),
        }
    }

    fn select_page(&mut self, page: u16) {
        pac::FLASH.cr().modify(|w| {
            w.set_per(true);
            w.set_pnb(page as _);
        });
    }

    fn start_erase(&mut self) {
        pac::FLASH.cr().modify(|w| w.set_strt(true));
    }

    fn end_erase(&mut self) {
        pac::FLASH.cr().modify(|w| w.set_per(false));
    }

    fn enable_program(&mut self) {
        pac::FLASH.cr().modify(|w| w.set_pg(true));
    }

    fn disable_program(&mut self) {
        pac::FLASH.cr().modify(|w| w.set_pg(false));
    }

    fn program_half(&mut self, address: u32, half: u32) {
        if !self.is_writable(address) {
            #[cfg(feature = "defmt")]
            defmt::warn!("Program outside reserved page ignored: {=u32:#x}", address);
            return;
        }

        // SAFETY: address is aligned and inside the reserved page, which the
        // linker script keeps out of the code region
        unsafe { write_volatile(address as *mut u32, half) }
    }

    fn barrier(&mut self) {
        cortex_m::asm::isb();
    }

    fn read_half(&self, address: u32) -> u32 {
        if !is_readable(address) {
            return ERASED_HALF;
        }

        // SAFETY: address is aligned and inside main flash, which is always mapped
        unsafe { read_volatile(address as *const u32) }
    }
}
