//! STM32G0-specific HAL for the pagekeep NVM driver
//!
//! This crate implements the `pagekeep-hal` capabilities on STM32G0 parts:
//!
//! - [`flash::Stm32g0Flash`] - FLASH_KEYR/SR/CR register access
//! - [`interrupt::CortexMInterrupts`] - PRIMASK based interrupt masking
//! - [`delay::CycleBusyWait`] - Core-cycle delay that works with interrupts masked
//!
//! # Features
//!
//! - `stm32g031k6` - STM32G031K6 (32 KiB flash, 2 KiB pages)
//! - `stm32g031k8` - STM32G031K8 (64 KiB flash, 2 KiB pages)
//! - `stm32g030f6` - STM32G030F6 (32 KiB flash, 2 KiB pages)
//! - `defmt` - Enable debug formatting support

#![no_std]

pub mod delay;
pub mod flash;
pub mod interrupt;

pub use delay::CycleBusyWait;
pub use flash::{page_end, page_start, Stm32g0Flash, FLASH_PAGE_SIZE};
pub use interrupt::CortexMInterrupts;
