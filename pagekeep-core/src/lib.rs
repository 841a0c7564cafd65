//! Board-agnostic NVM page driver
//!
//! This crate contains the erase/program sequencing for a single page of
//! internal flash reserved for user data (counters, settings, calibration):
//!
//! - Address map of the reserved page and its 64-bit word slots
//! - Page eraser with bounded busy waits
//! - Word programmer (unlock, erase, program, lock)
//! - Lock-free read path
//! - Deterministic simulated controller for host tests (`sim` feature)
//!
//! Register access, delays and interrupt masking come from the traits in
//! `pagekeep-hal`.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod nvm;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use config::{CommitWait, DriverConfig, PageLayout, WordSlot};
pub use nvm::{NvError, NvFlash};
