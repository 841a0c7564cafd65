//! Pagekeep Hardware Abstraction Layer
//!
//! This crate defines the capabilities the NVM driver needs from a chip:
//! a flash controller, a bounded wait primitive and interrupt masking.
//! Chip-specific HALs implement them against real registers, and
//! `pagekeep-core` ships a deterministic in-memory implementation for tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application (pagekeep-firmware, etc.)  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  pagekeep-core (eraser, programmer)     │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  pagekeep-hal (this crate - traits)     │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ pagekeep-hal- │       │ pagekeep-core │
//! │    stm32g0    │       │   ::sim       │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`flash::FlashController`] - Unlock, erase, program and status access
//! - [`delay::BusyWait`] - Bounded wait used between busy checks
//! - [`interrupt::InterruptControl`] - Suspend/resume interrupt delivery

#![no_std]
#![deny(unsafe_code)]

pub mod delay;
pub mod flash;
pub mod interrupt;

// Re-export key traits at crate root for convenience
pub use delay::BusyWait;
pub use flash::{FlashController, FlashStatus, StatusFlag};
pub use interrupt::InterruptControl;
