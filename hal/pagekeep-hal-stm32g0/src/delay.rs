//! Bounded wait for STM32G0
//!
//! The wait runs with interrupts suspended, so it cannot rely on a tick
//! interrupt or the embassy time driver. It burns core cycles instead.

use pagekeep_hal::BusyWait;

/// Default core clock after reset (HSI16)
pub const DEFAULT_CORE_HZ: u32 = 16_000_000;

/// Busy wait counted in core clock cycles
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleBusyWait {
    cycles_per_ms: u32,
}

impl Default for CycleBusyWait {
    fn default() -> Self {
        Self::new(DEFAULT_CORE_HZ)
    }
}

impl CycleBusyWait {
    /// Create a wait primitive for the given core clock
    pub const fn new(core_hz: u32) -> Self {
        Self {
            cycles_per_ms: core_hz / 1000,
        }
    }
}

impl BusyWait for CycleBusyWait {
    /// Wait `bound` milliseconds
    fn wait_with_timeout(&mut self, bound: u32) {
        for _ in 0..bound {
            cortex_m::asm::delay(self.cycles_per_ms);
        }
    }
}
