//! Pagekeep Firmware
//!
//! Example firmware for an STM32G031K6. Counts boots and keeps a
//! calibration value in the last flash page, which survives power loss.

#![no_std]
#![no_main]

mod storage;

use defmt::*;
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use pagekeep_core::NvFlash;
use pagekeep_hal_stm32g0::{CortexMInterrupts, CycleBusyWait, Stm32g0Flash};

use crate::storage::{Storage, SLOT_COUNT, STORAGE_LAYOUT};

/// Calibration written on first boot
const DEFAULT_CALIBRATION: u32 = 1000;

/// Heartbeat interval
const HEARTBEAT: Duration = Duration::from_secs(10);

/// Shadow buffer for page updates
static SHADOW: StaticCell<[u64; SLOT_COUNT]> = StaticCell::new();

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("Pagekeep firmware starting...");

    let p = embassy_stm32::init(Default::default());

    let flash = Stm32g0Flash::new(p.FLASH, STORAGE_LAYOUT.page);
    let nvm = match NvFlash::new(flash, CycleBusyWait::default(), CortexMInterrupts, STORAGE_LAYOUT) {
        Ok(nvm) => nvm,
        Err(e) => {
            error!("Invalid storage layout: {:?}", e);
            loop {
                Timer::after(HEARTBEAT).await;
            }
        }
    };
    let mut storage = Storage::new(nvm, SHADOW.init([0; SLOT_COUNT]));

    match storage.record_boot() {
        Ok(count) => info!("Boot #{}", count),
        Err(e) => warn!("Failed to record boot: {:?}", e),
    }

    let calibration = match storage.load_calibration() {
        Some(value) => {
            info!("Loaded calibration {} from flash", value);
            value
        }
        None => {
            if let Err(e) = storage.save_calibration(DEFAULT_CALIBRATION) {
                warn!("Failed to save default calibration: {:?}", e);
            }
            DEFAULT_CALIBRATION
        }
    };

    loop {
        Timer::after(HEARTBEAT).await;
        debug!(
            "Alive: calibration={}, storage_failed={}",
            calibration,
            storage.is_busy_or_failed()
        );
    }
}
