//! Busy flag handling shared by the eraser and the programmer

use pagekeep_hal::{BusyWait, FlashController};

use crate::config::CommitWait;

/// Wait for busy to clear, giving up after one bounded wait
///
/// Returns true if the controller is idle. The status is read, and only
/// if busy the wait primitive runs once before the status is read again.
pub(super) fn settle<C: FlashController, D: BusyWait>(controller: &mut C, delay: &mut D, bound: u32) -> bool {
    if !controller.read_status().is_busy() {
        return true;
    }

    delay.wait_with_timeout(bound);
    !controller.read_status().is_busy()
}

/// Wait for a program operation to commit
///
/// With [`CommitWait::Unbounded`] this never returns false.
pub(super) fn wait_commit<C: FlashController>(controller: &mut C, policy: CommitWait) -> bool {
    match policy {
        CommitWait::Unbounded => {
            while controller.read_status().is_busy() {
                core::hint::spin_loop();
            }
            true
        }
        CommitWait::Bounded { polls } => {
            (0..polls.max(1)).any(|_| !controller.read_status().is_busy())
        }
    }
}
