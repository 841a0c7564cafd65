//! Simulated flash controller
//!
//! A deterministic in-memory stand-in for the storage controller, the wait
//! primitive and interrupt masking. One [`SimFlash`] serves all three roles
//! through shared references, so every bus transaction lands in a single
//! ordered trace:
//!
//! ```ignore
//! let sim = SimFlash::new(PageLayout::STM32G0_32K_LAST_PAGE);
//! let mut flash = NvFlash::new(&sim, &sim, &sim, PageLayout::STM32G0_32K_LAST_PAGE)?;
//! flash.write_word(0x0800_7800, 42)?;
//! assert_eq!(sim.memory_word(0x0800_7800), 42);
//! ```
//!
//! The model follows NOR flash rules: erase sets every bit, programming can
//! only clear bits, and programming without unlock or program mode raises
//! the error flag instead of changing memory.

use core::cell::RefCell;

use heapless::{Deque, Vec};
use pagekeep_hal::{BusyWait, FlashController, FlashStatus, InterruptControl, StatusFlag};

use crate::config::{PageLayout, HALF_WORD_SIZE, WORD_SIZE};

/// Largest page the simulator can hold, in 32-bit units (4 KiB)
pub const SIM_MAX_HALVES: usize = 1024;

/// Number of bus events kept in the trace
pub const SIM_TRACE_CAPACITY: usize = 512;

/// Number of scripted status reads that can be queued
pub const SIM_SCRIPT_CAPACITY: usize = 32;

const ERASED_HALF: u32 = u32::MAX;

/// One observable interaction with the simulated hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    /// Key sequence written
    Unlock,
    /// Control register locked
    Lock,
    /// Status register read, with the busy bit observed
    ReadStatus {
        /// Busy bit as returned
        busy: bool,
    },
    /// Error flags cleared
    ClearErrors,
    /// End-of-operation flag cleared
    ClearEndOfOperation,
    /// Page erase enabled for the page
    SelectPage(u16),
    /// Erase start trigger
    StartErase,
    /// Page erase enable cleared
    EndErase,
    /// Program mode enabled
    EnableProgram,
    /// Program mode disabled
    DisableProgram,
    /// One 32-bit program transaction
    Program {
        /// Target address
        address: u32,
        /// Value on the bus
        value: u32,
    },
    /// Barrier between transactions
    Barrier,
    /// Bounded wait primitive called
    Wait(u32),
    /// Interrupt delivery suspended
    InterruptsSuspended,
    /// Interrupt delivery restored
    InterruptsResumed,
}

struct SimState {
    layout: PageLayout,
    memory: Vec<u32, SIM_MAX_HALVES>,
    locked: bool,
    erase_enabled: bool,
    selected_page: Option<u16>,
    program_enabled: bool,
    pending_low: Option<(u32, u32)>,
    busy_reads: u32,
    latency: u32,
    stuck: bool,
    script: Deque<bool, SIM_SCRIPT_CAPACITY>,
    end_of_operation: bool,
    error: bool,
    interrupts_enabled: bool,
    erase_count: u32,
    elapsed: u64,
    trace: Vec<BusEvent, SIM_TRACE_CAPACITY>,
}

impl SimState {
    fn record(&mut self, event: BusEvent) {
        if self.trace.push(event).is_err() {
            panic!("simulator trace full ({SIM_TRACE_CAPACITY} events), call clear_trace");
        }
    }

    fn index(&self, address: u32) -> Option<usize> {
        if self.layout.contains(address) && address % HALF_WORD_SIZE == 0 {
            Some(((address - self.layout.start) / HALF_WORD_SIZE) as usize)
        } else {
            None
        }
    }

    fn start_operation(&mut self) {
        self.end_of_operation = true;
        self.busy_reads = self.latency;
    }
}

/// Deterministic flash controller, wait primitive and interrupt mask
pub struct SimFlash {
    state: RefCell<SimState>,
}

impl SimFlash {
    /// Create a simulator with an erased page, locked controller and
    /// interrupts enabled
    ///
    /// # Panics
    ///
    /// Panics if the layout is larger than [`SIM_MAX_HALVES`] allows. Any
    /// later bus event panics once [`SIM_TRACE_CAPACITY`] events are
    /// recorded without a [`clear_trace`](Self::clear_trace), and an
    /// unaligned [`FlashController::read_half`] panics like a bus fault.
    pub fn new(layout: PageLayout) -> Self {
        let halves = (layout.size() / HALF_WORD_SIZE) as usize;
        assert!(halves <= SIM_MAX_HALVES, "page too large for simulator");

        let mut memory = Vec::new();
        memory.resize(halves, ERASED_HALF).ok();

        Self {
            state: RefCell::new(SimState {
                layout,
                memory,
                locked: true,
                erase_enabled: false,
                selected_page: None,
                program_enabled: false,
                pending_low: None,
                busy_reads: 0,
                latency: 0,
                stuck: false,
                script: Deque::new(),
                end_of_operation: false,
                error: false,
                interrupts_enabled: true,
                erase_count: 0,
                elapsed: 0,
                trace: Vec::new(),
            }),
        }
    }

    /// Force the busy bit on (or release it)
    pub fn stick_busy(&self, stuck: bool) {
        self.state.borrow_mut().stuck = stuck;
    }

    /// Queue busy values for the next status reads
    ///
    /// Scripted reads take precedence over the modeled busy state.
    pub fn script_busy(&self, reads: &[bool]) {
        let mut state = self.state.borrow_mut();
        for &busy in reads {
            state.script.push_back(busy).ok();
        }
    }

    /// Number of status reads that report busy after each erase or program
    pub fn set_latency(&self, reads: u32) {
        self.state.borrow_mut().latency = reads;
    }

    /// Preload a word without going through the controller
    pub fn fill(&self, address: u32, value: u64) {
        let mut state = self.state.borrow_mut();
        if let (Some(low), Some(high)) = (state.index(address), state.index(address + HALF_WORD_SIZE)) {
            state.memory[low] = value as u32;
            state.memory[high] = (value >> 32) as u32;
        }
    }

    /// Word currently stored at `address` (all-ones outside the page)
    pub fn memory_word(&self, address: u32) -> u64 {
        let state = self.state.borrow();
        let half = |a: u32| state.index(a).map_or(ERASED_HALF, |i| state.memory[i]);
        (u64::from(half(address + HALF_WORD_SIZE)) << 32) | u64::from(half(address))
    }

    /// Copy of the bus trace so far
    pub fn trace(&self) -> Vec<BusEvent, SIM_TRACE_CAPACITY> {
        self.state.borrow().trace.clone()
    }

    /// Drop the recorded trace
    pub fn clear_trace(&self) {
        self.state.borrow_mut().trace.clear();
    }

    /// Number of page erases performed
    pub fn erase_count(&self) -> u32 {
        self.state.borrow().erase_count
    }

    /// Total time passed to the wait primitive
    pub fn elapsed(&self) -> u64 {
        self.state.borrow().elapsed
    }

    /// Check if the control register is locked
    pub fn is_locked(&self) -> bool {
        self.state.borrow().locked
    }

    /// Check if page erase is enabled
    pub fn erase_enabled(&self) -> bool {
        self.state.borrow().erase_enabled
    }

    /// Check if program mode is enabled
    pub fn program_enabled(&self) -> bool {
        self.state.borrow().program_enabled
    }

    /// Check if an error flag is raised
    pub fn error_flag(&self) -> bool {
        self.state.borrow().error
    }

    /// Check if interrupts are currently delivered
    pub fn interrupts_enabled(&self) -> bool {
        self.state.borrow().interrupts_enabled
    }

    /// Set the interrupt mask, as if the caller ran inside a critical section
    pub fn set_interrupts_enabled(&self, enabled: bool) {
        self.state.borrow_mut().interrupts_enabled = enabled;
    }

    /// Number of word slots in the simulated page
    pub fn slot_count(&self) -> u32 {
        self.state.borrow().layout.size() / WORD_SIZE
    }
}

impl FlashController for &SimFlash {
    fn unlock(&mut self) {
        let mut state = self.state.borrow_mut();
        state.record(BusEvent::Unlock);
        state.locked = false;
    }

    fn lock(&mut self) {
        let mut state = self.state.borrow_mut();
        state.record(BusEvent::Lock);
        state.locked = true;
    }

    fn read_status(&mut self) -> FlashStatus {
        let mut state = self.state.borrow_mut();
        let busy = match state.script.pop_front() {
            Some(busy) => busy,
            None if state.stuck => true,
            None if state.busy_reads > 0 => {
                state.busy_reads -= 1;
                true
            }
            None => false,
        };
        state.record(BusEvent::ReadStatus { busy });

        FlashStatus {
            busy,
            end_of_operation: state.end_of_operation,
            error: state.error,
        }
    }

    fn clear_status(&mut self, flag: StatusFlag) {
        let mut state = self.state.borrow_mut();
        match flag {
            StatusFlag::Errors => {
                state.record(BusEvent::ClearErrors);
                state.error = false;
            }
            StatusFlag::EndOfOperation => {
                state.record(BusEvent::ClearEndOfOperation);
                state.end_of_operation = false;
            }
        }
    }

    fn select_page(&mut self, page: u16) {
        let mut state = self.state.borrow_mut();
        state.record(BusEvent::SelectPage(page));
        if state.locked {
            state.error = true;
            return;
        }
        state.erase_enabled = true;
        state.selected_page = Some(page);
    }

    fn start_erase(&mut self) {
        let mut state = self.state.borrow_mut();
        state.record(BusEvent::StartErase);
        if state.locked || !state.erase_enabled {
            state.error = true;
            return;
        }
        if state.selected_page == Some(state.layout.page) {
            state.memory.iter_mut().for_each(|half| *half = ERASED_HALF);
        }
        state.erase_count += 1;
        state.start_operation();
    }

    fn end_erase(&mut self) {
        let mut state = self.state.borrow_mut();
        state.record(BusEvent::EndErase);
        state.erase_enabled = false;
    }

    fn enable_program(&mut self) {
        let mut state = self.state.borrow_mut();
        state.record(BusEvent::EnableProgram);
        if state.locked {
            state.error = true;
            return;
        }
        state.program_enabled = true;
    }

    fn disable_program(&mut self) {
        let mut state = self.state.borrow_mut();
        state.record(BusEvent::DisableProgram);
        state.program_enabled = false;
        state.pending_low = None;
    }

    fn program_half(&mut self, address: u32, half: u32) {
        let mut state = self.state.borrow_mut();
        state.record(BusEvent::Program { address, value: half });

        if state.locked || !state.program_enabled || state.index(address).is_none() {
            state.error = true;
            return;
        }

        match state.pending_low.take() {
            None if address % WORD_SIZE == 0 => state.pending_low = Some((address, half)),
            Some((low_address, low)) if address == low_address + HALF_WORD_SIZE => {
                if let (Some(lo), Some(hi)) = (state.index(low_address), state.index(address)) {
                    // NOR cells only go from 1 to 0
                    state.memory[lo] &= low;
                    state.memory[hi] &= half;
                }
                state.start_operation();
            }
            _ => state.error = true,
        }
    }

    fn barrier(&mut self) {
        self.state.borrow_mut().record(BusEvent::Barrier);
    }

    fn read_half(&self, address: u32) -> u32 {
        // Unaligned loads fault on the real bus
        assert!(address % HALF_WORD_SIZE == 0, "unaligned read at {address:#x}");
        let state = self.state.borrow();
        state.index(address).map_or(ERASED_HALF, |i| state.memory[i])
    }
}

impl BusyWait for &SimFlash {
    fn wait_with_timeout(&mut self, bound: u32) {
        let mut state = self.state.borrow_mut();
        state.record(BusEvent::Wait(bound));
        state.elapsed += u64::from(bound);
    }
}

impl InterruptControl for &SimFlash {
    type State = bool;

    fn suspend(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        state.record(BusEvent::InterruptsSuspended);
        let was_enabled = state.interrupts_enabled;
        state.interrupts_enabled = false;
        was_enabled
    }

    fn resume(&mut self, was_enabled: bool) {
        let mut state = self.state.borrow_mut();
        state.record(BusEvent::InterruptsResumed);
        state.interrupts_enabled = was_enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: PageLayout = PageLayout::STM32G0_32K_LAST_PAGE;

    #[test]
    fn test_new_page_is_erased_and_locked() {
        let sim = SimFlash::new(LAYOUT);
        assert_eq!(sim.slot_count(), 256);
        assert_eq!(sim.memory_word(LAYOUT.start), u64::MAX);
        assert!(sim.is_locked());
        assert!(sim.interrupts_enabled());
    }

    #[test]
    fn test_program_while_locked_sets_error() {
        let sim = SimFlash::new(LAYOUT);
        let mut ctrl = &sim;

        ctrl.enable_program();
        ctrl.program_half(LAYOUT.start, 0);
        assert!(sim.error_flag());
        assert_eq!(sim.memory_word(LAYOUT.start), u64::MAX);

        ctrl.clear_status(StatusFlag::Errors);
        assert!(!sim.error_flag());
    }

    #[test]
    fn test_program_only_clears_bits() {
        let sim = SimFlash::new(LAYOUT);
        sim.fill(LAYOUT.start, 0x0000_00F0_0000_00F0);
        let mut ctrl = &sim;

        ctrl.unlock();
        ctrl.enable_program();
        ctrl.program_half(LAYOUT.start, 0x0F);
        ctrl.program_half(LAYOUT.start + 4, 0xFF);
        assert_eq!(sim.memory_word(LAYOUT.start), 0x0000_00F0_0000_0000);
    }

    #[test]
    fn test_high_half_first_is_sequence_error() {
        let sim = SimFlash::new(LAYOUT);
        let mut ctrl = &sim;

        ctrl.unlock();
        ctrl.enable_program();
        ctrl.program_half(LAYOUT.start + 4, 0);
        assert!(sim.error_flag());
    }

    #[test]
    fn test_erase_other_page_keeps_memory() {
        let sim = SimFlash::new(LAYOUT);
        sim.fill(LAYOUT.start, 1);
        let mut ctrl = &sim;

        ctrl.unlock();
        ctrl.select_page(3);
        ctrl.start_erase();
        assert_eq!(sim.memory_word(LAYOUT.start), 1);
        assert_eq!(sim.erase_count(), 1);
    }

    #[test]
    fn test_latency_counts_status_reads() {
        let sim = SimFlash::new(LAYOUT);
        sim.set_latency(2);
        let mut ctrl = &sim;

        ctrl.unlock();
        ctrl.select_page(LAYOUT.page);
        ctrl.start_erase();
        assert!(ctrl.read_status().busy);
        assert!(ctrl.read_status().busy);
        let status = ctrl.read_status();
        assert!(!status.busy);
        assert!(status.end_of_operation);
    }

    #[test]
    #[should_panic(expected = "simulator trace full")]
    fn test_trace_overflow_panics() {
        let sim = SimFlash::new(LAYOUT);
        let mut ctrl = &sim;

        for _ in 0..=SIM_TRACE_CAPACITY {
            ctrl.barrier();
        }
    }

    #[test]
    fn test_clear_trace_makes_room() {
        let sim = SimFlash::new(LAYOUT);
        let mut ctrl = &sim;

        for _ in 0..SIM_TRACE_CAPACITY {
            ctrl.barrier();
        }
        sim.clear_trace();
        ctrl.barrier();
        assert_eq!(sim.trace().len(), 1);
    }

    #[test]
    #[should_panic(expected = "unaligned read")]
    fn test_unaligned_read_faults() {
        let sim = SimFlash::new(LAYOUT);
        (&sim).read_half(LAYOUT.start + 1);
    }

    #[test]
    fn test_read_half_outside_page() {
        let sim = SimFlash::new(LAYOUT);
        assert_eq!((&sim).read_half(0x2000_0000), u32::MAX);
        sim.clear_trace();
        assert!(sim.trace().is_empty());
    }
}
