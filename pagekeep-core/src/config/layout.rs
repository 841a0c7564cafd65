//! Address map of the reserved storage page
//!
//! Exactly one page at the top of flash holds user data. The linker script
//! must shrink the code region so this page is never used for program text.

/// Width of a word slot in bytes
pub const WORD_SIZE: u32 = 8;

/// Width of one program bus transaction in bytes
pub const HALF_WORD_SIZE: u32 = 4;

/// Value of a word slot after erase
pub const ERASED_WORD: u64 = u64::MAX;

/// Errors from validating a page layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// Start address is not aligned to the word width
    UnalignedStart,
    /// End address precedes the start address
    Empty,
    /// Page size is not a whole number of word slots
    PartialSlot,
    /// Page covers the whole address space, so its size does not fit in 32 bits
    TooLarge,
}

/// Errors from resolving an address to a word slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressError {
    /// Address lies outside the reserved page
    OutOfPage,
    /// Address is not aligned to the word width
    Misaligned,
}

/// The reserved storage page
///
/// `end` is inclusive, so a 2 KiB page at `0x0800_7800` ends at `0x0800_7FFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PageLayout {
    /// Page index used by the erase command
    pub page: u16,
    /// First byte of the page
    pub start: u32,
    /// Last byte of the page (inclusive)
    pub end: u32,
}

impl PageLayout {
    /// Last 2 KiB page of a 32 KiB STM32G0 (page 15)
    ///
    /// Requires `FLASH LENGTH = 32K - 2K` in `memory.x`.
    pub const STM32G0_32K_LAST_PAGE: Self = Self::new(15, 0x0800_7800, 0x0800_7FFF);

    /// Last 2 KiB page of a 64 KiB STM32G0 (page 31)
    pub const STM32G0_64K_LAST_PAGE: Self = Self::new(31, 0x0800_F800, 0x0800_FFFF);

    /// Create a layout from a page index and an inclusive address range
    pub const fn new(page: u16, start: u32, end: u32) -> Self {
        Self { page, start, end }
    }

    /// Check the layout invariants
    pub const fn validate(&self) -> Result<(), LayoutError> {
        if self.start % WORD_SIZE != 0 {
            return Err(LayoutError::UnalignedStart);
        }
        if self.end < self.start {
            return Err(LayoutError::Empty);
        }
        match (self.end - self.start).checked_add(1) {
            None => Err(LayoutError::TooLarge),
            Some(size) if size % WORD_SIZE != 0 => Err(LayoutError::PartialSlot),
            Some(_) => Ok(()),
        }
    }

    /// Page size in bytes
    ///
    /// Only meaningful for a layout that passed [`validate`](Self::validate).
    pub const fn size(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Number of word slots in the page
    pub const fn slot_count(&self) -> u32 {
        self.size() / WORD_SIZE
    }

    /// Check if an address lies inside the page
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address <= self.end
    }

    /// Get the slot with the given index
    pub fn slot(&self, index: u32) -> Option<WordSlot> {
        if index < self.slot_count() {
            Some(WordSlot(self.start + index * WORD_SIZE))
        } else {
            None
        }
    }

    /// Resolve an absolute address to a slot
    pub fn slot_at(&self, address: u32) -> Result<WordSlot, AddressError> {
        if !self.contains(address) {
            return Err(AddressError::OutOfPage);
        }
        if (address - self.start) % WORD_SIZE != 0 {
            return Err(AddressError::Misaligned);
        }
        Ok(WordSlot(address))
    }

    /// Iterate over every slot in address order
    pub fn slots(&self) -> impl Iterator<Item = WordSlot> {
        let start = self.start;
        (0..self.slot_count()).map(move |i| WordSlot(start + i * WORD_SIZE))
    }
}

/// An aligned 64-bit slot inside the reserved page
///
/// Only obtainable through [`PageLayout`], so holding one proves the
/// address was in range and aligned for that layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WordSlot(u32);

impl WordSlot {
    /// Address of the low half
    pub const fn address(self) -> u32 {
        self.0
    }

    /// Address of the high half
    pub const fn high_address(self) -> u32 {
        self.0 + HALF_WORD_SIZE
    }

    /// Index of this slot within the page
    pub const fn index(self, layout: &PageLayout) -> u32 {
        (self.0 - layout.start) / WORD_SIZE
    }
}
