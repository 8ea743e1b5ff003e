//! Page-table entries and tables.
//!
//! One entry layout serves all four levels; bits that only exist at some
//! levels (e.g. `large_page`) are simply left clear elsewhere. Mapping
//! requests carry a [`Perm`] set instead of raw bits.

use bitfield_struct::bitfield;
use bitflags::bitflags;
use kernel_addresses::{FrameNumber, PhysAddr};
use kernel_layout::NPTENTRIES;

bitflags! {
    /// Permission bits a caller may request on a mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perm: u64 {
        /// The translation is valid.
        const PRESENT = 1 << 0;
        /// Writes are allowed.
        const WRITABLE = 1 << 1;
        /// User-mode accesses are allowed.
        const USER = 1 << 2;
        /// Write-through caching.
        const WRITE_THROUGH = 1 << 3;
        /// Caching disabled; for device memory.
        const CACHE_DISABLE = 1 << 4;
        /// The three software-available bits (9..=11). Never propagated
        /// into intermediate-table entries.
        const AVAIL = 0b111 << 9;
    }
}

/// A single 64-bit page-table entry, at any level of the tree.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageTableEntry {
    /// The translation is valid.
    pub present: bool,
    /// Writes are allowed through this entry.
    pub writable: bool,
    /// User-mode accesses are allowed through this entry.
    pub user_access: bool,
    /// Write-through caching.
    pub write_through: bool,
    /// Caching disabled.
    pub cache_disabled: bool,
    /// Set by the CPU on first access.
    pub accessed: bool,
    /// Set by the CPU on first write (leaf entries only).
    pub dirty: bool,
    /// 2 MiB / 1 GiB leaf at the PD / PDPT level.
    pub large_page: bool,
    /// Translation survives address-space switches.
    pub global: bool,
    /// Software-available bits 9..=11.
    #[bits(3)]
    pub os_avail_low: u8,
    /// Bits 51..=12 of the target physical address.
    #[bits(40)]
    frame_index: u64,
    /// Software-available bits 58..=52.
    #[bits(7)]
    pub os_avail_high: u8,
    /// Memory protection key.
    #[bits(4)]
    pub protection_key: u8,
    /// Instruction fetches are disallowed.
    pub no_execute: bool,
}

impl PageTableEntry {
    /// A leaf entry targeting `frame`; `PRESENT` is always included.
    #[must_use]
    pub const fn make_leaf(frame: FrameNumber, perm: Perm) -> Self {
        Self::from_bits(frame.base().as_u64() | perm.bits() | Perm::PRESENT.bits())
    }

    /// An intermediate entry targeting the table in `frame`.
    ///
    /// Intermediate entries are maximally permissive; leaf entries are the
    /// sole enforcement point.
    #[must_use]
    pub const fn make_table(frame: FrameNumber) -> Self {
        Self::make_leaf(
            frame,
            Perm::PRESENT.union(Perm::WRITABLE).union(Perm::USER),
        )
    }

    /// The raw 64-bit representation.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.into_bits()
    }

    /// Physical base address of the target frame or next-level table.
    #[must_use]
    pub const fn frame_base(self) -> PhysAddr {
        PhysAddr::new(self.frame_index() << 12)
    }

    /// The target frame.
    #[must_use]
    pub const fn frame(self) -> FrameNumber {
        self.frame_base().frame()
    }

    /// Whether every bit in `perm` is set.
    #[must_use]
    pub const fn has_perm(self, perm: Perm) -> bool {
        self.raw() & perm.bits() == perm.bits()
    }

    /// OR `perm` (plus `PRESENT`) into this entry.
    pub const fn or_perm(&mut self, perm: Perm) {
        *self = Self::from_bits(self.raw() | perm.bits() | Perm::PRESENT.bits());
    }

    /// Reset to the non-present all-zero entry.
    pub const fn clear(&mut self) {
        *self = Self::new();
    }
}

/// A 4 KiB page table: 512 entries, used at every level of the tree.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; NPTENTRIES],
}

impl PageTable {
    /// An all-zero (fully non-present) table.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageTableEntry::new(); NPTENTRIES],
        }
    }

    #[must_use]
    pub const fn entry(&self, index: usize) -> PageTableEntry {
        self.entries[index]
    }

    pub const fn entry_mut(&mut self, index: usize) -> &mut PageTableEntry {
        &mut self.entries[index]
    }
}
