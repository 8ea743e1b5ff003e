//! Device-memory (MMIO) reservations.
//!
//! The window `[MMIOBASE, MMIOLIM)` is handed out linearly and never
//! reused. Device registers must bypass the cache, so reservations are
//! mapped write-through and cache-disabled, and never user-accessible.

use crate::aspace::AddressSpace;
use crate::entry::Perm;
use crate::frames::{FrameTable, OutOfMemory};
use crate::phys_mapper::PhysMapper;
use kernel_addresses::{PhysAddr, VirtAddr, align_up};
use kernel_layout::{MMIOBASE, MMIOLIM, PGSIZE};

/// Allocation cursor over the MMIO window.
#[derive(Debug)]
pub struct MmioWindow {
    cursor: VirtAddr,
}

impl MmioWindow {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cursor: VirtAddr::new(MMIOBASE),
        }
    }

    /// Reserve virtual space for the device range `[pa, pa + size)` and
    /// map it. Returns the base of the reservation; `size` is rounded up
    /// to whole pages.
    ///
    /// # Errors
    ///
    /// [`OutOfMemory`] when page tables for the mapping cannot be
    /// allocated.
    ///
    /// # Panics
    ///
    /// Panics when the reservation would overflow the window or `pa` is
    /// not page-aligned. Device ranges are fixed by the hardware, so
    /// running out of window space is a configuration error, not a
    /// runtime condition.
    pub fn map<M: PhysMapper>(
        &mut self,
        aspace: &AddressSpace<'_, M>,
        frames: &mut FrameTable<'_, M>,
        pa: PhysAddr,
        size: u64,
    ) -> Result<VirtAddr, OutOfMemory> {
        let size = align_up(size, PGSIZE);
        let base = self.cursor;
        let end = base
            .checked_add(size)
            .filter(|end| end.as_u64() < MMIOLIM)
            .unwrap_or_else(|| panic!("MMIO reservation of {size} bytes overflows the window"));
        self.cursor = end;

        aspace.map_region(
            frames,
            base,
            size,
            pa,
            Perm::WRITABLE | Perm::WRITE_THROUGH | Perm::CACHE_DISABLE,
        )?;
        Ok(base)
    }
}

impl Default for MmioWindow {
    fn default() -> Self {
        Self::new()
    }
}
