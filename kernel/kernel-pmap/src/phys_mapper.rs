//! Physical-to-virtual translation seam.
//!
//! Page tables are stored at physical addresses, but the CPU can only
//! dereference virtual ones. [`PhysMapper`] abstracts the translation so the
//! walking and mapping code is independent of how physical memory happens to
//! be reachable.

use crate::entry::PageTable;
use kernel_addresses::{FrameNumber, PhysAddr};
use kernel_layout::PGSIZE;

/// Maps physical addresses to dereferenceable references.
///
/// The kernel's implementation adds `KERNBASE`; tests map into simulated RAM.
pub trait PhysMapper {
    /// Reinterpret the memory at `phys` as a `T`.
    ///
    /// # Safety
    ///
    /// `phys` must point at backed physical memory that holds a valid `T`,
    /// and the caller must not create aliasing mutable references to it.
    unsafe fn phys_to_mut<'a, T>(&self, phys: PhysAddr) -> &'a mut T;
}

/// The page table stored at `phys`.
///
/// # Safety
///
/// `phys` must be the page-aligned base of an initialized page table.
pub(crate) unsafe fn table_mut<'a, M: PhysMapper>(
    mapper: &M,
    phys: PhysAddr,
) -> &'a mut PageTable {
    debug_assert!(phys.is_page_aligned());
    unsafe { mapper.phys_to_mut::<PageTable>(phys) }
}

/// Fill the frame with zeros.
///
/// # Safety
///
/// `frame` must be backed physical memory not aliased by live references.
pub(crate) unsafe fn zero_frame<M: PhysMapper>(mapper: &M, frame: FrameNumber) {
    let bytes: &mut [u8; PGSIZE as usize] = unsafe { mapper.phys_to_mut(frame.base()) };
    bytes.fill(0);
}
