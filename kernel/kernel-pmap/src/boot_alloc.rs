//! Boot-time bump allocator.
//!
//! Hands out page-aligned physical memory directly above the kernel image
//! before the frame table exists. It is consumed by
//! [`FrameTable::init`](crate::frames::FrameTable::init), which marks
//! everything below the final cursor as permanently in use; memory
//! allocated here is never freed.

use crate::detect::DetectedMemory;
use kernel_addresses::{PhysAddr, align_up};
use kernel_layout::PGSIZE;

/// Bump allocator over the physical bytes `[kernel_end, npages * PGSIZE)`.
#[derive(Debug)]
pub struct BootAllocator {
    next: PhysAddr,
    limit: PhysAddr,
}

impl BootAllocator {
    /// Start allocating at the first page boundary at or above
    /// `kernel_end`.
    #[must_use]
    pub fn new(kernel_end: PhysAddr, detected: &DetectedMemory) -> Self {
        Self {
            next: PhysAddr::new(align_up(kernel_end.as_u64(), PGSIZE)),
            limit: PhysAddr::new(detected.npages * PGSIZE),
        }
    }

    /// Allocate `n` bytes, rounded up to whole pages. The returned address
    /// is page-aligned; the memory is not initialized.
    ///
    /// # Panics
    ///
    /// Panics when the request runs past the end of detected physical
    /// memory. At this stage of boot there is no one to hand the error to.
    pub fn alloc(&mut self, n: u64) -> PhysAddr {
        let result = self.next;
        let end = result
            .as_u64()
            .checked_add(n)
            .map(|end| align_up(end, PGSIZE))
            .unwrap_or_else(|| panic!("boot allocation of {n} bytes overflows"));
        assert!(
            end <= self.limit.as_u64(),
            "boot allocation of {n} bytes at {result} runs past physical memory ({limit})",
            limit = self.limit,
        );
        self.next = PhysAddr::new(end);
        result
    }

    /// The current cursor: the first physical address not yet handed out.
    #[must_use]
    pub const fn boundary(&self) -> PhysAddr {
        self.next
    }

    /// Consume the allocator, yielding the final cursor.
    pub(crate) fn retire(self) -> PhysAddr {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detected(npages: u64) -> DetectedMemory {
        DetectedMemory {
            npages,
            npages_base: npages,
        }
    }

    #[test]
    fn allocations_are_page_aligned_and_bump_the_cursor() {
        let mut boot = BootAllocator::new(PhysAddr::new(0x10_0001), &detected(512));
        assert_eq!(boot.boundary(), PhysAddr::new(0x10_1000));

        let first = boot.alloc(1);
        assert_eq!(first, PhysAddr::new(0x10_1000));
        let second = boot.alloc(2 * PGSIZE);
        assert_eq!(second, PhysAddr::new(0x10_2000));
        assert_eq!(boot.boundary(), PhysAddr::new(0x10_4000));

        // Zero-byte request: query without advancing.
        assert_eq!(boot.alloc(0), boot.boundary());
    }

    #[test]
    #[should_panic(expected = "runs past physical memory")]
    fn exhaustion_panics() {
        let mut boot = BootAllocator::new(PhysAddr::new(0), &detected(4));
        let _ = boot.alloc(5 * PGSIZE);
    }
}
