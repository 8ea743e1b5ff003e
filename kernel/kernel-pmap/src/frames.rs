//! The physical frame allocator.
//!
//! One [`PageInfo`] record per physical frame, indexed by frame number.
//! Free frames are chained through their records by index, so the free
//! list costs no space inside the frames themselves and a record's list
//! membership is always explicit: an in-use frame is [`FreeLink::Detached`],
//! never accidentally half-linked.

use core::ops::Range;

use crate::boot_alloc::BootAllocator;
use crate::detect::DetectedMemory;
use crate::phys_mapper::{PhysMapper, zero_frame};
use kernel_addresses::{FrameNumber, PhysAddr};
use kernel_layout::{MPENTRY_PADDR, PGSIZE};

/// No free frame was available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("out of free physical frames")]
pub struct OutOfMemory;

/// Free-list membership of one frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FreeLink {
    /// Not on the free list (allocated or reserved).
    Detached,
    /// On the free list, last element.
    End,
    /// On the free list, followed by the given frame.
    Next(FrameNumber),
}

/// Per-frame allocation metadata.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PageInfo {
    ref_count: u16,
    link: FreeLink,
}

impl PageInfo {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ref_count: 0,
            link: FreeLink::Detached,
        }
    }

    /// Number of page-table leaves (plus other owners) pointing at the
    /// frame.
    #[must_use]
    pub const fn ref_count(&self) -> u16 {
        self.ref_count
    }
}

impl Default for PageInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether [`FrameTable::alloc`] should zero-fill the frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AllocInit {
    /// Return the frame with whatever bytes it last held.
    Uninitialized,
    /// Zero-fill the frame before returning it.
    Zeroed,
}

/// Physical frames permanently claimed before the frame table exists,
/// beyond what the bump-allocator boundary already covers.
#[derive(Debug, Clone)]
pub struct BootReserved {
    /// Frames holding the boot page-table image the CPU is running on.
    pub boot_tables: Range<FrameNumber>,
}

impl BootReserved {
    /// Nothing reserved outside the bump-allocated region.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            boot_tables: FrameNumber::new(0)..FrameNumber::new(0),
        }
    }
}

/// The frame allocator: the `PageInfo` array plus its free-list head.
///
/// Frame *contents* are only touched for zero-filling, through the
/// [`PhysMapper`]; everything else operates on the metadata records.
pub struct FrameTable<'a, M: PhysMapper> {
    mapper: &'a M,
    pages: &'a mut [PageInfo],
    free_head: Option<FrameNumber>,
}

impl<'a, M: PhysMapper> FrameTable<'a, M> {
    /// Classify every frame and build the free list, consuming the boot
    /// allocator.
    ///
    /// In use, and never handed out: frame 0 (BIOS structures), the I/O
    /// hole together with everything the kernel image and boot allocator
    /// claimed below `boot.boundary()`, the multiprocessor trampoline
    /// frame, and the boot page-table image. Everything else is free, and
    /// the free list is chained in ascending frame order.
    ///
    /// # Panics
    ///
    /// Panics when `pages` does not hold exactly one record per detected
    /// frame.
    pub fn init(
        pages: &'a mut [PageInfo],
        boot: BootAllocator,
        detected: &DetectedMemory,
        reserved: &BootReserved,
        mapper: &'a M,
    ) -> Self {
        assert!(
            pages.len() as u64 == detected.npages,
            "frame metadata holds {} records for {} frames",
            pages.len(),
            detected.npages,
        );

        let boundary = boot.retire().as_u64() / PGSIZE;
        let trampoline = PhysAddr::new(MPENTRY_PADDR).frame();

        let mut table = Self {
            mapper,
            pages,
            free_head: None,
        };
        let mut tail: Option<FrameNumber> = None;
        for index in 0..table.pages.len() {
            let frame = FrameNumber::new(index as u32);
            let index_u64 = index as u64;

            let mut in_use = index == 0 || index_u64 >= detected.npages_base;
            if frame == trampoline {
                in_use = true;
            }
            if index_u64 >= boundary {
                in_use = false;
            }
            if reserved.boot_tables.contains(&frame) {
                in_use = true;
            }

            if in_use {
                table.pages[index] = PageInfo {
                    ref_count: 1,
                    link: FreeLink::Detached,
                };
            } else {
                table.pages[index] = PageInfo {
                    ref_count: 0,
                    link: FreeLink::End,
                };
                match tail {
                    Some(prev) => table.pages[prev.as_usize()].link = FreeLink::Next(frame),
                    None => table.free_head = Some(frame),
                }
                tail = Some(frame);
            }
        }
        table
    }

    /// Pop a frame off the free list. The new frame's reference count is
    /// zero; mapping it (or otherwise keeping it) must go through
    /// [`incref`](Self::incref).
    ///
    /// # Errors
    ///
    /// [`OutOfMemory`] when the free list is empty.
    pub fn alloc(&mut self, init: AllocInit) -> Result<FrameNumber, OutOfMemory> {
        let frame = self.free_head.ok_or(OutOfMemory)?;
        let info = &mut self.pages[frame.as_usize()];
        assert!(info.ref_count == 0, "referenced frame {frame} on the free list");
        self.free_head = match info.link {
            FreeLink::Next(next) => Some(next),
            FreeLink::End => None,
            FreeLink::Detached => panic!("free list reaches detached frame {frame}"),
        };
        info.link = FreeLink::Detached;
        if init == AllocInit::Zeroed {
            unsafe { zero_frame(self.mapper, frame) };
        }
        Ok(frame)
    }

    /// Push an unreferenced frame back onto the free list.
    ///
    /// # Panics
    ///
    /// Panics when the frame is still referenced or already free; both mean
    /// the caller's bookkeeping is corrupt and continuing would hand the
    /// same frame out twice.
    pub fn free(&mut self, frame: FrameNumber) {
        let head = self.free_head;
        let info = &mut self.pages[frame.as_usize()];
        assert!(info.ref_count == 0, "freeing referenced frame {frame}");
        assert!(
            info.link == FreeLink::Detached,
            "double free of frame {frame}"
        );
        info.link = match head {
            Some(next) => FreeLink::Next(next),
            None => FreeLink::End,
        };
        self.free_head = Some(frame);
    }

    /// Record one more owner of `frame`.
    pub fn incref(&mut self, frame: FrameNumber) {
        let info = &mut self.pages[frame.as_usize()];
        assert!(
            info.link == FreeLink::Detached,
            "reference to free frame {frame}"
        );
        info.ref_count = info
            .ref_count
            .checked_add(1)
            .unwrap_or_else(|| panic!("reference count overflow on frame {frame}"));
    }

    /// Drop one owner of `frame`, returning it to the free list when the
    /// last owner goes away.
    pub fn decref(&mut self, frame: FrameNumber) {
        let info = &mut self.pages[frame.as_usize()];
        assert!(info.ref_count > 0, "decref of unreferenced frame {frame}");
        info.ref_count -= 1;
        if info.ref_count == 0 {
            self.free(frame);
        }
    }

    /// Reference count of `frame`.
    #[must_use]
    pub fn ref_count(&self, frame: FrameNumber) -> u16 {
        self.pages[frame.as_usize()].ref_count
    }

    /// Whether `frame` currently sits on the free list.
    #[must_use]
    pub fn is_free(&self, frame: FrameNumber) -> bool {
        self.pages[frame.as_usize()].link != FreeLink::Detached
    }

    /// The free frames, in list order.
    pub fn free_frames(&self) -> FreeFrames<'_> {
        FreeFrames {
            pages: self.pages,
            cursor: self.free_head,
        }
    }
}

/// Iterator over the free list; see [`FrameTable::free_frames`].
pub struct FreeFrames<'t> {
    pages: &'t [PageInfo],
    cursor: Option<FrameNumber>,
}

impl Iterator for FreeFrames<'_> {
    type Item = FrameNumber;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = self.cursor?;
        self.cursor = match self.pages[frame.as_usize()].link {
            FreeLink::Next(next) => Some(next),
            _ => None,
        };
        Some(frame)
    }
}
