//! Address spaces: walking and editing the 4-level translation tree.
//!
//! An [`AddressSpace`] is identified by the physical address of its root
//! table. All table access goes through the [`PhysMapper`]; the frame
//! allocator is passed into each call that may need to grow the tree, so
//! one allocator can serve many address spaces.

use crate::entry::{PageTableEntry, Perm};
use crate::frames::{AllocInit, FrameTable, OutOfMemory};
use crate::phys_mapper::{PhysMapper, table_mut};
use crate::tlb::TlbInvalidate;
use kernel_addresses::{FrameNumber, PhysAddr, VirtAddr};
use kernel_layout::PGSIZE;

/// One level of the translation tree, root first.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Level {
    Pml4,
    Pdpt,
    Pd,
    Pt,
}

impl Level {
    const fn shift(self) -> u32 {
        match self {
            Self::Pml4 => 39,
            Self::Pdpt => 30,
            Self::Pd => 21,
            Self::Pt => 12,
        }
    }

    /// This level's index into the table, for `va`.
    #[must_use]
    pub const fn index(self, va: VirtAddr) -> usize {
        ((va.as_u64() >> self.shift()) & 0x1ff) as usize
    }

    /// The next level down, or `None` at the leaf level.
    #[must_use]
    pub const fn child(self) -> Option<Self> {
        match self {
            Self::Pml4 => Some(Self::Pdpt),
            Self::Pdpt => Some(Self::Pd),
            Self::Pd => Some(Self::Pt),
            Self::Pt => None,
        }
    }
}

/// A 4-level address space rooted at `root`.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysAddr,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Wrap the (already initialized) root table at `root`.
    #[must_use]
    pub const fn new(mapper: &'m M, root: PhysAddr) -> Self {
        Self { root, mapper }
    }

    /// Physical address of the root table.
    #[must_use]
    pub const fn root(&self) -> PhysAddr {
        self.root
    }

    fn entry_at(&self, table: PhysAddr, level: Level, va: VirtAddr) -> &'m mut PageTableEntry {
        unsafe { table_mut(self.mapper, table) }.entry_mut(level.index(va))
    }

    /// The leaf entry for `va`, or `None` when an intermediate table is
    /// missing. The entry itself may be non-present.
    #[must_use]
    pub fn walk(&self, va: VirtAddr) -> Option<&'m mut PageTableEntry> {
        let mut table = self.root;
        let mut level = Level::Pml4;
        loop {
            let entry = self.entry_at(table, level, va);
            let Some(child) = level.child() else {
                return Some(entry);
            };
            if !entry.present() {
                return None;
            }
            table = entry.frame_base();
            level = child;
        }
    }

    /// The leaf entry for `va`, allocating zeroed intermediate tables as
    /// needed.
    ///
    /// Fresh intermediate entries are maximally permissive (present,
    /// writable, user); restriction happens at the leaf. Each fresh table
    /// frame is referenced once by its parent entry.
    ///
    /// # Errors
    ///
    /// [`OutOfMemory`] when a table frame cannot be allocated. Tables
    /// already created for this call are torn down again, leaving the tree
    /// as it was.
    pub fn walk_create(
        &self,
        frames: &mut FrameTable<'_, M>,
        va: VirtAddr,
    ) -> Result<&'m mut PageTableEntry, OutOfMemory> {
        self.walk_create_in(frames, self.root, Level::Pml4, va)
    }

    fn walk_create_in(
        &self,
        frames: &mut FrameTable<'_, M>,
        table: PhysAddr,
        level: Level,
        va: VirtAddr,
    ) -> Result<&'m mut PageTableEntry, OutOfMemory> {
        let entry = self.entry_at(table, level, va);
        let Some(child) = level.child() else {
            return Ok(entry);
        };
        if entry.present() {
            return self.walk_create_in(frames, entry.frame_base(), child, va);
        }

        let table_frame = frames.alloc(AllocInit::Zeroed)?;
        frames.incref(table_frame);
        *entry = PageTableEntry::make_table(table_frame);
        match self.walk_create_in(frames, table_frame.base(), child, va) {
            Ok(leaf) => Ok(leaf),
            Err(err) => {
                // A deeper allocation failed; undo this level.
                entry.clear();
                frames.decref(table_frame);
                Err(err)
            }
        }
    }

    /// OR `perm` into every intermediate entry on the (present) path to
    /// `va`.
    fn widen_path(&self, va: VirtAddr, perm: Perm) {
        let mut table = self.root;
        let mut level = Level::Pml4;
        while let Some(child) = level.child() {
            let entry = self.entry_at(table, level, va);
            debug_assert!(entry.present());
            entry.or_perm(perm);
            table = entry.frame_base();
            level = child;
        }
    }

    /// Map the physical range `[pa, pa + size)` at `[va, va + size)` with
    /// `perm`, page by page. Frame reference counts are not touched; this
    /// is for ranges outside the frame allocator's regime (the direct map,
    /// MMIO, kernel mirrors).
    ///
    /// # Errors
    ///
    /// [`OutOfMemory`] when an intermediate table cannot be allocated;
    /// pages mapped before the failure stay mapped.
    ///
    /// # Panics
    ///
    /// Panics when `va`, `pa` or `size` is not page-aligned.
    pub fn map_region(
        &self,
        frames: &mut FrameTable<'_, M>,
        va: VirtAddr,
        size: u64,
        pa: PhysAddr,
        perm: Perm,
    ) -> Result<(), OutOfMemory> {
        assert!(
            va.is_page_aligned() && pa.is_page_aligned() && size % PGSIZE == 0,
            "unaligned region: {size} bytes {pa} -> {va}",
        );
        let mut offset = 0;
        while offset < size {
            let page_va = va + offset;
            let entry = self.walk_create(frames, page_va)?;
            *entry = PageTableEntry::make_leaf((pa + offset).frame(), perm);
            self.widen_path(page_va, perm);
            offset += PGSIZE;
        }
        Ok(())
    }

    /// Map `frame` at `va` with `perm`, replacing any existing mapping.
    ///
    /// The frame's reference count rises by one. Re-inserting the frame
    /// already mapped at `va` only updates the permissions; in particular
    /// it never momentarily drops the count to zero. Software-available
    /// permission bits stay confined to the leaf.
    ///
    /// # Errors
    ///
    /// [`OutOfMemory`] when an intermediate table cannot be allocated; the
    /// existing mapping is left untouched.
    pub fn insert<T: TlbInvalidate>(
        &self,
        frames: &mut FrameTable<'_, M>,
        tlb: &T,
        frame: FrameNumber,
        va: VirtAddr,
        perm: Perm,
    ) -> Result<(), OutOfMemory> {
        let entry = self.walk_create(frames, va)?;
        self.widen_path(va, perm.difference(Perm::AVAIL));

        if entry.present() {
            if entry.frame() == frame {
                *entry = PageTableEntry::make_leaf(frame, perm);
                tlb.invalidate(self.root, va);
                return Ok(());
            }
            let old = entry.frame();
            entry.clear();
            tlb.invalidate(self.root, va);
            frames.decref(old);
        }

        frames.incref(frame);
        *entry = PageTableEntry::make_leaf(frame, perm);
        tlb.invalidate(self.root, va);
        Ok(())
    }

    /// The frame mapped at `va` and its leaf entry, or `None` when nothing
    /// is mapped there.
    #[must_use]
    pub fn lookup(&self, va: VirtAddr) -> Option<(FrameNumber, &'m mut PageTableEntry)> {
        let entry = self.walk(va)?;
        if !entry.present() {
            return None;
        }
        Some((entry.frame(), entry))
    }

    /// Unmap `va`, dropping the mapped frame's reference. Does nothing when
    /// `va` is not mapped.
    ///
    /// Intermediate tables are left in place even when their last leaf goes
    /// away; address-space teardown reclaims them wholesale.
    pub fn remove<T: TlbInvalidate>(
        &self,
        frames: &mut FrameTable<'_, M>,
        tlb: &T,
        va: VirtAddr,
    ) {
        if let Some((frame, entry)) = self.lookup(va) {
            entry.clear();
            tlb.invalidate(self.root, va);
            frames.decref(frame);
        }
    }
}
