//! Shared simulation harness: physical RAM as a plain allocation, a
//! recording TLB, and a canned boot sequence.

#![allow(dead_code)]

use core::cell::{Cell, RefCell};

use kernel_addresses::{PhysAddr, VirtAddr};
use kernel_layout::{EXTPHYSMEM, PGSIZE};
use kernel_pmap::{
    AddressSpace, BootAllocator, BootReserved, DetectedMemory, FrameTable, PageInfo, PhysMapper,
    TlbInvalidate,
};

/// Simulated RAM: 4 MiB, 640 KiB of it base memory.
pub const SIM_FRAMES: usize = 1024;
pub const SIM_DETECTED: DetectedMemory = DetectedMemory {
    npages: SIM_FRAMES as u64,
    npages_base: 160,
};

#[repr(C, align(4096))]
struct Frame4K([u8; PGSIZE as usize]);

/// Physical memory backed by an ordinary allocation; physical address 0 is
/// the first byte of the first frame.
pub struct SimPhys {
    frames: Vec<Frame4K>,
}

impl SimPhys {
    pub fn new(nframes: usize) -> Self {
        let mut frames = Vec::with_capacity(nframes);
        frames.resize_with(nframes, || Frame4K([0; PGSIZE as usize]));
        Self { frames }
    }

    /// Fill the frame at `base` with `byte`.
    pub fn fill_frame(&self, base: PhysAddr, byte: u8) {
        let bytes: &mut [u8; PGSIZE as usize] = unsafe { self.phys_to_mut(base) };
        bytes.fill(byte);
    }

    /// The frame at `base` as raw bytes.
    pub fn frame_bytes(&self, base: PhysAddr) -> &[u8; PGSIZE as usize] {
        unsafe { self.phys_to_mut(base) }
    }
}

impl PhysMapper for SimPhys {
    unsafe fn phys_to_mut<'a, T>(&self, phys: PhysAddr) -> &'a mut T {
        let pa = usize::try_from(phys.as_u64()).unwrap();
        let (frame, offset) = (pa / PGSIZE as usize, pa % PGSIZE as usize);
        assert!(
            frame < self.frames.len(),
            "access outside simulated RAM: {phys}"
        );
        let base = std::ptr::from_ref(&self.frames[frame]).cast_mut().cast::<u8>();
        unsafe { &mut *base.add(offset).cast::<T>() }
    }
}

/// A TLB that records every flush instead of executing it.
#[derive(Default)]
pub struct RecordingTlb {
    active: Cell<Option<PhysAddr>>,
    flushes: RefCell<Vec<VirtAddr>>,
}

impl RecordingTlb {
    /// No address space loaded (early boot).
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn set_active(&self, root: Option<PhysAddr>) {
        self.active.set(root);
    }

    pub fn flushes(&self) -> Vec<VirtAddr> {
        self.flushes.borrow().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.borrow().len()
    }
}

impl TlbInvalidate for RecordingTlb {
    fn active_root(&self) -> Option<PhysAddr> {
        self.active.get()
    }

    fn invlpg(&self, va: VirtAddr) {
        self.flushes.borrow_mut().push(va);
    }
}

/// Run the canned boot sequence: detect, bump-allocate the root table at
/// the first frame of extended memory, initialize the frame table.
pub fn boot<'a>(
    phys: &'a SimPhys,
    pages: &'a mut Vec<PageInfo>,
) -> (AddressSpace<'a, SimPhys>, FrameTable<'a, SimPhys>) {
    pages.clear();
    pages.resize(SIM_FRAMES, PageInfo::new());
    let mut boot = BootAllocator::new(PhysAddr::new(EXTPHYSMEM), &SIM_DETECTED);
    let root = boot.alloc(PGSIZE);
    let frames = FrameTable::init(pages, boot, &SIM_DETECTED, &BootReserved::none(), phys);
    (AddressSpace::new(phys, root), frames)
}

/// Software page-table walk: the physical address `va` translates to.
pub fn va2pa(aspace: &AddressSpace<'_, SimPhys>, va: u64) -> Option<u64> {
    aspace
        .lookup(VirtAddr::new(va))
        .map(|(frame, _)| frame.base().as_u64() + va % PGSIZE)
}
