//! The kernel half of the initial address space.
//!
//! Every address space shares these mappings above `UTOP`: the read-only
//! user-visible mirrors of the frame metadata and environment arrays, the
//! per-CPU kernel stacks with their guard holes, and the direct map of all
//! physical memory at `KERNBASE`.

use crate::aspace::AddressSpace;
use crate::entry::Perm;
use crate::frames::{FrameTable, OutOfMemory};
use crate::phys_mapper::PhysMapper;
use kernel_addresses::{PhysAddr, VirtAddr, align_up};
use kernel_layout::{
    KERNBASE, KSTACKTOP, KSTKGAP, KSTKSIZE, NCPU, PGSIZE, UENVS, ULIM, UPAGES,
};

/// Physical placement of the kernel structures that get mirrored or
/// stacked into every address space.
#[derive(Debug)]
pub struct KernelRegions {
    /// Physical base of the frame metadata array.
    pub pages_pa: PhysAddr,
    /// Size of the frame metadata array in bytes.
    pub pages_len: u64,
    /// Physical base of the environment array.
    pub envs_pa: PhysAddr,
    /// Size of the environment array in bytes.
    pub envs_len: u64,
    /// Physical base of each CPU's kernel stack.
    pub kstacks: [PhysAddr; NCPU],
}

/// Install the kernel mappings into `aspace`.
///
/// * `[UPAGES, UPAGES + pages_len)`: frame metadata, user-readable.
/// * `[UENVS, UENVS + envs_len)`: environments, user-readable.
/// * One `KSTKSIZE` stack per CPU descending from `KSTACKTOP`, kernel
///   read/write, each preceded by an unmapped `KSTKGAP` hole so overflow
///   faults instead of corrupting the next stack.
/// * `[KERNBASE, KERNBASE + npages * PGSIZE)`: the direct map of all
///   managed physical memory, kernel read/write.
///
/// # Errors
///
/// [`OutOfMemory`] when page tables for a mapping cannot be allocated.
///
/// # Panics
///
/// Panics when a mirrored array does not fit its window.
pub fn install<M: PhysMapper>(
    aspace: &AddressSpace<'_, M>,
    frames: &mut FrameTable<'_, M>,
    npages: u64,
    regions: &KernelRegions,
) -> Result<(), OutOfMemory> {
    let pages_bytes = align_up(regions.pages_len, PGSIZE);
    let envs_bytes = align_up(regions.envs_len, PGSIZE);
    assert!(pages_bytes <= ULIM - UPAGES, "frame metadata overflows its mirror window");
    assert!(envs_bytes <= UPAGES - UENVS, "environment array overflows its mirror window");

    aspace.map_region(
        frames,
        VirtAddr::new(UPAGES),
        pages_bytes,
        regions.pages_pa,
        Perm::USER,
    )?;

    aspace.map_region(
        frames,
        VirtAddr::new(UENVS),
        envs_bytes,
        regions.envs_pa,
        Perm::USER,
    )?;

    for (cpu, stack_pa) in regions.kstacks.iter().enumerate() {
        let top = KSTACKTOP - (KSTKSIZE + KSTKGAP) * cpu as u64;
        aspace.map_region(
            frames,
            VirtAddr::new(top - KSTKSIZE),
            KSTKSIZE,
            *stack_pa,
            Perm::WRITABLE,
        )?;
    }

    aspace.map_region(
        frames,
        VirtAddr::new(KERNBASE),
        npages * PGSIZE,
        PhysAddr::new(0),
        Perm::WRITABLE,
    )?;

    Ok(())
}
