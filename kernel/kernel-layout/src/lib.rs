//! # Kernel Memory Layout
//!
//! Paging geometry and the fixed virtual-address partition shared by every
//! address space. Everything here is a compile-time constant; the `const`
//! assertions at the bottom keep the partition self-consistent.
//!
//! ## Virtual memory map
//!
//! ```text
//!    KERNLIM ------>  +------------------------------+ 0x0100_0000_0000
//!                     |   direct physical map        | RW/--
//!    KERNBASE ------> +------------------------------+ 0x0080_0400_0000
//!    KSTACKTOP        |  CPU0 kernel stack           | RW/--
//!                     |  CPU0 stack guard (unmapped) | --/--
//!                     |  CPU1 kernel stack           | RW/--
//!                     ~  ... one slot per CPU ...    ~
//!    MMIOLIM ------>  +------------------------------+ KSTACKTOP - PTSIZE
//!                     |   memory-mapped I/O window   | RW/--
//!    MMIOBASE ----->  +------------------------------+ MMIOLIM - PTSIZE
//!    ULIM             |                              |
//!                     |   page metadata mirror       | R-/R-
//!    UPAGES ------->  +------------------------------+ ULIM - 0x1000_0000
//!                     |   environment mirror         | R-/R-
//!    UENVS -------->  +------------------------------+ UPAGES - 0x0100_0000
//!    UTOP             |                              |
//!                     ~      user address space      ~ RW/RW
//!                     |                              |
//!    0 ------------>  +------------------------------+
//! ```
//!
//! Physical anchors (`MPENTRY_PADDR`, `IOPHYSMEM`, `EXTPHYSMEM`) describe
//! the PC's low-memory layout: the multiprocessor boot trampoline page, the
//! start of the I/O hole, and the start of extended memory.

#![no_std]

/// Bytes per page / physical frame.
pub const PGSIZE: u64 = 4096;

/// log2 of [`PGSIZE`].
pub const PGSHIFT: u32 = 12;

/// Entries per page-table level (9 index bits, 4 levels).
pub const NPTENTRIES: usize = 512;

/// Index bits consumed per level.
pub const PT_INDEX_BITS: u32 = 9;

/// Bytes spanned by one full page table (one PD entry's reach).
pub const PTSIZE: u64 = PGSIZE * NPTENTRIES as u64; // 2 MiB

/// Exclusive upper bound of the direct physical map.
///
/// Together with [`KERNBASE`] this caps how much physical memory the kernel
/// can keep permanently mapped.
pub const KERNLIM: u64 = 0x0100_0000_0000; // 1 TiB, PML4 slot 2

/// Base of the direct physical map: `KERNBASE + pa` addresses physical
/// byte `pa` for all detected memory. Lives in PML4 slot 1.
pub const KERNBASE: u64 = 0x0080_0400_0000;

/// Top of the CPU 0 kernel stack; per-CPU stacks descend from here.
pub const KSTACKTOP: u64 = KERNBASE;

/// Bytes of backed kernel stack per CPU.
pub const KSTKSIZE: u64 = 16 * PGSIZE;

/// Unmapped guard hole between adjacent per-CPU stacks.
pub const KSTKGAP: u64 = 8 * PGSIZE;

/// Maximum number of CPUs the stack area is sized for.
pub const NCPU: usize = 8;

/// Exclusive end of the MMIO reservation window.
pub const MMIOLIM: u64 = KSTACKTOP - PTSIZE;

/// Start of the MMIO reservation window.
pub const MMIOBASE: u64 = MMIOLIM - PTSIZE;

/// User/kernel boundary: user code can never access `[ULIM, ...)`.
pub const ULIM: u64 = MMIOBASE;

/// Read-only user-visible mirror of the page metadata array.
///
/// The window `[UPAGES, ULIM)` bounds how many `PageInfo` records, and
/// therefore how many physical frames, the kernel can manage.
pub const UPAGES: u64 = ULIM - 0x1000_0000; // 256 MiB window

/// Read-only user-visible mirror of the environment array.
pub const UENVS: u64 = UPAGES - 0x0100_0000; // 16 MiB window

/// Top of the user-writable address space.
pub const UTOP: u64 = UENVS;

/// Physical page holding the multiprocessor boot trampoline; never handed
/// out by the frame allocator.
pub const MPENTRY_PADDR: u64 = 0x7000;

/// Start of the legacy I/O hole (VGA, option ROMs); `[IOPHYSMEM,
/// EXTPHYSMEM)` is never usable RAM.
pub const IOPHYSMEM: u64 = 0x000A_0000;

/// First byte of extended memory, directly above the I/O hole.
pub const EXTPHYSMEM: u64 = 0x0010_0000;

/// Pages deliberately left unused below a clamped memory ceiling.
pub const CLAMP_SLACK_PAGES: u64 = 1024;

const _: () = {
    assert!(PGSIZE == 1 << PGSHIFT);
    assert!(PTSIZE == PGSIZE << PT_INDEX_BITS);
    assert!(KERNBASE % PTSIZE == 0);
    assert!(KERNBASE < KERNLIM);
    // The whole stack area fits between MMIOLIM and KSTACKTOP.
    assert!((KSTKSIZE + KSTKGAP) * NCPU as u64 <= KSTACKTOP - MMIOLIM);
    assert!(MMIOBASE < MMIOLIM);
    assert!(UPAGES < ULIM);
    assert!(UENVS < UPAGES);
    assert!(UTOP % PTSIZE == 0 && UPAGES % PTSIZE == 0 && ULIM % PTSIZE == 0);
    assert!(MPENTRY_PADDR % PGSIZE == 0 && MPENTRY_PADDR < IOPHYSMEM);
    assert!(IOPHYSMEM < EXTPHYSMEM);
};
