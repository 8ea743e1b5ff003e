//! # Physical Memory and Page-Table Management
//!
//! The virtual-memory core of the kernel: physical-memory detection, the
//! boot-time bump allocator, the [`PageInfo`]-based frame allocator, and
//! 4-level x86-64 page-table manipulation.
//!
//! ## Translation layout
//!
//! ```text
//! virtual address
//! 63            48 47         39 38         30 29         21 20         12 11          0
//! +---------------+-------------+-------------+-------------+-------------+------------+
//! |  sign extend  | PML4 index  | PDPT index  |  PD index   |  PT index   | page offset|
//! +---------------+-------------+-------------+-------------+-------------+------------+
//! ```
//!
//! All page tables are accessed through a [`PhysMapper`], which turns a
//! physical table address into a usable reference. The kernel implements it
//! with the direct physical map at `KERNBASE`; host-side tests implement it
//! over simulated RAM, so every routine here runs unmodified under `cargo
//! test`.
//!
//! ## Boot sequence
//!
//! 1. [`detect::detect_from_map`] (or [`detect::detect_legacy`]) sizes RAM.
//! 2. [`BootAllocator`] hands out page-aligned boot structures, including
//!    the `PageInfo` array itself.
//! 3. [`FrameTable::init`] consumes the bump allocator and takes over; all
//!    later allocation goes through [`FrameTable::alloc`].
//! 4. [`kernel_mappings::install`] builds the kernel portion of the initial
//!    address space.

#![cfg_attr(not(test), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod aspace;
pub mod boot_alloc;
pub mod detect;
pub mod entry;
pub mod frames;
pub mod kernel_mappings;
pub mod mmio;
pub mod phys_mapper;
pub mod tlb;
pub mod user;

pub use aspace::{AddressSpace, Level};
pub use boot_alloc::BootAllocator;
pub use detect::{DetectedMemory, LegacyCounts, MemoryMapEntry, RegionKind};
pub use entry::{PageTable, PageTableEntry, Perm};
pub use frames::{AllocInit, BootReserved, FrameTable, OutOfMemory, PageInfo};
pub use mmio::MmioWindow;
pub use phys_mapper::PhysMapper;
#[cfg(target_arch = "x86_64")]
pub use tlb::CpuTlb;
pub use tlb::TlbInvalidate;
pub use user::AccessViolation;
