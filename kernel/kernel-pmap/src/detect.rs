//! Physical-memory detection.
//!
//! Two sources: a firmware memory map (the normal path) and the legacy
//! NVRAM byte counts kept by the BIOS (fallback when no map was handed
//! over). Both produce a [`DetectedMemory`] that splits RAM into base
//! memory below the I/O hole and extended memory above it.

use alloc::vec::Vec;
use kernel_addresses::PhysAddr;
use kernel_layout::{CLAMP_SLACK_PAGES, EXTPHYSMEM, KERNBASE, KERNLIM, PGSIZE, ULIM, UPAGES};

use crate::frames::PageInfo;

/// What a firmware memory-map region may be used for, least restrictive
/// first. When regions overlap, the more restrictive kind wins.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum RegionKind {
    /// Free RAM.
    Usable,
    /// ACPI tables; reclaimable once they have been parsed.
    AcpiReclaimable,
    /// ACPI non-volatile storage.
    AcpiNvs,
    /// Firmware-reserved, unknown or out of range.
    Reserved,
    /// Known-bad RAM.
    Defective,
}

impl RegionKind {
    /// Decode the firmware type code; unknown codes are treated as
    /// reserved.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Usable,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::Defective,
            _ => Self::Reserved,
        }
    }

    const fn counts_as_ram(self) -> bool {
        matches!(self, Self::Usable | Self::AcpiReclaimable)
    }
}

/// One entry of the firmware memory map.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryMapEntry {
    /// First physical byte of the region.
    pub base: PhysAddr,
    /// Length in bytes.
    pub length: u64,
    /// Usability of the region.
    pub kind: RegionKind,
}

impl MemoryMapEntry {
    #[must_use]
    pub const fn new(base: u64, length: u64, code: u32) -> Self {
        Self {
            base: PhysAddr::new(base),
            length,
            kind: RegionKind::from_code(code),
        }
    }
}

/// The legacy NVRAM memory counts.
#[derive(Debug, Copy, Clone)]
pub struct LegacyCounts {
    /// Base memory in KiB.
    pub base_kb: u16,
    /// Extended memory in KiB, saturating at the `0xFFFF` sentinel.
    pub ext_kb: u16,
    /// Memory above 16 MiB in 64 KiB units; only meaningful when `ext_kb`
    /// reads the sentinel.
    pub ext16m_64k: u16,
}

/// The sizing result every later boot stage builds on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DetectedMemory {
    /// Frames of managed physical memory; the frame table covers exactly
    /// `[0, npages)`.
    pub npages: u64,
    /// Frames of base memory (below the I/O hole).
    pub npages_base: u64,
}

/// Size physical memory from a firmware memory map.
///
/// Entries are sorted, adjacent same-kind entries merged, and overlapping
/// entries demoted to the more restrictive kind before summing. Usable and
/// ACPI-reclaimable bytes count as RAM.
///
/// # Panics
///
/// Panics if no base memory is found at all.
#[must_use]
pub fn detect_from_map(map: &[MemoryMapEntry]) -> DetectedMemory {
    let mut basemem = 0u64;
    let mut extmem = 0u64;
    for region in normalize(map) {
        if !region.kind.counts_as_ram() {
            continue;
        }
        if region.base.as_u64() < EXTPHYSMEM {
            basemem += region.length;
        } else {
            extmem += region.length;
        }
    }
    totals(basemem, extmem)
}

/// Size physical memory from the legacy NVRAM counts.
///
/// When the extended-memory count saturates at `0xFFFF` KiB, the
/// above-16 MiB count takes over: extended memory then spans from the end
/// of the I/O hole up to `16 MiB + ext16m`.
///
/// # Panics
///
/// Panics if the base-memory count is zero.
#[must_use]
pub fn detect_legacy(counts: &LegacyCounts) -> DetectedMemory {
    let basemem = u64::from(counts.base_kb) * 1024;
    let extmem = if counts.ext_kb == 0xFFFF {
        let above_16m = u64::from(counts.ext16m_64k) * 64 * 1024;
        16 * 1024 * 1024 + above_16m - EXTPHYSMEM
    } else {
        u64::from(counts.ext_kb) * 1024
    };
    totals(basemem, extmem)
}

/// Sort, merge adjacent same-kind regions and demote overlapping ones.
pub(crate) fn normalize(map: &[MemoryMapEntry]) -> Vec<MemoryMapEntry> {
    let mut sorted: Vec<MemoryMapEntry> = map.to_vec();
    sorted.sort_unstable_by_key(|region| region.base);

    let mut out: Vec<MemoryMapEntry> = Vec::with_capacity(sorted.len());
    for mut region in sorted {
        if let Some(last) = out.last_mut() {
            let last_end = last.base.as_u64() + last.length;
            if last_end == region.base.as_u64() && last.kind == region.kind {
                last.length += region.length;
                continue;
            }
            if last_end > region.base.as_u64() {
                let restrictive = last.kind.max(region.kind);
                last.kind = restrictive;
                region.kind = restrictive;
            }
        }
        out.push(region);
    }
    out
}

fn totals(basemem: u64, extmem: u64) -> DetectedMemory {
    assert!(basemem > 0, "no base memory detected");

    let npages_base = basemem / PGSIZE;
    let npages = if extmem > 0 {
        // Extended memory starts directly above the I/O hole, so the frame
        // count includes the hole itself (those frames exist but are never
        // handed out).
        EXTPHYSMEM / PGSIZE + extmem / PGSIZE
    } else {
        npages_base
    };

    log::info!(
        "physical memory: {total}K available, base = {base}K, extended = {ext}K",
        total = (basemem + extmem) / 1024,
        base = basemem / 1024,
        ext = extmem / 1024,
    );

    clamp(DetectedMemory {
        npages,
        npages_base,
    })
}

/// Cap `npages` at what the virtual-address partition can serve: the
/// metadata mirror window must hold one [`PageInfo`] per frame and the
/// direct map must hold every frame.
fn clamp(mut detected: DetectedMemory) -> DetectedMemory {
    let mirror_max = (ULIM - UPAGES) / size_of::<PageInfo>() as u64;
    let direct_max = (KERNLIM - KERNBASE) / PGSIZE;
    let ceiling = mirror_max.min(direct_max);
    if detected.npages > ceiling {
        detected.npages = ceiling - CLAMP_SLACK_PAGES;
        log::warn!(
            "only managing the first {mib} MiB of physical memory",
            mib = detected.npages * PGSIZE / (1024 * 1024),
        );
    }
    detected
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_640K: MemoryMapEntry = MemoryMapEntry::new(0, 640 * 1024, 1);

    #[test]
    fn adjacent_same_kind_regions_merge() {
        let merged = normalize(&[
            MemoryMapEntry::new(0x10_0000, 0x10_0000, 1),
            BASE_640K,
            MemoryMapEntry::new(0x20_0000, 0x10_0000, 1),
        ]);
        assert_eq!(
            merged,
            [
                BASE_640K,
                MemoryMapEntry::new(0x10_0000, 0x20_0000, 1),
            ]
        );

        let detected = detect_from_map(&[
            BASE_640K,
            MemoryMapEntry::new(0x10_0000, 0x10_0000, 1),
            MemoryMapEntry::new(0x20_0000, 0x10_0000, 1),
        ]);
        assert_eq!(detected.npages_base, 160);
        assert_eq!(detected.npages, 256 + 512);
    }

    #[test]
    fn overlap_resolves_to_the_restrictive_kind() {
        // A reserved region punching into usable extended memory knocks the
        // whole overlapping pair out of the RAM total.
        let detected = detect_from_map(&[
            BASE_640K,
            MemoryMapEntry::new(0x10_0000, 0x10_0000, 1),
            MemoryMapEntry::new(0x18_0000, 0x10_0000, 2),
        ]);
        assert_eq!(detected.npages, detected.npages_base);
        assert_eq!(detected.npages_base, 160);
    }

    #[test]
    fn acpi_reclaimable_counts_as_ram() {
        let detected = detect_from_map(&[
            BASE_640K,
            MemoryMapEntry::new(0x10_0000, 0x10_0000, 3),
        ]);
        assert_eq!(detected.npages, 256 + 256);
    }

    #[test]
    fn unknown_codes_are_reserved() {
        assert_eq!(RegionKind::from_code(7), RegionKind::Reserved);
        assert_eq!(RegionKind::from_code(0), RegionKind::Reserved);
    }

    #[test]
    fn legacy_counts_without_sentinel() {
        let detected = detect_legacy(&LegacyCounts {
            base_kb: 640,
            ext_kb: 32 * 1024,
            ext16m_64k: 0,
        });
        assert_eq!(detected.npages_base, 160);
        assert_eq!(detected.npages, 256 + 8192);
    }

    #[test]
    fn legacy_sentinel_switches_to_the_16m_count() {
        // 16 MiB past the 16 MiB line: extended memory is [1 MiB, 32 MiB).
        let detected = detect_legacy(&LegacyCounts {
            base_kb: 640,
            ext_kb: 0xFFFF,
            ext16m_64k: 256,
        });
        assert_eq!(detected.npages, 256 + (31 * 1024 * 1024) / 4096);
    }

    #[test]
    fn oversized_memory_is_clamped_below_the_window_ceiling() {
        let detected = detect_from_map(&[
            BASE_640K,
            MemoryMapEntry::new(0x10_0000, 2 << 40, 1),
        ]);
        let mirror_max = (ULIM - UPAGES) / size_of::<PageInfo>() as u64;
        let direct_max = (KERNLIM - KERNBASE) / PGSIZE;
        assert_eq!(detected.npages, mirror_max.min(direct_max) - CLAMP_SLACK_PAGES);
    }

    #[test]
    #[should_panic(expected = "no base memory")]
    fn zero_base_memory_panics() {
        let _ = detect_from_map(&[MemoryMapEntry::new(0x10_0000, 0x10_0000, 1)]);
    }
}
