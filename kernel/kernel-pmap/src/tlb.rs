//! TLB shootdown, single-core flavor.
//!
//! Editing a page table does not update translations the CPU has already
//! cached. [`TlbInvalidate`] decides whether a flush is needed at all: an
//! edit to an address space that is not loaded on this core becomes
//! visible when its root is loaded, so only the active space needs
//! `invlpg`.

use kernel_addresses::{PhysAddr, VirtAddr};

/// Per-core TLB invalidation policy.
pub trait TlbInvalidate {
    /// Root of the address space currently loaded on this core, or `None`
    /// when no specific space is active (early boot).
    fn active_root(&self) -> Option<PhysAddr>;

    /// Drop this core's cached translation for `va`.
    fn invlpg(&self, va: VirtAddr);

    /// Flush `va` if (and only if) `root` is the active address space.
    fn invalidate(&self, root: PhysAddr, va: VirtAddr) {
        if self.active_root().is_none_or(|active| active == root) {
            self.invlpg(va);
        }
    }
}

/// [`TlbInvalidate`] backed by the real CPU: the active root is read from
/// `CR3`.
#[cfg(target_arch = "x86_64")]
pub struct CpuTlb;

#[cfg(target_arch = "x86_64")]
impl TlbInvalidate for CpuTlb {
    fn active_root(&self) -> Option<PhysAddr> {
        let cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        // Low bits of CR3 are flags, not address bits.
        Some(PhysAddr::new(cr3 & !0xfff))
    }

    fn invlpg(&self, va: VirtAddr) {
        unsafe {
            core::arch::asm!("invlpg [{}]", in(reg) va.as_u64(), options(nostack, preserves_flags));
        }
    }
}
