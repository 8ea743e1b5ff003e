//! Validation of user-supplied pointers against a populated address space.

mod common;

use common::{RecordingTlb, SIM_FRAMES, SimPhys, boot};
use kernel_addresses::VirtAddr;
use kernel_layout::ULIM;
use kernel_pmap::user::{mem_assert, mem_check};
use kernel_pmap::{AccessViolation, AllocInit, Perm};

/// Three pages at the bottom of the space: two user-writable, one
/// kernel-only, and nothing behind them.
fn populate<'a>(
    phys: &'a SimPhys,
    pages: &'a mut Vec<kernel_pmap::PageInfo>,
) -> kernel_pmap::AddressSpace<'a, SimPhys> {
    let (aspace, mut frames) = boot(phys, pages);
    let tlb = RecordingTlb::inactive();
    for (va, perm) in [
        (0x0000, Perm::USER | Perm::WRITABLE),
        (0x1000, Perm::USER | Perm::WRITABLE),
        (0x2000, Perm::WRITABLE),
    ] {
        let frame = frames.alloc(AllocInit::Zeroed).unwrap();
        aspace
            .insert(&mut frames, &tlb, frame, VirtAddr::new(va), perm)
            .unwrap();
    }
    aspace
}

#[test]
fn range_inside_user_mappings_passes() {
    let phys = SimPhys::new(SIM_FRAMES);
    let mut pages = Vec::new();
    let aspace = populate(&phys, &mut pages);

    assert_eq!(
        mem_check(&aspace, VirtAddr::new(0x10), 0x1fe0, Perm::USER | Perm::WRITABLE),
        Ok(())
    );
}

#[test]
fn missing_permission_reports_the_offending_page() {
    let phys = SimPhys::new(SIM_FRAMES);
    let mut pages = Vec::new();
    let aspace = populate(&phys, &mut pages);

    // [0x1800, 0x2800) crosses from a user page into a kernel-only page.
    assert_eq!(
        mem_check(&aspace, VirtAddr::new(0x1800), 0x1000, Perm::USER),
        Err(AccessViolation {
            va: VirtAddr::new(0x2000)
        })
    );
}

#[test]
fn unmapped_start_reports_the_original_address() {
    let phys = SimPhys::new(SIM_FRAMES);
    let mut pages = Vec::new();
    let aspace = populate(&phys, &mut pages);

    assert_eq!(
        mem_check(&aspace, VirtAddr::new(0x3010), 8, Perm::empty()),
        Err(AccessViolation {
            va: VirtAddr::new(0x3010)
        })
    );
}

#[test]
fn ranges_reaching_the_kernel_half_are_rejected() {
    let phys = SimPhys::new(SIM_FRAMES);
    let mut pages = Vec::new();
    let aspace = populate(&phys, &mut pages);

    let near_top = VirtAddr::new(ULIM - 0x1000);
    assert_eq!(
        mem_check(&aspace, near_top, 0x2000, Perm::empty()),
        Err(AccessViolation { va: near_top })
    );

    let above = VirtAddr::new(ULIM + 0x1000);
    assert_eq!(
        mem_check(&aspace, above, 8, Perm::empty()),
        Err(AccessViolation { va: above })
    );
}

#[test]
fn wrapping_ranges_are_rejected() {
    let phys = SimPhys::new(SIM_FRAMES);
    let mut pages = Vec::new();
    let aspace = populate(&phys, &mut pages);

    let near_wrap = VirtAddr::new(u64::MAX - 8);
    assert_eq!(
        mem_check(&aspace, near_wrap, 64, Perm::empty()),
        Err(AccessViolation { va: near_wrap })
    );
}

#[test]
fn empty_ranges_pass_without_a_walk() {
    let phys = SimPhys::new(SIM_FRAMES);
    let mut pages = Vec::new();
    let aspace = populate(&phys, &mut pages);

    // Nothing is mapped here, but zero bytes need zero pages.
    assert_eq!(
        mem_check(&aspace, VirtAddr::new(0x9000), 0, Perm::empty()),
        Ok(())
    );
}

#[test]
fn mem_assert_always_demands_user_access() {
    let phys = SimPhys::new(SIM_FRAMES);
    let mut pages = Vec::new();
    let aspace = populate(&phys, &mut pages);

    let kernel_only = VirtAddr::new(0x2000);
    assert_eq!(mem_check(&aspace, kernel_only, 8, Perm::empty()), Ok(()));
    assert_eq!(
        mem_assert(&aspace, kernel_only, 8, Perm::empty()),
        Err(AccessViolation { va: kernel_only })
    );
}
