//! Validation of user-supplied memory ranges.
//!
//! System calls receive pointers from untrusted user code and must not
//! touch them before proving the whole range is below the user/kernel
//! boundary and mapped with the required permissions.

use crate::aspace::AddressSpace;
use crate::entry::Perm;
use crate::phys_mapper::PhysMapper;
use kernel_addresses::{VirtAddr, align_down};
use kernel_layout::{PGSIZE, ULIM};

/// A user range failed validation; `va` is the lowest offending address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("user memory access violation at {va}")]
pub struct AccessViolation {
    pub va: VirtAddr,
}

/// Check that user code could access `[va, va + len)` with permissions
/// `perm` (`PRESENT` is implied).
///
/// # Errors
///
/// [`AccessViolation`] carrying the first bad address when the range
/// reaches the kernel half, wraps around the address space, or crosses a
/// page that is unmapped or lacks a requested permission bit.
pub fn mem_check<M: PhysMapper>(
    space: &AddressSpace<'_, M>,
    va: VirtAddr,
    len: u64,
    perm: Perm,
) -> Result<(), AccessViolation> {
    let Some(end) = va.checked_add(len) else {
        return Err(AccessViolation { va });
    };
    if end.as_u64() >= ULIM {
        return Err(AccessViolation { va });
    }

    let required = perm | Perm::PRESENT;
    let mut cursor = va;
    while cursor < end {
        let mapped = space
            .walk(cursor)
            .is_some_and(|entry| entry.has_perm(required));
        if !mapped {
            return Err(AccessViolation { va: cursor });
        }
        cursor = VirtAddr::new(align_down(cursor.as_u64(), PGSIZE) + PGSIZE);
    }
    Ok(())
}

/// [`mem_check`] with `USER` added to the required permissions, logging
/// the failure.
///
/// On `Err` the caller is expected to destroy the offending environment;
/// when that environment is the current one, control does not return to
/// it.
///
/// # Errors
///
/// See [`mem_check`].
pub fn mem_assert<M: PhysMapper>(
    space: &AddressSpace<'_, M>,
    va: VirtAddr,
    len: u64,
    perm: Perm,
) -> Result<(), AccessViolation> {
    mem_check(space, va, len, perm | Perm::USER).inspect_err(|violation| {
        log::error!(
            "user memory check failed for va {va} ({len} bytes, first bad address {bad})",
            bad = violation.va,
        );
    })
}
