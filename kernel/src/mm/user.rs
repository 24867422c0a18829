//! User-pointer validation
//!
//! System calls receive raw addresses from ring 3. A pointer is acceptable
//! only if the whole range it spans lies inside the user 4 MiB window; the
//! kernel never dereferences anything else on a user's behalf.

use super::{USER_BASE, USER_TOP};
use crate::error::{KernelError, KernelResult};

/// Check that `[addr, addr + len)` lies entirely within the user window.
pub fn check_range(addr: usize, len: usize) -> KernelResult<()> {
    if addr < USER_BASE {
        return Err(KernelError::BadAddress);
    }
    let end = addr.checked_add(len).ok_or(KernelError::BadAddress)?;
    if end > USER_TOP {
        return Err(KernelError::BadAddress);
    }
    Ok(())
}

/// Borrow a user buffer for reading.
///
/// # Safety
/// The caller must be executing on behalf of the process whose address
/// space is installed, so a validated range is mapped.
pub unsafe fn slice(addr: usize, len: usize) -> KernelResult<&'static [u8]> {
    check_range(addr, len)?;
    // SAFETY: Range validated above; the user page is mapped for the
    // calling process per the function contract.
    Ok(unsafe { core::slice::from_raw_parts(addr as *const u8, len) })
}

/// Borrow a user buffer for writing.
///
/// # Safety
/// Same contract as [`slice`].
pub unsafe fn slice_mut(addr: usize, len: usize) -> KernelResult<&'static mut [u8]> {
    check_range(addr, len)?;
    // SAFETY: Range validated above; the user page is mapped writable for
    // the calling process per the function contract.
    Ok(unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, len) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_in_window_ranges() {
        assert!(check_range(USER_BASE, 0).is_ok());
        assert!(check_range(USER_BASE + 0x48000, 4096).is_ok());
        assert!(check_range(USER_TOP - 1, 1).is_ok());
    }

    #[test]
    fn rejects_out_of_window_ranges() {
        assert_eq!(check_range(0, 4), Err(KernelError::BadAddress));
        assert_eq!(check_range(USER_BASE - 1, 4), Err(KernelError::BadAddress));
        assert_eq!(check_range(USER_TOP, 1), Err(KernelError::BadAddress));
        assert_eq!(check_range(USER_TOP - 2, 4), Err(KernelError::BadAddress));
        assert_eq!(check_range(usize::MAX - 2, 8), Err(KernelError::BadAddress));
    }
}
