//! Paging control registers
//!
//! The page directories and tables themselves live in [`crate::mm::paging`];
//! this module is the thin layer that loads CR3 and flips the enable bits.

use core::arch::asm;

/// Load a page directory (by physical address) into CR3. Also serves as a
/// full TLB flush after page-table edits.
///
/// # Safety
/// `directory_phys` must be the 4 KiB-aligned physical address of a valid
/// page directory that maps the currently-executing kernel code.
#[inline]
pub unsafe fn load_directory(directory_phys: u32) {
    // SAFETY: Caller guarantees the directory is valid; writing CR3 has no
    // other side effect than switching the address space.
    unsafe {
        asm!("mov cr3, {}", in(reg) directory_phys, options(nostack, preserves_flags));
    }
}

/// Turn on 4 MiB page support (CR4.PSE) and paging (CR0.PG). Called once,
/// after the initial directory has been loaded into CR3.
///
/// # Safety
/// CR3 must already hold a directory that identity-maps the code performing
/// this call, otherwise the instruction after enabling faults.
pub unsafe fn enable() {
    // SAFETY: Read-modify-write of CR4 and CR0 with only the PSE and PG
    // bits added; the caller guarantees CR3 is valid.
    unsafe {
        asm!(
            "mov {tmp}, cr4",
            "or {tmp}, 0x10", // PSE
            "mov cr4, {tmp}",
            "mov {tmp}, cr0",
            "or {tmp}, 0x80000000", // PG
            "mov cr0, {tmp}",
            tmp = out(reg) _,
            options(nostack, preserves_flags)
        );
    }
}
