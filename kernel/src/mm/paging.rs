//! Page directories and tables
//!
//! The address-space layout is fixed: a shared 4 MiB kernel page at 4 MiB
//! (virtual = physical, global), a per-process user 4 MiB page at 128 MiB,
//! and a first-4 MiB page table that carries exactly two meaningful video
//! mappings per terminal: the redirectable page at `0xB8000` and the
//! always-physical alias one page above it. All structures are statically
//! reserved and 4 KiB aligned; their virtual addresses equal their physical
//! addresses because they live inside the kernel page.

use bitflags::bitflags;

use super::{LARGE_PAGE_SIZE, USER_BASE, USER_SLOT_PHYS_BASE, VIDEO_PHYS};

/// Entries per directory or table.
pub const ENTRY_COUNT: usize = 1024;

/// Index of the page-table pointer covering the first 4 MiB.
pub const FIRST_TABLE_INDEX: usize = 0;
/// Index of the kernel's global 4 MiB page (virtual 4 MiB).
pub const KERNEL_PDE_INDEX: usize = 1;
/// Index of the user 4 MiB page (virtual 128 MiB).
pub const USER_PDE_INDEX: usize = USER_BASE / LARGE_PAGE_SIZE;
/// Directory slot holding the vidmap table.
pub const VIDMAP_PDE_INDEX: usize = 35;
/// Entry inside the vidmap table that maps video memory.
pub const VIDMAP_PTE_INDEX: usize = 512;
/// The user-visible vidmap address those two indices produce.
pub const VIDMAP_VIRT: usize = VIDMAP_PDE_INDEX * LARGE_PAGE_SIZE + VIDMAP_PTE_INDEX * 4096;

/// Page-table entry index of the text frame buffer (virtual 0xB8000).
pub const VIDEO_PTE_INDEX: usize = VIDEO_PHYS / 4096;
/// Entry one page above: the kernel's always-physical video alias.
pub const VIDEO_ALIAS_PTE_INDEX: usize = VIDEO_PTE_INDEX + 1;

bitflags! {
    /// Flag bits shared by directory and table entries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        /// In a directory entry: maps a 4 MiB page directly.
        const LARGE         = 1 << 7;
        const GLOBAL        = 1 << 8;
    }
}

/// A page-directory entry: either a pointer to a page table (20-bit base)
/// or a 4 MiB page mapping (10-bit base).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct DirectoryEntry(u32);

impl DirectoryEntry {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Entry pointing at a 4 KiB-aligned page table.
    pub fn table(table_phys: u32, flags: PageFlags) -> Self {
        Self((table_phys & 0xFFFF_F000) | flags.bits())
    }

    /// Entry mapping a 4 MiB-aligned page directly.
    pub fn large_page(page_phys: u32, flags: PageFlags) -> Self {
        Self((page_phys & 0xFFC0_0000) | (flags | PageFlags::LARGE).bits())
    }

    pub const fn is_present(self) -> bool {
        self.0 & PageFlags::PRESENT.bits() != 0
    }

    pub fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0)
    }

    /// Physical base address, interpreted per the LARGE flag.
    pub fn addr(self) -> u32 {
        if self.flags().contains(PageFlags::LARGE) {
            self.0 & 0xFFC0_0000
        } else {
            self.0 & 0xFFFF_F000
        }
    }
}

/// A page-table entry mapping one 4 KiB page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct TableEntry(u32);

impl TableEntry {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn page(page_phys: u32, flags: PageFlags) -> Self {
        Self((page_phys & 0xFFFF_F000) | flags.bits())
    }

    pub const fn is_present(self) -> bool {
        self.0 & PageFlags::PRESENT.bits() != 0
    }

    pub fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0)
    }

    pub fn addr(self) -> u32 {
        self.0 & 0xFFFF_F000
    }

    /// Point this entry at a different physical page, keeping its flags.
    pub fn retarget(&mut self, page_phys: u32) {
        self.0 = (page_phys & 0xFFFF_F000) | (self.0 & 0xFFF);
    }
}

/// A page table: 1024 entries, 4 KiB aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [TableEntry; ENTRY_COUNT],
}

impl PageTable {
    pub const fn new() -> Self {
        Self {
            entries: [TableEntry::empty(); ENTRY_COUNT],
        }
    }

    /// Physical address of this table (virtual = physical inside the
    /// kernel page).
    pub fn phys(&self) -> u32 {
        self as *const _ as u32
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A page directory: 1024 entries, 4 KiB aligned.
#[repr(C, align(4096))]
pub struct PageDirectory {
    pub entries: [DirectoryEntry; ENTRY_COUNT],
}

impl PageDirectory {
    pub const fn new() -> Self {
        Self {
            entries: [DirectoryEntry::empty(); ENTRY_COUNT],
        }
    }

    pub fn phys(&self) -> u32 {
        self as *const _ as u32
    }

    /// Populate the shared initial layout: the first-4 MiB table pointer
    /// and the global kernel 4 MiB page.
    pub fn init_shared(&mut self, first_table_phys: u32) {
        self.entries[FIRST_TABLE_INDEX] = DirectoryEntry::table(
            first_table_phys,
            PageFlags::PRESENT | PageFlags::WRITABLE,
        );
        self.entries[KERNEL_PDE_INDEX] = DirectoryEntry::large_page(
            LARGE_PAGE_SIZE as u32,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::GLOBAL,
        );
    }

    /// Turn a clone of the initial directory into the directory of process
    /// `pid` on `terminal`: the first 4 MiB goes through the terminal's
    /// video table and the user slot maps the pid's physical 4 MiB.
    pub fn init_for_process(&mut self, pid: usize, terminal_table_phys: u32) {
        self.entries[FIRST_TABLE_INDEX] = DirectoryEntry::table(
            terminal_table_phys,
            PageFlags::PRESENT | PageFlags::WRITABLE,
        );
        self.entries[USER_PDE_INDEX] = DirectoryEntry::large_page(
            (USER_SLOT_PHYS_BASE + pid * LARGE_PAGE_SIZE) as u32,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
        );
    }
}

impl Default for PageDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill a terminal's first-4 MiB table: the video page targets physical
/// video memory when the terminal is visible, its backing page otherwise;
/// the alias entry always targets physical video memory.
pub fn init_terminal_table(table: &mut PageTable, backing_phys: u32, visible: bool) {
    let flags = PageFlags::PRESENT | PageFlags::WRITABLE;
    let video_target = if visible { VIDEO_PHYS as u32 } else { backing_phys };
    table.entries[VIDEO_PTE_INDEX] = TableEntry::page(video_target, flags);
    table.entries[VIDEO_ALIAS_PTE_INDEX] = TableEntry::page(VIDEO_PHYS as u32, flags);
}

// ---------------------------------------------------------------------------
// Static paging structures and CR3 control (bare metal only)
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod tables {
    use super::*;
    use crate::arch::x86::paging as regs;
    use crate::process::MAX_PROCESSES;
    use crate::terminal::TERMINAL_COUNT;

    static mut INITIAL_DIRECTORY: PageDirectory = PageDirectory::new();
    static mut INITIAL_TABLE: PageTable = PageTable::new();
    static mut PROCESS_DIRECTORIES: [PageDirectory; MAX_PROCESSES] =
        [const { PageDirectory::new() }; MAX_PROCESSES];
    static mut TERMINAL_VIDEO_TABLES: [PageTable; TERMINAL_COUNT] =
        [const { PageTable::new() }; TERMINAL_COUNT];
    static mut VIDMAP_TABLES: [PageTable; TERMINAL_COUNT] =
        [const { PageTable::new() }; TERMINAL_COUNT];

    fn initial_directory() -> *mut PageDirectory {
        core::ptr::addr_of_mut!(INITIAL_DIRECTORY)
    }

    fn process_directory(pid: usize) -> *mut PageDirectory {
        // SAFETY: pid is bounded by MAX_PROCESSES at every call site.
        unsafe { core::ptr::addr_of_mut!(PROCESS_DIRECTORIES[pid]) }
    }

    fn terminal_table(terminal: usize) -> *mut PageTable {
        // SAFETY: terminal is bounded by TERMINAL_COUNT at every call site.
        unsafe { core::ptr::addr_of_mut!(TERMINAL_VIDEO_TABLES[terminal]) }
    }

    /// Build the initial address space and switch it on. Called once during
    /// boot, interrupts disabled.
    pub fn init() {
        // SAFETY: Single-threaded boot; nothing else references the statics
        // yet and paging is still off.
        unsafe {
            let table = core::ptr::addr_of_mut!(INITIAL_TABLE);
            (*table).entries[VIDEO_PTE_INDEX] = TableEntry::page(
                VIDEO_PHYS as u32,
                PageFlags::PRESENT | PageFlags::WRITABLE,
            );
            let dir = initial_directory();
            (*dir).init_shared((*table).phys());
            regs::load_directory((*dir).phys());
            regs::enable();
        }
        log::info!("paging enabled, kernel page global at 4 MiB");
    }

    /// Prepare the video table of a newly activated terminal.
    pub fn setup_terminal_table(terminal: usize, backing_phys: u32, visible: bool) {
        // SAFETY: Called under cli from execute; the table is not referenced
        // by any loaded directory until init_process_directory runs.
        unsafe {
            init_terminal_table(&mut *terminal_table(terminal), backing_phys, visible);
        }
    }

    /// Retarget a terminal's video page (terminal switch). The caller
    /// reloads CR3 afterwards.
    pub fn retarget_terminal_video(terminal: usize, page_phys: u32) {
        // SAFETY: Called under cli from the terminal switch path; entry 184
        // was populated by setup_terminal_table.
        unsafe {
            (*terminal_table(terminal)).entries[VIDEO_PTE_INDEX].retarget(page_phys);
        }
    }

    /// Build the page directory for process `pid` running on `terminal`.
    pub fn init_process_directory(pid: usize, terminal: usize) {
        // SAFETY: Called under cli from execute; `pid` was just allocated so
        // no running context uses this directory.
        unsafe {
            let dir = process_directory(pid);
            *dir = PageDirectory::new();
            (*dir).init_shared((*core::ptr::addr_of!(INITIAL_TABLE)).phys());
            (*dir).init_for_process(pid, (*terminal_table(terminal)).phys());
        }
    }

    /// Load process `pid`'s directory into CR3.
    pub fn install_process(pid: usize) {
        // SAFETY: The directory was built by init_process_directory and maps
        // the kernel page; loading CR3 is the address-space switch.
        unsafe {
            regs::load_directory((*process_directory(pid)).phys());
        }
    }

    /// Expose the visible-video mapping to process `pid` on `terminal`.
    /// Returns the fixed user virtual address of the mapping.
    pub fn map_vidmap(pid: usize, terminal: usize) -> usize {
        // SAFETY: Called under cli from the vidmap syscall of the running
        // process; the caller reloads CR3 to flush the TLB.
        unsafe {
            let table = core::ptr::addr_of_mut!(VIDMAP_TABLES[terminal]);
            let target = (*terminal_table(terminal)).entries[VIDEO_PTE_INDEX].addr();
            (*table).entries[VIDMAP_PTE_INDEX] = TableEntry::page(
                target,
                PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
            );
            (*process_directory(pid)).entries[VIDMAP_PDE_INDEX] = DirectoryEntry::table(
                (*table).phys(),
                PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
            );
        }
        VIDMAP_VIRT
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use tables::{
    init, init_process_directory, install_process, map_vidmap, retarget_terminal_video,
    setup_terminal_table,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_page_entry_packs_ten_bit_base() {
        let entry = DirectoryEntry::large_page(
            (USER_SLOT_PHYS_BASE + 3 * LARGE_PAGE_SIZE) as u32,
            PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER,
        );
        assert!(entry.is_present());
        assert!(entry.flags().contains(PageFlags::LARGE));
        assert!(entry.flags().contains(PageFlags::USER));
        assert_eq!(entry.addr(), 0x0140_0000); // 8 MiB + 3 * 4 MiB
    }

    #[test]
    fn table_entry_retarget_keeps_flags() {
        let mut entry = TableEntry::page(0xB8000, PageFlags::PRESENT | PageFlags::WRITABLE);
        entry.retarget(0x0012_3000);
        assert_eq!(entry.addr(), 0x0012_3000);
        assert!(entry.flags().contains(PageFlags::PRESENT));
        assert!(entry.flags().contains(PageFlags::WRITABLE));
    }

    #[test]
    fn vidmap_address_is_fixed_constant() {
        assert_eq!(VIDMAP_VIRT, 35 * LARGE_PAGE_SIZE + 512 * 4096);
        assert_eq!(VIDMAP_VIRT / LARGE_PAGE_SIZE, VIDMAP_PDE_INDEX);
        assert_eq!((VIDMAP_VIRT / 4096) % ENTRY_COUNT, VIDMAP_PTE_INDEX);
    }

    #[test]
    fn terminal_table_targets_follow_visibility() {
        let mut table = PageTable::new();
        let backing = 0x0050_0000u32;

        init_terminal_table(&mut table, backing, false);
        assert_eq!(table.entries[VIDEO_PTE_INDEX].addr(), backing);
        assert_eq!(table.entries[VIDEO_ALIAS_PTE_INDEX].addr(), VIDEO_PHYS as u32);

        init_terminal_table(&mut table, backing, true);
        assert_eq!(table.entries[VIDEO_PTE_INDEX].addr(), VIDEO_PHYS as u32);
        assert_eq!(table.entries[VIDEO_ALIAS_PTE_INDEX].addr(), VIDEO_PHYS as u32);
    }

    #[test]
    fn process_directory_layout() {
        let mut dir = PageDirectory::new();
        dir.init_shared(0x9000);
        dir.init_for_process(2, 0xA000);

        assert_eq!(dir.entries[FIRST_TABLE_INDEX].addr(), 0xA000);
        assert!(!dir.entries[FIRST_TABLE_INDEX].flags().contains(PageFlags::LARGE));

        let kernel = dir.entries[KERNEL_PDE_INDEX];
        assert_eq!(kernel.addr(), LARGE_PAGE_SIZE as u32);
        assert!(kernel.flags().contains(PageFlags::GLOBAL));
        assert!(!kernel.flags().contains(PageFlags::USER));

        let user = dir.entries[USER_PDE_INDEX];
        assert_eq!(user.addr(), (USER_SLOT_PHYS_BASE + 2 * LARGE_PAGE_SIZE) as u32);
        assert!(user.flags().contains(PageFlags::USER));
        assert!(user.flags().contains(PageFlags::LARGE));
    }
}
