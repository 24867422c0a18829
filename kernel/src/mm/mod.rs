//! Memory management
//!
//! No allocator lives here: every paging structure is a statically reserved,
//! 4 KiB-aligned object in [`paging`], and user-pointer checks live in
//! [`user`]. The kernel occupies one shared global 4 MiB page; each process
//! gets one user 4 MiB page plus the per-terminal video-memory tables.

pub mod paging;
pub mod user;

/// Size of a 4 KiB page.
pub const PAGE_SIZE: usize = 4096;
/// Size of a 4 MiB page.
pub const LARGE_PAGE_SIZE: usize = 4 * 1024 * 1024;

/// Bottom of the user 4 MiB window (virtual 128 MiB).
pub const USER_BASE: usize = 128 * 1024 * 1024;
/// One past the top of the user window (virtual 132 MiB).
pub const USER_TOP: usize = USER_BASE + LARGE_PAGE_SIZE;
/// Virtual address user images are loaded at.
pub const USER_IMAGE_ADDR: usize = USER_BASE + 0x48000;
/// Initial user stack pointer: the last byte of the user window.
pub const USER_STACK_TOP: usize = USER_TOP - 1;

/// Physical base of the first user 4 MiB slot (8 MiB); slot `pid` sits at
/// `USER_SLOT_PHYS_BASE + pid * LARGE_PAGE_SIZE`.
pub const USER_SLOT_PHYS_BASE: usize = 8 * 1024 * 1024;

/// Physical address of the text-mode frame buffer.
pub const VIDEO_PHYS: usize = 0xB8000;
/// Kernel alias page that always maps physical video memory.
pub const VIDEO_ALIAS_VIRT: usize = VIDEO_PHYS + PAGE_SIZE;
