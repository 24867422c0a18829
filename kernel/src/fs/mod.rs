//! Read-only indexed filesystem
//!
//! The boot loader deposits a contiguous image in memory: one boot block,
//! `n_inodes` index-node blocks, `n_data` data blocks, all 4 KiB. [`image`]
//! decodes it; [`file`] adapts it (plus the console and RTC pseudo-devices)
//! to the per-descriptor operation table the syscall layer dispatches
//! through.

pub mod file;
pub mod image;

use spin::Once;

use crate::error::{KernelError, KernelResult};
use image::FsImage;

static IMAGE: Once<FsImage<'static>> = Once::new();

/// Adopt the filesystem image the boot loader left at `base`.
///
/// # Safety
/// `base` must point at a well-formed image that stays mapped (inside the
/// kernel page) for the lifetime of the kernel.
pub unsafe fn init(base: *const u8) -> KernelResult<()> {
    // SAFETY: The boot block's three counts give the image length; the
    // caller guarantees the full image is mapped and immutable.
    let parsed = unsafe { FsImage::from_base(base)? };
    log::info!(
        "filesystem: {} dentries, {} inodes, {} data blocks",
        parsed.dentry_count(),
        parsed.inode_count(),
        parsed.data_block_count()
    );
    IMAGE.call_once(|| parsed);
    Ok(())
}

/// The mounted image. Errors before `init` has succeeded.
pub fn get() -> KernelResult<&'static FsImage<'static>> {
    IMAGE.get().ok_or(KernelError::NotFound)
}
