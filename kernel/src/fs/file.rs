//! Per-descriptor operation tables
//!
//! Every open descriptor carries a reference to one of five operation
//! singletons: regular file, directory, the RTC pseudo-device, and the two
//! console endpoints pre-bound to descriptors 0 and 1. The closed set plus
//! a shared trait recovers static null-safety over the classic
//! function-pointer record.

use crate::error::{KernelError, KernelResult};

use super::image::{DirEntry, FileType, NAME_LEN};

/// The four operations a descriptor supports.
pub trait FileOps: Sync {
    /// Type-specific validation when the descriptor is created.
    fn open(&self, dentry: &DirEntry) -> KernelResult<()>;
    /// Read into `buf`; returns bytes copied.
    fn read(&self, fd: &mut FileDescriptor, buf: &mut [u8]) -> KernelResult<usize>;
    /// Write from `buf`; returns bytes consumed.
    fn write(&self, fd: &mut FileDescriptor, buf: &[u8]) -> KernelResult<usize>;
    /// Type-specific teardown when the descriptor is released.
    fn close(&self, fd: &mut FileDescriptor) -> KernelResult<()>;
}

/// One slot of a process's descriptor table.
#[derive(Clone, Copy)]
pub struct FileDescriptor {
    pub ops: Option<&'static dyn FileOps>,
    pub inode: u32,
    pub offset: usize,
    pub in_use: bool,
}

impl core::fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileDescriptor")
            .field("ops", &self.ops.map(|_| "<dyn FileOps>"))
            .field("inode", &self.inode)
            .field("offset", &self.offset)
            .field("in_use", &self.in_use)
            .finish()
    }
}

impl FileDescriptor {
    pub const fn free() -> Self {
        Self {
            ops: None,
            inode: 0,
            offset: 0,
            in_use: false,
        }
    }

    /// A slot bound to `ops`, offset zero.
    pub fn bound(ops: &'static dyn FileOps, inode: u32) -> Self {
        Self {
            ops: Some(ops),
            inode,
            offset: 0,
            in_use: true,
        }
    }
}

/// Pick the operation table matching a dentry's type.
pub fn ops_for(file_type: FileType) -> &'static dyn FileOps {
    match file_type {
        FileType::Regular => &REGULAR,
        FileType::Directory => &DIRECTORY,
        FileType::Rtc => &RTC_DEVICE,
    }
}

// ---------------------------------------------------------------------------
// Regular files
// ---------------------------------------------------------------------------

/// Sequential reads over an index node; writes rejected.
pub struct RegularFile;

pub static REGULAR: RegularFile = RegularFile;

impl FileOps for RegularFile {
    fn open(&self, dentry: &DirEntry) -> KernelResult<()> {
        if dentry.file_type != FileType::Regular {
            return Err(KernelError::InvalidArgument);
        }
        Ok(())
    }

    fn read(&self, fd: &mut FileDescriptor, buf: &mut [u8]) -> KernelResult<usize> {
        let copied = super::get()?.read_bytes(fd.inode, fd.offset, buf)?;
        fd.offset += copied;
        Ok(copied)
    }

    fn write(&self, _fd: &mut FileDescriptor, _buf: &[u8]) -> KernelResult<usize> {
        Err(KernelError::Unsupported)
    }

    fn close(&self, _fd: &mut FileDescriptor) -> KernelResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Directories
// ---------------------------------------------------------------------------

/// Reads enumerate dentry names in boot-block order, one per call, then
/// return 0 at the end; writes rejected.
pub struct Directory;

pub static DIRECTORY: Directory = Directory;

impl FileOps for Directory {
    fn open(&self, dentry: &DirEntry) -> KernelResult<()> {
        if dentry.file_type != FileType::Directory {
            return Err(KernelError::InvalidArgument);
        }
        Ok(())
    }

    fn read(&self, fd: &mut FileDescriptor, buf: &mut [u8]) -> KernelResult<usize> {
        let image = super::get()?;
        if fd.offset >= image.dentry_count() {
            return Ok(0);
        }
        let dentry = image.dentry_by_index(fd.offset)?;
        fd.offset += 1;

        // Up to 32 name bytes; a full-length name arrives without a NUL.
        let name = dentry.name_bytes();
        let count = core::cmp::min(core::cmp::min(name.len(), NAME_LEN), buf.len());
        buf[..count].copy_from_slice(&name[..count]);
        Ok(count)
    }

    fn write(&self, _fd: &mut FileDescriptor, _buf: &[u8]) -> KernelResult<usize> {
        Err(KernelError::Unsupported)
    }

    fn close(&self, _fd: &mut FileDescriptor) -> KernelResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::image::testing::build_image;

    /// Mount a synthetic image into the global slot once for every test in
    /// this module.
    fn mount() {
        static MOUNTED: spin::Once<()> = spin::Once::new();
        MOUNTED.call_once(|| {
            let raw = build_image(&[
                (b".", FileType::Directory, b""),
                (b"frame1.txt", FileType::Regular, b"fish says hello\n"),
                (b"rtc", FileType::Rtc, b""),
            ])
            .leak();
            // SAFETY: The leaked slice is immutable and lives forever.
            unsafe { crate::fs::init(raw.as_ptr()) }.unwrap();
        });
    }

    #[test]
    fn regular_reads_advance_the_descriptor_offset() {
        mount();
        let image = crate::fs::get().unwrap();
        let dentry = image.dentry_by_name(b"frame1.txt").unwrap();
        let mut fd = FileDescriptor::bound(&REGULAR, dentry.inode);

        let mut buf = [0u8; 5];
        assert_eq!(REGULAR.read(&mut fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"fish ");
        assert_eq!(fd.offset, 5);

        let mut rest = [0u8; 32];
        let n = REGULAR.read(&mut fd, &mut rest).unwrap();
        assert_eq!(&rest[..n], b"says hello\n");
        // End of file: subsequent reads return 0.
        assert_eq!(REGULAR.read(&mut fd, &mut rest).unwrap(), 0);

        assert_eq!(
            REGULAR.write(&mut fd, b"nope").unwrap_err(),
            KernelError::Unsupported
        );
    }

    #[test]
    fn directory_reads_enumerate_each_dentry_once_then_zero() {
        mount();
        let image = crate::fs::get().unwrap();
        let dentry = image.dentry_by_name(b".").unwrap();
        DIRECTORY.open(&dentry).unwrap();
        let mut fd = FileDescriptor::bound(&DIRECTORY, dentry.inode);

        let mut names = std::vec::Vec::new();
        loop {
            let mut buf = [0u8; 32];
            let n = DIRECTORY.read(&mut fd, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            names.push(std::vec::Vec::from(&buf[..n]));
        }
        assert_eq!(names, [b".".to_vec(), b"frame1.txt".to_vec(), b"rtc".to_vec()]);
        // The end state is sticky.
        let mut buf = [0u8; 32];
        assert_eq!(DIRECTORY.read(&mut fd, &mut buf).unwrap(), 0);
    }

    #[test]
    fn open_validation_rejects_type_mismatches() {
        mount();
        let image = crate::fs::get().unwrap();
        let file = image.dentry_by_name(b"frame1.txt").unwrap();
        let dir = image.dentry_by_name(b".").unwrap();

        assert!(REGULAR.open(&file).is_ok());
        assert!(REGULAR.open(&dir).is_err());
        assert!(DIRECTORY.open(&dir).is_ok());
        assert!(DIRECTORY.open(&file).is_err());
    }
}

// ---------------------------------------------------------------------------
// RTC pseudo-device
// ---------------------------------------------------------------------------

/// Virtualized real-time clock: open sets 2 Hz, write retunes, read blocks
/// until the process's next virtual tick.
pub struct RtcDevice;

pub static RTC_DEVICE: RtcDevice = RtcDevice;

impl FileOps for RtcDevice {
    fn open(&self, _dentry: &DirEntry) -> KernelResult<()> {
        crate::drivers::rtc::open(crate::process::current_pid());
        Ok(())
    }

    fn read(&self, _fd: &mut FileDescriptor, _buf: &mut [u8]) -> KernelResult<usize> {
        crate::drivers::rtc::wait(crate::process::current_pid());
        Ok(0)
    }

    fn write(&self, _fd: &mut FileDescriptor, buf: &[u8]) -> KernelResult<usize> {
        if buf.len() != 4 {
            return Err(KernelError::InvalidArgument);
        }
        let hz = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        crate::drivers::rtc::set_frequency(crate::process::current_pid(), hz)?;
        Ok(0)
    }

    fn close(&self, _fd: &mut FileDescriptor) -> KernelResult<()> {
        crate::drivers::rtc::close(crate::process::current_pid());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Console endpoints
// ---------------------------------------------------------------------------

/// Descriptor 0: line-buffered keyboard input for the calling process's
/// terminal.
pub struct ConsoleIn;

pub static CONSOLE_IN: ConsoleIn = ConsoleIn;

impl FileOps for ConsoleIn {
    fn open(&self, _dentry: &DirEntry) -> KernelResult<()> {
        Ok(())
    }

    fn read(&self, _fd: &mut FileDescriptor, buf: &mut [u8]) -> KernelResult<usize> {
        Ok(crate::terminal::read_blocking(
            crate::process::current_terminal(),
            buf,
        ))
    }

    fn write(&self, _fd: &mut FileDescriptor, _buf: &[u8]) -> KernelResult<usize> {
        Err(KernelError::Unsupported)
    }

    fn close(&self, _fd: &mut FileDescriptor) -> KernelResult<()> {
        Ok(())
    }
}

/// Descriptor 1: byte stream onto the calling process's terminal.
pub struct ConsoleOut;

pub static CONSOLE_OUT: ConsoleOut = ConsoleOut;

impl FileOps for ConsoleOut {
    fn open(&self, _dentry: &DirEntry) -> KernelResult<()> {
        Ok(())
    }

    fn read(&self, _fd: &mut FileDescriptor, _buf: &mut [u8]) -> KernelResult<usize> {
        Err(KernelError::Unsupported)
    }

    fn write(&self, _fd: &mut FileDescriptor, buf: &[u8]) -> KernelResult<usize> {
        crate::drivers::console::write_bytes(buf);
        Ok(buf.len())
    }

    fn close(&self, _fd: &mut FileDescriptor) -> KernelResult<()> {
        Ok(())
    }
}
