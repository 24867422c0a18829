//! Filesystem image decoding
//!
//! All access goes through byte slices with explicit bounds checks; a
//! malformed image surfaces as [`KernelError::CorruptImage`] instead of a
//! wild read. The layout is fixed 4 KiB blocks:
//!
//! - block 0: boot block: three `u32` counts, 52 reserved bytes, then up
//!   to 63 directory entries of 64 bytes each
//! - blocks `1 ..= n_inodes`: index nodes, a `u32` byte length followed by
//!   up to 1023 `u32` data-block indices
//! - remaining blocks: raw 4 KiB data

use crate::error::{KernelError, KernelResult};

/// Size of every block in the image.
pub const BLOCK_SIZE: usize = 4096;
/// A file name occupies at most 32 bytes, NUL-padded but not necessarily
/// NUL-terminated.
pub const NAME_LEN: usize = 32;
/// A directory entry on disk.
const DENTRY_SIZE: usize = 64;
/// Offset of the first dentry inside the boot block.
const DENTRY_START: usize = 64;
/// The boot block holds at most this many dentries.
const MAX_DENTRIES: usize = 63;
/// An inode lists at most this many data blocks.
const MAX_BLOCK_INDICES: usize = 1023;

/// File types carried in a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileType {
    Rtc = 0,
    Directory = 1,
    Regular = 2,
}

impl FileType {
    fn from_raw(raw: u32) -> KernelResult<Self> {
        match raw {
            0 => Ok(FileType::Rtc),
            1 => Ok(FileType::Directory),
            2 => Ok(FileType::Regular),
            _ => Err(KernelError::CorruptImage),
        }
    }
}

/// A decoded directory entry.
#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    pub name: [u8; NAME_LEN],
    pub file_type: FileType,
    pub inode: u32,
}

impl DirEntry {
    /// The name without its NUL padding (a full 32-byte name has none).
    pub fn name_bytes(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        &self.name[..len]
    }
}

/// ELF magic expected at the start of every executable.
const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
/// Byte offset of the little-endian entry address inside an executable.
const ENTRY_POINT_OFFSET: usize = 24;

/// A parsed, validated view over the raw image bytes.
pub struct FsImage<'a> {
    data: &'a [u8],
    n_dentries: usize,
    n_inodes: usize,
    n_data_blocks: usize,
}

fn read_u32(data: &[u8], offset: usize) -> KernelResult<u32> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or(KernelError::CorruptImage)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl<'a> FsImage<'a> {
    /// Parse an image held in a byte slice.
    pub fn parse(data: &'a [u8]) -> KernelResult<Self> {
        if data.len() < BLOCK_SIZE {
            return Err(KernelError::CorruptImage);
        }
        let n_dentries = read_u32(data, 0)? as usize;
        let n_inodes = read_u32(data, 4)? as usize;
        let n_data_blocks = read_u32(data, 8)? as usize;

        if n_dentries > MAX_DENTRIES {
            return Err(KernelError::CorruptImage);
        }
        let total = (1 + n_inodes + n_data_blocks) * BLOCK_SIZE;
        if data.len() < total {
            return Err(KernelError::CorruptImage);
        }
        Ok(Self {
            data,
            n_dentries,
            n_inodes,
            n_data_blocks,
        })
    }

    /// Parse an image sitting at a raw base address, sizing the slice from
    /// the boot block's own counts.
    ///
    /// # Safety
    /// `base` must point at least one block of readable memory, and the
    /// image the boot block describes must be fully mapped and immutable
    /// for `'a`.
    pub unsafe fn from_base(base: *const u8) -> KernelResult<Self> {
        // SAFETY: The first block is readable per the function contract.
        let boot = unsafe { core::slice::from_raw_parts(base, BLOCK_SIZE) };
        let n_inodes = read_u32(boot, 4)? as usize;
        let n_data_blocks = read_u32(boot, 8)? as usize;
        let total = (1 + n_inodes + n_data_blocks) * BLOCK_SIZE;
        // SAFETY: The whole image is mapped per the function contract.
        Self::parse(unsafe { core::slice::from_raw_parts(base, total) })
    }

    pub fn dentry_count(&self) -> usize {
        self.n_dentries
    }

    pub fn inode_count(&self) -> usize {
        self.n_inodes
    }

    pub fn data_block_count(&self) -> usize {
        self.n_data_blocks
    }

    /// Decode the dentry at `index`.
    pub fn dentry_by_index(&self, index: usize) -> KernelResult<DirEntry> {
        if index >= self.n_dentries {
            return Err(KernelError::NotFound);
        }
        let offset = DENTRY_START + index * DENTRY_SIZE;
        let raw = self
            .data
            .get(offset..offset + DENTRY_SIZE)
            .ok_or(KernelError::CorruptImage)?;
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&raw[..NAME_LEN]);
        Ok(DirEntry {
            name,
            file_type: FileType::from_raw(read_u32(raw, NAME_LEN)?)?,
            inode: read_u32(raw, NAME_LEN + 4)?,
        })
    }

    /// Linear scan by name. Names longer than 32 bytes match nothing;
    /// comparison treats the on-disk name as NUL-padded to 32 bytes.
    pub fn dentry_by_name(&self, name: &[u8]) -> KernelResult<DirEntry> {
        if name.len() > NAME_LEN {
            return Err(KernelError::NotFound);
        }
        for index in 0..self.n_dentries {
            let dentry = self.dentry_by_index(index)?;
            let matches = (0..NAME_LEN).all(|i| {
                let expected = if i < name.len() { name[i] } else { 0 };
                dentry.name[i] == expected
            });
            if matches {
                return Ok(dentry);
            }
        }
        Err(KernelError::NotFound)
    }

    /// Byte length of the file behind `inode`.
    pub fn file_len(&self, inode: u32) -> KernelResult<usize> {
        let base = self.inode_offset(inode)?;
        Ok(read_u32(self.data, base)? as usize)
    }

    fn inode_offset(&self, inode: u32) -> KernelResult<usize> {
        let inode = inode as usize;
        if inode >= self.n_inodes {
            return Err(KernelError::NotFound);
        }
        Ok((1 + inode) * BLOCK_SIZE)
    }

    /// Copy up to `buf.len()` bytes of the file behind `inode`, starting at
    /// byte `offset`, into `buf`. Stops at end of file; returns the count
    /// copied. A data-block index at or past the data region is an error.
    pub fn read_bytes(&self, inode: u32, offset: usize, buf: &mut [u8]) -> KernelResult<usize> {
        let inode_base = self.inode_offset(inode)?;
        let length = read_u32(self.data, inode_base)? as usize;
        if offset >= length {
            return Ok(0);
        }

        let end = core::cmp::min(offset + buf.len(), length);
        let data_region = (1 + self.n_inodes) * BLOCK_SIZE;

        let mut copied = 0;
        let mut pos = offset;
        while pos < end {
            let block_slot = pos / BLOCK_SIZE;
            if block_slot >= MAX_BLOCK_INDICES {
                return Err(KernelError::CorruptImage);
            }
            let block_index =
                read_u32(self.data, inode_base + 4 + block_slot * 4)? as usize;
            if block_index >= self.n_data_blocks {
                return Err(KernelError::CorruptImage);
            }

            let in_block = pos % BLOCK_SIZE;
            let chunk = core::cmp::min(BLOCK_SIZE - in_block, end - pos);
            let src = data_region + block_index * BLOCK_SIZE + in_block;
            let bytes = self
                .data
                .get(src..src + chunk)
                .ok_or(KernelError::CorruptImage)?;
            buf[copied..copied + chunk].copy_from_slice(bytes);
            copied += chunk;
            pos += chunk;
        }
        Ok(copied)
    }

    /// An executable is a regular file whose first four bytes are the ELF
    /// magic.
    pub fn find_executable(&self, name: &[u8]) -> KernelResult<DirEntry> {
        let dentry = self.dentry_by_name(name)?;
        if dentry.file_type != FileType::Regular {
            return Err(KernelError::NotExecutable);
        }
        let mut magic = [0u8; 4];
        if self.read_bytes(dentry.inode, 0, &mut magic)? != 4 || magic != ELF_MAGIC {
            return Err(KernelError::NotExecutable);
        }
        Ok(dentry)
    }

    /// The program entry address stored at byte offset 24.
    pub fn entry_point(&self, inode: u32) -> KernelResult<u32> {
        let mut bytes = [0u8; 4];
        if self.read_bytes(inode, ENTRY_POINT_OFFSET, &mut bytes)? != 4 {
            return Err(KernelError::NotExecutable);
        }
        Ok(u32::from_le_bytes(bytes))
    }
}

/// Copy the whole executable `name` into the user image region and return
/// its entry address. Only meaningful once the target process's page
/// directory is installed.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn load_image(name: &[u8]) -> KernelResult<u32> {
    use crate::mm::{LARGE_PAGE_SIZE, USER_IMAGE_ADDR};

    let image = super::get()?;
    let dentry = image.find_executable(name)?;
    let entry = image.entry_point(dentry.inode)?;

    let capacity = LARGE_PAGE_SIZE - (USER_IMAGE_ADDR - crate::mm::USER_BASE);
    let length = core::cmp::min(image.file_len(dentry.inode)?, capacity);
    // SAFETY: The caller installed the target process's directory, which
    // maps the user 4 MiB page; the copy is bounded by that page.
    let dest = unsafe { core::slice::from_raw_parts_mut(USER_IMAGE_ADDR as *mut u8, length) };
    image.read_bytes(dentry.inode, 0, dest)?;
    Ok(entry)
}

#[cfg(test)]
pub mod testing {
    //! Synthetic image builder shared by the unit and integration tests.

    use super::*;
    use std::vec::Vec;

    /// Build an image from `(name, type, contents)` triples. Each file's
    /// data blocks are laid out in order; inode `i` belongs to file `i`.
    pub fn build_image(files: &[(&[u8], FileType, &[u8])]) -> Vec<u8> {
        let n_inodes = files.len();
        let blocks_for = |data: &[u8]| data.len().div_ceil(BLOCK_SIZE).max(1);
        let n_data: usize = files.iter().map(|(_, _, d)| blocks_for(d)).sum();

        let mut image = std::vec![0u8; (1 + n_inodes + n_data) * BLOCK_SIZE];
        image[0..4].copy_from_slice(&(files.len() as u32).to_le_bytes());
        image[4..8].copy_from_slice(&(n_inodes as u32).to_le_bytes());
        image[8..12].copy_from_slice(&(n_data as u32).to_le_bytes());

        let mut next_block = 0usize;
        for (i, (name, file_type, data)) in files.iter().enumerate() {
            let dentry = DENTRY_START + i * DENTRY_SIZE;
            image[dentry..dentry + name.len()].copy_from_slice(name);
            image[dentry + 32..dentry + 36].copy_from_slice(&(*file_type as u32).to_le_bytes());
            image[dentry + 36..dentry + 40].copy_from_slice(&(i as u32).to_le_bytes());

            let inode = (1 + i) * BLOCK_SIZE;
            image[inode..inode + 4].copy_from_slice(&(data.len() as u32).to_le_bytes());
            for (slot, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
                let idx = inode + 4 + slot * 4;
                image[idx..idx + 4].copy_from_slice(&(next_block as u32).to_le_bytes());
                let dst = (1 + n_inodes + next_block) * BLOCK_SIZE;
                image[dst..dst + chunk.len()].copy_from_slice(chunk);
                next_block += 1;
            }
            if data.is_empty() {
                next_block += 1; // reserve the minimum block
            }
        }
        image
    }
}

#[cfg(test)]
mod tests {
    use super::testing::build_image;
    use super::*;
    use std::vec::Vec;

    fn sample() -> Vec<u8> {
        let mut big = Vec::new();
        for i in 0..9000u32 {
            big.push((i % 251) as u8);
        }
        build_image(&[
            (b".", FileType::Directory, b""),
            (b"frame1.txt", FileType::Regular, b"hello, fish\n"),
            (b"big.dat", FileType::Regular, &big),
            (b"rtc", FileType::Rtc, b""),
        ])
    }

    #[test]
    fn finds_dentries_by_name_and_index() {
        let raw = sample();
        let image = FsImage::parse(&raw).unwrap();
        assert_eq!(image.dentry_count(), 4);

        let frame = image.dentry_by_name(b"frame1.txt").unwrap();
        assert_eq!(frame.file_type, FileType::Regular);
        assert_eq!(frame.name_bytes(), b"frame1.txt");

        let dot = image.dentry_by_index(0).unwrap();
        assert_eq!(dot.file_type, FileType::Directory);

        assert_eq!(
            image.dentry_by_name(b"nosuchfile").unwrap_err(),
            KernelError::NotFound
        );
        assert!(image.dentry_by_index(4).is_err());
    }

    #[test]
    fn name_longer_than_32_matches_nothing() {
        let raw = sample();
        let image = FsImage::parse(&raw).unwrap();
        let long = [b'a'; 40];
        assert_eq!(
            image.dentry_by_name(&long).unwrap_err(),
            KernelError::NotFound
        );
    }

    #[test]
    fn read_bytes_round_trip() {
        let raw = sample();
        let image = FsImage::parse(&raw).unwrap();
        let dentry = image.dentry_by_name(b"frame1.txt").unwrap();

        let mut buf = [0u8; 64];
        let n = image.read_bytes(dentry.inode, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello, fish\n");

        // Offset reads stop at end of file.
        let n = image.read_bytes(dentry.inode, 7, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"fish\n");
        assert_eq!(image.read_bytes(dentry.inode, 100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_bytes_crosses_block_boundaries() {
        let raw = sample();
        let image = FsImage::parse(&raw).unwrap();
        let dentry = image.dentry_by_name(b"big.dat").unwrap();
        assert_eq!(image.file_len(dentry.inode).unwrap(), 9000);

        let mut buf = std::vec![0u8; 9000];
        assert_eq!(image.read_bytes(dentry.inode, 0, &mut buf).unwrap(), 9000);
        for (i, &b) in buf.iter().enumerate() {
            assert_eq!(b, (i % 251) as u8);
        }

        // A read spanning the 4096 boundary from a mid-block offset.
        let mut chunk = [0u8; 512];
        assert_eq!(
            image.read_bytes(dentry.inode, 4000, &mut chunk).unwrap(),
            512
        );
        assert_eq!(chunk[0], (4000 % 251) as u8);
        assert_eq!(chunk[511], ((4000 + 511) % 251) as u8);
    }

    #[test]
    fn out_of_range_block_index_is_an_error() {
        let mut raw = sample();
        let image = FsImage::parse(&raw).unwrap();
        let dentry = image.dentry_by_name(b"frame1.txt").unwrap();
        let inode_base = (1 + dentry.inode as usize) * BLOCK_SIZE;
        drop(image);

        // Point the first block index one past the data region.
        let bad = 6u32; // image has 6 data blocks (indices 0..=5)
        raw[inode_base + 4..inode_base + 8].copy_from_slice(&bad.to_le_bytes());
        let image = FsImage::parse(&raw).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(
            image.read_bytes(dentry.inode, 0, &mut buf).unwrap_err(),
            KernelError::CorruptImage
        );
    }

    #[test]
    fn executables_need_regular_type_and_magic() {
        let mut program = std::vec![0u8; 40];
        program[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        program[24..28].copy_from_slice(&0x0804_8100u32.to_le_bytes());
        let raw = build_image(&[
            (b".", FileType::Directory, b""),
            (b"shell", FileType::Regular, &program),
            (b"frame1.txt", FileType::Regular, b"not a program"),
        ]);
        let image = FsImage::parse(&raw).unwrap();

        let shell = image.find_executable(b"shell").unwrap();
        assert_eq!(image.entry_point(shell.inode).unwrap(), 0x0804_8100);

        assert_eq!(
            image.find_executable(b"frame1.txt").unwrap_err(),
            KernelError::NotExecutable
        );
        assert_eq!(
            image.find_executable(b".").unwrap_err(),
            KernelError::NotExecutable
        );
        assert_eq!(
            image.find_executable(b"nosuchfile").unwrap_err(),
            KernelError::NotFound
        );
    }
}
