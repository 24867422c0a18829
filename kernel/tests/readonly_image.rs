//! Host-side integration test: drive the filesystem reader through the
//! crate's public API against a synthetically assembled image, the way the
//! loader-facing code does at boot.

use trios_kernel::fs::image::{FileType, FsImage, BLOCK_SIZE};

const DENTRY_START: usize = 64;
const DENTRY_SIZE: usize = 64;

/// Lay out a boot block, one inode per file, and data blocks in file order.
fn build(files: &[(&[u8], FileType, &[u8])]) -> Vec<u8> {
    let n_inodes = files.len();
    let blocks_for = |d: &[u8]| d.len().div_ceil(BLOCK_SIZE).max(1);
    let n_data: usize = files.iter().map(|(_, _, d)| blocks_for(d)).sum();

    let mut image = vec![0u8; (1 + n_inodes + n_data) * BLOCK_SIZE];
    image[0..4].copy_from_slice(&(files.len() as u32).to_le_bytes());
    image[4..8].copy_from_slice(&(n_inodes as u32).to_le_bytes());
    image[8..12].copy_from_slice(&(n_data as u32).to_le_bytes());

    let mut next_block = 0usize;
    for (i, (name, file_type, data)) in files.iter().enumerate() {
        let d = DENTRY_START + i * DENTRY_SIZE;
        image[d..d + name.len()].copy_from_slice(name);
        image[d + 32..d + 36].copy_from_slice(&(*file_type as u32).to_le_bytes());
        image[d + 36..d + 40].copy_from_slice(&(i as u32).to_le_bytes());

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
            next_block += 1;
        }
    }
    image
}

fn program_bytes(entry: u32, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    bytes[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
    bytes[24..28].copy_from_slice(&entry.to_le_bytes());
    for (i, b) in bytes.iter_mut().enumerate().skip(28) {
        *b = (i % 256) as u8;
    }
    bytes
}

#[test]
fn directory_enumeration_matches_boot_block_order() {
    let raw = build(&[
        (b".", FileType::Directory, b""),
        (b"shell", FileType::Regular, &program_bytes(0x0804_8054, 64)),
        (b"frame1.txt", FileType::Regular, b"fish\n"),
        (b"rtc", FileType::Rtc, b""),
    ]);
    let image = FsImage::parse(&raw).unwrap();

    let names: Vec<&[u8]> = (0..image.dentry_count())
        .map(|i| -> &[u8] {
            let d = DENTRY_START + i * DENTRY_SIZE;
            let name = &raw[d..d + 32];
            let len = name.iter().position(|&b| b == 0).unwrap_or(32);
            &name[..len]
        })
        .collect();
    assert_eq!(names, [b".".as_ref(), b"shell", b"frame1.txt", b"rtc"]);

    for (i, name) in names.iter().enumerate() {
        let dentry = image.dentry_by_index(i).unwrap();
        assert_eq!(&dentry.name_bytes(), name);
        assert_eq!(dentry.inode as usize, i);
    }
}

#[test]
fn executable_discovery_and_entry_point() {
    let program = program_bytes(0x0804_9000, 5000);
    let raw = build(&[
        (b"shell", FileType::Regular, &program),
        (b"notes.txt", FileType::Regular, b"just text"),
    ]);
    let image = FsImage::parse(&raw).unwrap();

    let shell = image.find_executable(b"shell").unwrap();
    assert_eq!(image.entry_point(shell.inode).unwrap(), 0x0804_9000);
    assert_eq!(image.file_len(shell.inode).unwrap(), 5000);

    // The whole image survives a chunked read across its block boundary.
    let mut copy = vec![0u8; 5000];
    let mut offset = 0;
    while offset < copy.len() {
        let n = image
            .read_bytes(shell.inode, offset, &mut copy[offset..(offset + 512).min(5000)])
            .unwrap();
        assert!(n > 0);
        offset += n;
    }
    assert_eq!(copy, program);

    assert!(image.find_executable(b"notes.txt").is_err());
}

#[test]
fn truncated_image_is_rejected() {
    let raw = build(&[(b"a", FileType::Regular, b"abc")]);
    assert!(FsImage::parse(&raw[..BLOCK_SIZE - 1]).is_err());
    // Claiming more blocks than the slice holds must fail too.
    let mut forged = raw.clone();
    forged[8..12].copy_from_slice(&1000u32.to_le_bytes());
    assert!(FsImage::parse(&forged).is_err());
}
