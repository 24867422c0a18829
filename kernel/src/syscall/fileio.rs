//! Descriptor-based system calls, `getargs`, and `vidmap`
//!
//! All user pointers are range-checked against the user window before any
//! dereference; descriptor indices are checked against the calling
//! process's table. Everything else is delegation to the operation tables
//! in [`crate::fs::file`].

#![cfg(all(target_arch = "x86", target_os = "none"))]

use crate::error::{KernelError, KernelResult};
use crate::fs::{self, file::FileDescriptor};
use crate::mm::{self, paging};
use crate::process::{self, FD_COUNT, FIRST_USER_FD};

/// `open(name)`: bind the lowest free descriptor ≥ 2 to the named file,
/// directory, or RTC device.
pub fn open(name_ptr: usize) -> KernelResult<i32> {
    let mut name_buf = [0u8; 33];
    let len = copy_user_name(name_ptr, &mut name_buf)?;
    let name = &name_buf[..len];

    let dentry = fs::get()?.dentry_by_name(name)?;
    let ops = fs::file::ops_for(dentry.file_type);
    ops.open(&dentry)?;

    let pcb = process::current();
    let fd = pcb.free_fd()?;
    pcb.fds[fd] = FileDescriptor::bound(ops, dentry.inode);
    Ok(fd as i32)
}

fn copy_user_name(addr: usize, out: &mut [u8; 33]) -> KernelResult<usize> {
    mm::user::check_range(addr, 1)?;
    for i in 0..out.len() {
        mm::user::check_range(addr + i, 1)?;
        // SAFETY: Byte range-checked; the caller's user page is installed.
        let byte = unsafe { core::ptr::read((addr + i) as *const u8) };
        if byte == 0 {
            return Ok(i);
        }
        out[i] = byte;
    }
    // No NUL within 33 bytes: longer than any legal file name.
    Err(KernelError::InvalidArgument)
}

/// `close(fd)`: release a user-opened descriptor. Slots 0 and 1 stay bound
/// for the life of the process.
pub fn close(fd: usize) -> KernelResult<i32> {
    if !(FIRST_USER_FD..FD_COUNT).contains(&fd) {
        return Err(KernelError::BadDescriptor);
    }
    let pcb = process::current();
    let slot = pcb.fd_mut(fd)?;
    let ops = slot.ops.ok_or(KernelError::BadDescriptor)?;
    ops.close(slot)?;
    *slot = FileDescriptor::free();
    Ok(0)
}

/// `read(fd, buf, n)`: delegate to the descriptor's operation table.
pub fn read(fd: usize, buf_ptr: usize, len: usize) -> KernelResult<i32> {
    // SAFETY: Range validated inside; we execute on the caller's behalf
    // with its address space installed.
    let buf = unsafe { mm::user::slice_mut(buf_ptr, len)? };
    let pcb = process::current();
    let slot = pcb.fd_mut(fd)?;
    let ops = slot.ops.ok_or(KernelError::BadDescriptor)?;
    let count = ops.read(slot, buf)?;
    Ok(count as i32)
}

/// `write(fd, buf, n)`: delegate to the descriptor's operation table.
pub fn write(fd: usize, buf_ptr: usize, len: usize) -> KernelResult<i32> {
    // SAFETY: Range validated inside; caller's address space is installed.
    let buf = unsafe { mm::user::slice(buf_ptr, len)? };
    let pcb = process::current();
    let slot = pcb.fd_mut(fd)?;
    let ops = slot.ops.ok_or(KernelError::BadDescriptor)?;
    let count = ops.write(slot, buf)?;
    Ok(count as i32)
}

/// `getargs(buf, n)`: copy the command-line tail captured at `execute`.
/// Empty args are an error; an undersized buffer receives a raw (not
/// NUL-terminated) prefix.
pub fn getargs(buf_ptr: usize, len: usize) -> KernelResult<i32> {
    let pcb = process::current();
    let args_len = pcb.args_len();
    if args_len == 0 {
        return Err(KernelError::InvalidArgument);
    }
    // SAFETY: Range validated inside; caller's address space is installed.
    let buf = unsafe { mm::user::slice_mut(buf_ptr, len)? };
    let count = core::cmp::min(args_len + 1, buf.len());
    buf[..count].copy_from_slice(&pcb.args[..count]);
    Ok(0)
}

/// `vidmap(&out)`: expose the caller's terminal video mapping in user
/// space and report its fixed virtual address through `out`.
pub fn vidmap(out_ptr: usize) -> KernelResult<i32> {
    mm::user::check_range(out_ptr, core::mem::size_of::<u32>())?;
    let pcb = process::current();
    let addr = crate::arch::interrupts::without_interrupts(|| {
        let addr = paging::map_vidmap(pcb.pid, pcb.terminal);
        paging::install_process(pcb.pid); // flush the TLB for the new slot
        addr
    });
    // SAFETY: Range checked above; the caller's user page is writable.
    unsafe {
        core::ptr::write(out_ptr as *mut u32, addr as u32);
    }
    Ok(0)
}
