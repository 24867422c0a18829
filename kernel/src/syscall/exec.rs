//! `execute` and `halt`
//!
//! `execute` is fork and exec in one stroke: claim a pid, build the child's
//! address space, load the image, hand over the kernel stack slot in the
//! TSS, and drop to ring 3. The parent's kernel context freezes inside
//! [`crate::arch::x86::usermode::enter_user`] until the child's `halt`
//! resumes it with the exit status.

use crate::error::{KernelError, KernelResult};

/// Status reported when a process is torn down by a CPU exception rather
/// than a voluntary halt. Outside the 0–255 range a user program can pass.
pub const EXCEPTION_STATUS: u32 = 256;

/// Split a command line into the executable name (first space-delimited
/// token, at most 32 bytes) and the argument tail (spaces skipped, ending
/// at newline or NUL, at most 127 bytes).
pub fn parse_command(command: &[u8]) -> KernelResult<(&[u8], &[u8])> {
    let end = command
        .iter()
        .position(|&b| b == 0 || b == b'\n')
        .unwrap_or(command.len());
    let command = &command[..end];

    let name_end = command
        .iter()
        .position(|&b| b == b' ')
        .unwrap_or(command.len());
    let name = &command[..name_end];
    if name.is_empty() || name.len() > 32 {
        return Err(KernelError::InvalidArgument);
    }

    let mut rest = &command[name_end..];
    while let Some((&b' ', tail)) = rest.split_first() {
        rest = tail;
    }
    let args_len = core::cmp::min(rest.len(), crate::process::ARGS_CAPACITY - 1);
    Ok((name, &rest[..args_len]))
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod imp {
    use super::*;
    use crate::arch::interrupts;
    use crate::arch::x86::usermode::{enter_user, return_to_parent};
    use crate::arch::x86::segment;
    use crate::drivers::console;
    use crate::fs;
    use crate::mm::{self, paging, USER_STACK_TOP};
    use crate::process::{
        self, kernel_stack_top, pcb_of, FD_COUNT, FIRST_USER_FD, NO_PARENT,
    };
    use crate::terminal::{self, TerminalState};

    /// Save slots for contexts that will never be resumed: the boot idle
    /// loop and the pit-handler frames abandoned when a terminal's first
    /// shell is spawned.
    static mut BOOT_SP: usize = 0;
    static mut BOOT_BP: usize = 0;

    /// The user-facing `execute`: copy the command out of user space, run
    /// the child, report its status.
    pub fn sys_execute(cmd_ptr: usize) -> i32 {
        let mut command = [0u8; 160];
        match copy_user_cstr(cmd_ptr, &mut command) {
            Ok(()) => {}
            Err(err) => return err.as_syscall_ret(),
        }
        match execute(&command) {
            Ok(status) => status,
            Err(err) => {
                if err == KernelError::ProcessLimit {
                    println!("cannot start: all {} process slots in use", process::MAX_PROCESSES);
                }
                err.as_syscall_ret()
            }
        }
    }

    fn copy_user_cstr(addr: usize, out: &mut [u8]) -> KernelResult<()> {
        mm::user::check_range(addr, 1)?;
        for (i, slot) in out.iter_mut().enumerate() {
            if mm::user::check_range(addr + i, 1).is_err() {
                break;
            }
            // SAFETY: The byte was range-checked and the caller's user page
            // is installed.
            let byte = unsafe { core::ptr::read((addr + i) as *const u8) };
            *slot = byte;
            if byte == 0 {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Start a program and block until it halts. Returns the child's exit
    /// status (0–255, or [`EXCEPTION_STATUS`]).
    pub fn execute(command: &[u8]) -> KernelResult<i32> {
        let (name, args) = parse_command(command)?;

        // Interrupts stay off for the whole process-construction sequence.
        // Callers differ: a syscall arrives with them enabled, the
        // bootstrap tick with them disabled, so restore rather than enable.
        let were_enabled = interrupts::are_enabled();
        interrupts::disable();
        let result = execute_inner(name, args);
        if were_enabled {
            interrupts::enable();
        }
        result
    }

    fn execute_inner(name: &[u8], args: &[u8]) -> KernelResult<i32> {
        // Validate before claiming anything.
        fs::get()?.find_executable(name)?;

        let pid = process::request_pid()?;

        // A terminal that has never run a shell takes priority; otherwise
        // the child shares the caller's console.
        let (terminal, parent_pid) = match terminal::next_inactive() {
            Some(t) => {
                terminal::set_state(t, TerminalState::Active);
                paging::setup_terminal_table(t, terminal::backing_phys(t), t == terminal::visible());
                (t, NO_PARENT)
            }
            None => {
                let caller = process::current();
                (caller.terminal, caller.pid as i32)
            }
        };

        // Whose directory to restore if the load fails under the child's.
        let restore_pid = if process::live_count() > 1 {
            Some(process::current_pid())
        } else {
            None
        };

        paging::init_process_directory(pid, terminal);
        paging::install_process(pid);

        let entry = match fs::image::load_image(name) {
            Ok(entry) => entry,
            Err(err) => {
                if let Some(restore) = restore_pid {
                    paging::install_process(restore);
                }
                if parent_pid == NO_PARENT {
                    terminal::set_state(terminal, TerminalState::Inactive);
                }
                process::release_pid(pid);
                return Err(err);
            }
        };

        // SAFETY: pid was just allocated, so its stack slot and PCB memory
        // belong to this child alone.
        let child = unsafe { &mut *pcb_of(pid) };
        child.reset(pid, parent_pid, terminal, args);

        // Park the caller: ineligible until the child halts. Its frozen
        // kernel context is recorded by enter_user below.
        let (sp_slot, bp_slot) = if parent_pid >= 0 {
            let parent = process::current();
            parent.active = false;
            (
                &mut parent.saved_sp as *mut usize,
                &mut parent.saved_bp as *mut usize,
            )
        } else {
            // First shell of a terminal: the spawning context (boot idle or
            // an abandoned tick frame) is never resumed.
            (
                core::ptr::addr_of_mut!(BOOT_SP),
                core::ptr::addr_of_mut!(BOOT_BP),
            )
        };

        segment::set_kernel_stack(kernel_stack_top(pid));
        log::debug!(
            "execute: pid {} on terminal {} (parent {})",
            pid,
            terminal,
            parent_pid
        );

        // SAFETY: The child's directory is installed and maps the image and
        // user stack; esp0 was just pointed at the child's stack; the slots
        // outlive the child (parent PCB or statics).
        let status = unsafe { enter_user(entry, USER_STACK_TOP as u32, sp_slot, bp_slot) };
        Ok(status as i32)
    }

    /// Tear down the calling process. For a terminal's first shell there is
    /// no parent to return to, so a fresh shell is spawned in its place;
    /// otherwise the parent's frozen `execute` resumes with `status`.
    pub fn halt(status: u32) -> ! {
        interrupts::disable();
        let pcb = process::current();
        log::debug!("halt: pid {} status {}", pcb.pid, status);

        for fd in FIRST_USER_FD..FD_COUNT {
            if pcb.fds[fd].in_use {
                let mut slot = pcb.fds[fd];
                if let Some(ops) = slot.ops {
                    let _ = ops.close(&mut slot);
                }
                pcb.fds[fd] = crate::fs::file::FileDescriptor::free();
            }
        }

        if pcb.parent_pid == NO_PARENT {
            // Nowhere to return: recycle this terminal with a new shell.
            terminal::set_state(pcb.terminal, TerminalState::Inactive);
            process::release_pid(pcb.pid);
            console::with(|c| c.clear());
            loop {
                let _ = execute(b"shell");
                // A missing shell image leaves nothing to run here; spin
                // until the timer moves the CPU elsewhere.
                interrupts::enable();
                core::hint::spin_loop();
                interrupts::disable();
            }
        }

        let parent_pid = pcb.parent_pid as usize;
        // SAFETY: A live parent pid always designates an initialized PCB;
        // it has been parked (inactive) since it spawned us.
        let parent = unsafe { &mut *pcb_of(parent_pid) };
        parent.active = true;

        segment::set_kernel_stack(kernel_stack_top(parent_pid));
        paging::install_process(parent_pid);
        console::with(|c| c.switch_live(parent.terminal));

        let saved_sp = parent.saved_sp;
        process::release_pid(pcb.pid);

        // SAFETY: saved_sp was recorded by the parent's enter_user and its
        // stack has been frozen since; directory and esp0 now belong to the
        // parent again.
        unsafe { return_to_parent(saved_sp, status) }
    }

    /// Exception path: tear down the faulting process with the
    /// distinguished status. Before any process exists a fault is a kernel
    /// bug, so park the CPU instead.
    pub fn fault_halt() -> ! {
        if process::live_count() == 0 {
            loop {
                interrupts::halt();
            }
        }
        halt(EXCEPTION_STATUS)
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use imp::{execute, fault_halt, halt, sys_execute};
