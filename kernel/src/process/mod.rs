//! Processes and their control blocks
//!
//! A PCB lives at the top of its process's 8 KiB kernel stack, so masking
//! any in-stack pointer down to the 8 KiB boundary recovers the owning
//! process with no allocation and no lookup. The stacks descend from the 8 MiB
//! end of kernel memory: pid `p` owns `[8 MiB − 8 KiB·(p+1), 8 MiB − 8 KiB·p)`.

use spin::Mutex;

use crate::error::{KernelError, KernelResult};
use crate::fs::file::{FileDescriptor, CONSOLE_IN, CONSOLE_OUT};

/// At most six live processes.
pub const MAX_PROCESSES: usize = 6;
/// Per-process kernel stack size; also the PCB alignment.
pub const KERNEL_STACK_SIZE: usize = 8192;
/// Command-line tail capacity, terminating NUL included.
pub const ARGS_CAPACITY: usize = 128;
/// Descriptor slots per process.
pub const FD_COUNT: usize = 8;
/// Slots 0 and 1 are console endpoints; user opens start here.
pub const FIRST_USER_FD: usize = 2;

/// Kernel stacks grow down from the 8 MiB boundary.
const KERNEL_STACKS_TOP: usize = 8 * 1024 * 1024;
/// Mask recovering the PCB address from any in-stack pointer.
const STACK_MASK: usize = !(KERNEL_STACK_SIZE - 1);

/// `parent_pid` of a terminal's first shell: nothing to return to.
pub const NO_PARENT: i32 = -1;

/// Process control block.
#[repr(C)]
pub struct Pcb {
    pub pid: usize,
    /// [`NO_PARENT`] for the first shell of a terminal.
    pub parent_pid: i32,
    /// The console this process owns.
    pub terminal: usize,
    /// Scheduler-eligible. Cleared while the process is blocked inside
    /// `execute` waiting for a child; restored by the child's `halt`.
    pub active: bool,
    /// Kernel stack pointer at the last voluntary yield.
    pub saved_sp: usize,
    /// Frame pointer companion to `saved_sp`.
    pub saved_bp: usize,
    /// NUL-terminated command-line tail captured at `execute`.
    pub args: [u8; ARGS_CAPACITY],
    pub fds: [FileDescriptor; FD_COUNT],
}

impl Pcb {
    /// Fill a PCB for a fresh process: descriptors 0/1 pre-bound to the
    /// console, everything else free, scheduler-eligible.
    pub fn reset(&mut self, pid: usize, parent_pid: i32, terminal: usize, args: &[u8]) {
        self.pid = pid;
        self.parent_pid = parent_pid;
        self.terminal = terminal;
        self.active = true;
        self.saved_sp = 0;
        self.saved_bp = 0;

        self.args = [0; ARGS_CAPACITY];
        let len = core::cmp::min(args.len(), ARGS_CAPACITY - 1);
        self.args[..len].copy_from_slice(&args[..len]);

        self.fds = [FileDescriptor::free(); FD_COUNT];
        self.fds[0] = FileDescriptor::bound(&CONSOLE_IN, 0);
        self.fds[1] = FileDescriptor::bound(&CONSOLE_OUT, 0);
    }

    /// Length of the stored args string (NUL excluded).
    pub fn args_len(&self) -> usize {
        self.args.iter().position(|&b| b == 0).unwrap_or(ARGS_CAPACITY)
    }

    /// Lowest free user-openable descriptor slot.
    pub fn free_fd(&self) -> KernelResult<usize> {
        (FIRST_USER_FD..FD_COUNT)
            .find(|&fd| !self.fds[fd].in_use)
            .ok_or(KernelError::DescriptorsExhausted)
    }

    /// Borrow an in-use descriptor slot.
    pub fn fd_mut(&mut self, fd: usize) -> KernelResult<&mut FileDescriptor> {
        if fd >= FD_COUNT || !self.fds[fd].in_use {
            return Err(KernelError::BadDescriptor);
        }
        Ok(&mut self.fds[fd])
    }
}

// ---------------------------------------------------------------------------
// PID accounting
// ---------------------------------------------------------------------------

/// Which pid slots are live, and how many.
pub struct PidTable {
    live: [bool; MAX_PROCESSES],
    count: usize,
}

impl PidTable {
    pub const fn new() -> Self {
        Self {
            live: [false; MAX_PROCESSES],
            count: 0,
        }
    }

    /// Claim the lowest free pid.
    pub fn request(&mut self) -> KernelResult<usize> {
        let pid = self
            .live
            .iter()
            .position(|&live| !live)
            .ok_or(KernelError::ProcessLimit)?;
        self.live[pid] = true;
        self.count += 1;
        Ok(pid)
    }

    /// Release a live pid. The PCB memory is left as-is.
    pub fn release(&mut self, pid: usize) {
        if pid < MAX_PROCESSES && self.live[pid] {
            self.live[pid] = false;
            self.count -= 1;
        }
    }

    pub fn is_live(&self, pid: usize) -> bool {
        pid < MAX_PROCESSES && self.live[pid]
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Round-robin successor of `current`: the least pid greater than it
    /// (wrapping) that is live and passes `is_active`. `current` itself is
    /// never returned.
    pub fn next_schedulable(
        &self,
        current: usize,
        is_active: impl Fn(usize) -> bool,
    ) -> Option<usize> {
        let after = (current + 1..MAX_PROCESSES).chain(0..current);
        for pid in after {
            if self.live[pid] && is_active(pid) {
                return Some(pid);
            }
        }
        None
    }
}

impl Default for PidTable {
    fn default() -> Self {
        Self::new()
    }
}

static PIDS: Mutex<PidTable> = Mutex::new(PidTable::new());

/// Claim the lowest free pid.
pub fn request_pid() -> KernelResult<usize> {
    PIDS.lock().request()
}

/// Release a pid slot.
pub fn release_pid(pid: usize) {
    PIDS.lock().release(pid);
}

/// Number of live processes.
pub fn live_count() -> usize {
    PIDS.lock().count()
}

/// Run `f` against the pid table (scheduler's selection pass).
pub fn with_pids<T>(f: impl FnOnce(&PidTable) -> T) -> T {
    f(&PIDS.lock())
}

// ---------------------------------------------------------------------------
// PCB addressing (bare metal only)
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod addressing {
    use super::*;

    /// Address of the PCB for `pid`: the base of its kernel stack.
    pub fn pcb_of(pid: usize) -> *mut Pcb {
        (KERNEL_STACKS_TOP - KERNEL_STACK_SIZE * (pid + 1)) as *mut Pcb
    }

    /// Top-of-stack value for the TSS `esp0` slot of `pid`.
    pub fn kernel_stack_top(pid: usize) -> u32 {
        (KERNEL_STACKS_TOP - KERNEL_STACK_SIZE * pid - 4) as u32
    }

    /// The PCB owning the kernel stack we are running on.
    ///
    /// Meaningful only once the first process exists and the CPU is on a
    /// process kernel stack (syscalls, and interrupts taken while user code
    /// or a process's kernel path runs).
    pub fn current() -> &'static mut Pcb {
        let sp: usize;
        // SAFETY: Reading ESP has no side effects.
        unsafe {
            core::arch::asm!("mov {}, esp", out(reg) sp, options(nomem, nostack, preserves_flags));
        }
        // SAFETY: Per the kernel-stack layout, masking any in-stack pointer
        // yields the stack base, where the live PCB sits.
        unsafe { &mut *((sp & STACK_MASK) as *mut Pcb) }
    }

    pub fn current_pid() -> usize {
        current().pid
    }

    pub fn current_terminal() -> usize {
        current().terminal
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use addressing::{current, current_pid, current_terminal, kernel_stack_top, pcb_of};

// Host builds: descriptor-layer code that asks "who is calling" gets a
// fixed answer; tests drive PCBs they construct themselves.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn current_pid() -> usize {
    0
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn current_terminal() -> usize {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pids_allocate_lowest_first_and_exhaust_at_six() {
        let mut table = PidTable::new();
        for expected in 0..MAX_PROCESSES {
            assert_eq!(table.request().unwrap(), expected);
        }
        assert_eq!(table.request().unwrap_err(), KernelError::ProcessLimit);

        table.release(2);
        assert_eq!(table.count(), 5);
        assert!(!table.is_live(2));
        assert_eq!(table.request().unwrap(), 2);
        assert!(table.is_live(2));
        assert_eq!(table.request().unwrap_err(), KernelError::ProcessLimit);
    }

    #[test]
    fn release_is_idempotent() {
        let mut table = PidTable::new();
        let pid = table.request().unwrap();
        table.release(pid);
        table.release(pid);
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn next_schedulable_wraps_and_skips_inactive() {
        let mut table = PidTable::new();
        for _ in 0..4 {
            table.request().unwrap(); // pids 0..3
        }
        let active = [true, false, true, true];
        let pick = |cur| table.next_schedulable(cur, |p| active[p]);

        assert_eq!(pick(0), Some(2));
        assert_eq!(pick(2), Some(3));
        assert_eq!(pick(3), Some(0)); // wraps past the inactive pid 1
        assert_eq!(
            table.next_schedulable(0, |_| false),
            None,
        );
    }

    #[test]
    fn pcb_reset_binds_console_descriptors() {
        let mut pcb = Pcb {
            pid: 0,
            parent_pid: 0,
            terminal: 0,
            active: false,
            saved_sp: 0,
            saved_bp: 0,
            args: [0; ARGS_CAPACITY],
            fds: [FileDescriptor::free(); FD_COUNT],
        };
        pcb.reset(3, 1, 2, b"frame1.txt");

        assert_eq!(pcb.pid, 3);
        assert_eq!(pcb.parent_pid, 1);
        assert_eq!(pcb.terminal, 2);
        assert!(pcb.active);
        assert!(pcb.fds[0].in_use);
        assert!(pcb.fds[1].in_use);
        assert_eq!(pcb.free_fd().unwrap(), 2);
        assert_eq!(&pcb.args[..pcb.args_len()], b"frame1.txt");

        assert!(pcb.fd_mut(0).is_ok());
        assert_eq!(pcb.fd_mut(5).unwrap_err(), KernelError::BadDescriptor);
        assert_eq!(pcb.fd_mut(9).unwrap_err(), KernelError::BadDescriptor);
    }

    #[test]
    fn args_are_truncated_to_capacity() {
        let mut pcb = Pcb {
            pid: 0,
            parent_pid: 0,
            terminal: 0,
            active: false,
            saved_sp: 0,
            saved_bp: 0,
            args: [0; ARGS_CAPACITY],
            fds: [FileDescriptor::free(); FD_COUNT],
        };
        let long = [b'x'; 200];
        pcb.reset(0, NO_PARENT, 0, &long);
        assert_eq!(pcb.args_len(), ARGS_CAPACITY - 1);
    }
}
