//! Terminal multiplexer
//!
//! Three independent consoles share one screen. Exactly one terminal's
//! frame lives in physical video memory at any time; the other two live in
//! 4 KiB backing pages reachable only through their per-terminal page
//! tables. Switching copies frames both ways, retargets the video page
//! table entries, and reloads CR3 so the running process's writes follow.
//!
//! Each terminal also owns a read queue of committed input lines; the
//! keyboard commits into the visible terminal's queue, processes read from
//! their own.

use spin::Mutex;

use crate::error::{KernelError, KernelResult};

/// Number of virtual consoles.
pub const TERMINAL_COUNT: usize = 3;

/// Capacity of a terminal's read queue: ten full lines.
pub const QUEUE_CAPACITY: usize = 1280;

/// Prompt string the shell prints; Ctrl+L reprints it after clearing.
pub const SHELL_PROMPT: &str = "trios> ";

/// Whether a terminal has had its first shell spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Inactive,
    Active,
}

/// Committed, newline-delimited input waiting to be read.
pub struct ReadQueue {
    buf: [u8; QUEUE_CAPACITY],
    len: usize,
}

impl ReadQueue {
    pub const fn new() -> Self {
        Self {
            buf: [0; QUEUE_CAPACITY],
            len: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a committed line plus its terminating newline. Rejected
    /// whole when the queue lacks the space.
    pub fn push_line(&mut self, line: &[u8]) -> KernelResult<()> {
        if QUEUE_CAPACITY - self.len < line.len() + 1 {
            return Err(KernelError::InvalidArgument);
        }
        self.buf[self.len..self.len + line.len()].copy_from_slice(line);
        self.len += line.len();
        self.buf[self.len] = b'\n';
        self.len += 1;
        Ok(())
    }

    /// Copy out at most `buf.len()` bytes and at most up to (including)
    /// the first newline, shifting the queue left by the count returned.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        while count < buf.len() && count < self.len {
            buf[count] = self.buf[count];
            count += 1;
            if buf[count - 1] == b'\n' {
                break;
            }
        }
        self.buf.copy_within(count..self.len, 0);
        self.len -= count;
        count
    }
}

impl Default for ReadQueue {
    fn default() -> Self {
        Self::new()
    }
}

struct Terminal {
    state: TerminalState,
    queue: ReadQueue,
}

static TERMINALS: Mutex<[Terminal; TERMINAL_COUNT]> = Mutex::new(
    [const {
        Terminal {
            state: TerminalState::Inactive,
            queue: ReadQueue::new(),
        }
    }; TERMINAL_COUNT],
);

/// Reset all terminals to inactive with empty queues.
pub fn init() {
    let mut terminals = TERMINALS.lock();
    for terminal in terminals.iter_mut() {
        terminal.state = TerminalState::Inactive;
        terminal.queue = ReadQueue::new();
    }
}

/// Lowest-numbered terminal whose first shell has not been spawned yet.
pub fn next_inactive() -> Option<usize> {
    let terminals = TERMINALS.lock();
    (0..TERMINAL_COUNT).find(|&t| terminals[t].state == TerminalState::Inactive)
}

pub fn set_state(terminal: usize, state: TerminalState) {
    TERMINALS.lock()[terminal].state = state;
}

/// Commit a finished input line (newline appended here) to a terminal's
/// read queue. Called from the keyboard handler under cli.
pub fn commit_line(terminal: usize, line: &[u8]) -> KernelResult<()> {
    TERMINALS.lock()[terminal].queue.push_line(line)
}

/// Blocking line read for the given terminal. Spins with interrupts
/// enabled, so the scheduler keeps time-slicing while a process waits for
/// input.
pub fn read_blocking(terminal: usize, buf: &mut [u8]) -> usize {
    loop {
        let read = crate::arch::interrupts::without_interrupts(|| {
            let mut terminals = TERMINALS.lock();
            let queue = &mut terminals[terminal].queue;
            if queue.is_empty() {
                None
            } else {
                Some(queue.read(buf))
            }
        });
        if let Some(count) = read {
            return count;
        }
        crate::arch::interrupts::enable();
        core::hint::spin_loop();
    }
}

// ---------------------------------------------------------------------------
// Backing frames and the visibility switch (bare metal only)
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod mux {
    use super::*;
    use crate::drivers::console;
    use crate::mm::{self, VIDEO_ALIAS_VIRT, VIDEO_PHYS};

    /// One terminal's off-screen frame, page-aligned so a page-table entry
    /// can target it directly.
    #[repr(C, align(4096))]
    struct BackingFrame([u8; mm::PAGE_SIZE]);

    static mut BACKING: [BackingFrame; TERMINAL_COUNT] =
        [const { BackingFrame([0; mm::PAGE_SIZE]) }; TERMINAL_COUNT];

    /// Physical address of a terminal's backing frame (virtual = physical
    /// inside the kernel page).
    pub fn backing_phys(terminal: usize) -> u32 {
        // SAFETY: Address-of only; the array is static.
        unsafe { core::ptr::addr_of!(BACKING[terminal]) as u32 }
    }

    /// The terminal currently mapped to physical video memory.
    pub fn visible() -> usize {
        console::with(|c| c.visible_terminal())
    }

    /// Make terminal `to` visible. Invoked from the keyboard IRQ handler,
    /// so interrupts are disabled for the whole sequence.
    pub fn switch_to(to: usize) {
        if to >= TERMINAL_COUNT {
            return;
        }
        let from = visible();
        if from == to {
            return;
        }

        // Swap frame contents through the always-physical alias.
        let screen = VIDEO_ALIAS_VIRT as *mut u8;
        // SAFETY: The alias page maps physical video memory in every
        // address space; the backing frames are statics. Both are 4 KiB;
        // we copy only the 4000 visible bytes.
        unsafe {
            let from_backing = core::ptr::addr_of_mut!(BACKING[from]) as *mut u8;
            let to_backing = core::ptr::addr_of!(BACKING[to]) as *const u8;
            core::ptr::copy_nonoverlapping(screen, from_backing, console::FRAME_BYTES);
            core::ptr::copy_nonoverlapping(to_backing, screen, console::FRAME_BYTES);
        }

        // Retarget the video page of both terminals, then reload CR3 so
        // the TLB drops the old translations.
        mm::paging::retarget_terminal_video(from, backing_phys(from));
        mm::paging::retarget_terminal_video(to, VIDEO_PHYS as u32);
        if crate::process::live_count() > 0 {
            mm::paging::install_process(crate::process::current_pid());
        }

        console::with(|c| c.switch_visible(to));
        log::debug!("terminal {} -> visible", to);
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use mux::{backing_phys, switch_to, visible};

/// Host builds: terminal 0 is permanently "visible".
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn visible() -> usize {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_read_single_line() {
        let mut queue = ReadQueue::new();
        queue.push_line(b"hello").unwrap();

        let mut buf = [0u8; 32];
        let n = queue.read(&mut buf);
        assert_eq!(&buf[..n], b"hello\n");
        assert!(queue.is_empty());
    }

    #[test]
    fn read_stops_at_first_newline() {
        let mut queue = ReadQueue::new();
        queue.push_line(b"one").unwrap();
        queue.push_line(b"two").unwrap();

        let mut buf = [0u8; 32];
        let n = queue.read(&mut buf);
        assert_eq!(&buf[..n], b"one\n");
        let n = queue.read(&mut buf);
        assert_eq!(&buf[..n], b"two\n");
    }

    #[test]
    fn short_reads_leave_the_tail_queued() {
        let mut queue = ReadQueue::new();
        queue.push_line(b"abcdef").unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(queue.read(&mut buf), 4);
        assert_eq!(&buf, b"abcd");
        let n = queue.read(&mut buf);
        assert_eq!(&buf[..n], b"ef\n");
    }

    #[test]
    fn full_queue_rejects_whole_line() {
        let mut queue = ReadQueue::new();
        let line = [b'x'; 200];
        for _ in 0..6 {
            queue.push_line(&line).unwrap(); // 6 * 201 = 1206 bytes
        }
        assert!(queue.push_line(&line).is_err()); // 1407 > 1280
        // A short line still fits.
        queue.push_line(b"ok").unwrap();
    }

    #[test]
    fn max_length_line_fits_with_newline() {
        let mut queue = ReadQueue::new();
        let line = [b'a'; 128];
        queue.push_line(&line).unwrap();

        let mut buf = [0u8; 256];
        let n = queue.read(&mut buf);
        assert_eq!(n, 129);
        assert_eq!(buf[127], b'a');
        assert_eq!(buf[128], b'\n');
    }
}
