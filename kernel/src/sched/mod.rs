//! Round-robin scheduler
//!
//! The interval timer is the only trigger. While any terminal has never run
//! a shell, each tick spawns the next one ([`Phase::Bootstrapping`] ends
//! with the first); afterwards each tick rotates to the next live, active
//! process: park the current context, move the console cursor bookkeeping,
//! install the next address space and kernel stack, and resume wherever the
//! next process last yielded.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Whether a "current process" exists yet. Until the first shell spawns,
/// tick handling must not touch the (nonexistent) current PCB or cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Bootstrapping = 0,
    Running = 1,
}

static STARTED: AtomicBool = AtomicBool::new(false);
static PHASE: AtomicU8 = AtomicU8::new(Phase::Bootstrapping as u8);

/// Arm the scheduler; ticks before this are ignored.
pub fn start() {
    STARTED.store(true, Ordering::Release);
    log::info!("scheduler armed");
}

pub fn phase() -> Phase {
    if PHASE.load(Ordering::Acquire) == Phase::Running as u8 {
        Phase::Running
    } else {
        Phase::Bootstrapping
    }
}

fn set_phase(phase: Phase) {
    PHASE.store(phase as u8, Ordering::Release);
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod imp {
    use super::*;
    use crate::arch::x86::context::{save_context, switch_context};
    use crate::arch::x86::segment;
    use crate::drivers::console;
    use crate::mm::paging;
    use crate::process::{self, kernel_stack_top, pcb_of};
    use crate::terminal;

    /// Timer tick entry, called from the IRQ handler with interrupts
    /// disabled and the IRQ already acknowledged.
    pub fn on_tick() {
        if !STARTED.load(Ordering::Acquire) {
            return;
        }
        if terminal::next_inactive().is_some() {
            bootstrap_tick();
            return;
        }
        rotate();
    }

    /// One shell per terminal, spawned one tick at a time. The spawning
    /// context drops into user mode and never returns here.
    fn bootstrap_tick() {
        if phase() == Phase::Running {
            // A process is running: freeze it exactly as a rotation would,
            // so a later tick can resume it.
            let current = process::current();
            console::with(|c| c.save_live_cursor());
            // SAFETY: The slots live in the current PCB, which stays valid
            // while the process is live.
            if unsafe { save_context(&mut current.saved_sp, &mut current.saved_bp) } != 0 {
                // Resumed by a later rotation.
                return;
            }
        }

        let terminal = match terminal::next_inactive() {
            Some(t) => t,
            None => return,
        };
        console::with(|c| c.begin_terminal(terminal));
        set_phase(Phase::Running);

        if let Err(err) = crate::syscall::exec::execute(b"shell") {
            log::error!("failed to spawn shell on terminal {}: {}", terminal, err);
        }
    }

    /// Preempt the current process and resume its round-robin successor.
    fn rotate() {
        let current = process::current();
        let next = process::with_pids(|pids| {
            pids.next_schedulable(current.pid, |pid| {
                // SAFETY: Live pids always have initialized PCBs.
                unsafe { (*pcb_of(pid)).active }
            })
        });
        let next = match next {
            Some(next) => next,
            None => return,
        };

        // SAFETY: next is live, so its PCB is initialized and its saved
        // context points into its frozen kernel stack.
        let next_pcb = unsafe { &mut *pcb_of(next) };

        console::with(|c| c.switch_live(next_pcb.terminal));
        paging::install_process(next);
        segment::set_kernel_stack(kernel_stack_top(next));

        // SAFETY: Slots are in the live current PCB; next_pcb.saved_sp was
        // recorded when that process was switched out.
        unsafe {
            switch_context(
                &mut current.saved_sp,
                &mut current.saved_bp,
                next_pcb.saved_sp,
            );
        }
        // Resumed: fall through into the interrupt epilogue.
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use imp::on_tick;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_round_trips() {
        assert_eq!(phase(), Phase::Bootstrapping);
        set_phase(Phase::Running);
        assert_eq!(phase(), Phase::Running);
        set_phase(Phase::Bootstrapping);
        assert_eq!(phase(), Phase::Bootstrapping);
    }
}
