//! Real-time clock with per-process virtual pacing
//!
//! The hardware ticks once, at 1024 Hz, forever. Each process carries a
//! divisor and a counter: every physical tick advances the counters of all
//! processes with a nonzero divisor, and a counter reaching its divisor
//! sets that process's pending flag. `read` blocks on the flag, so each
//! process perceives exactly the frequency it asked for with no hardware
//! reprogramming.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::error::{KernelError, KernelResult};
use crate::process::MAX_PROCESSES;

/// The one rate the hardware is ever programmed to.
pub const PHYSICAL_HZ: u32 = 1024;

struct PacingTable {
    /// Physical ticks per virtual tick; 0 disables pacing for the slot.
    targets: [AtomicU32; MAX_PROCESSES],
    counters: [AtomicU32; MAX_PROCESSES],
    pending: [AtomicBool; MAX_PROCESSES],
}

static PACING: PacingTable = PacingTable {
    targets: [const { AtomicU32::new(0) }; MAX_PROCESSES],
    counters: [const { AtomicU32::new(0) }; MAX_PROCESSES],
    pending: [const { AtomicBool::new(false) }; MAX_PROCESSES],
};

/// Translate a requested virtual frequency to a divisor. Only powers of two
/// in [2, 1024] are accepted.
pub fn divisor_for(hz: u32) -> KernelResult<u32> {
    if (2..=PHYSICAL_HZ).contains(&hz) && hz.is_power_of_two() {
        Ok(PHYSICAL_HZ / hz)
    } else {
        Err(KernelError::InvalidArgument)
    }
}

/// `open`: pace the process at 2 Hz.
pub fn open(pid: usize) {
    PACING.counters[pid].store(0, Ordering::Relaxed);
    PACING.pending[pid].store(false, Ordering::Relaxed);
    PACING.targets[pid].store(PHYSICAL_HZ / 2, Ordering::Relaxed);
}

/// `close`: stop pacing the process and drop any pending tick.
pub fn close(pid: usize) {
    PACING.targets[pid].store(0, Ordering::Relaxed);
    PACING.counters[pid].store(0, Ordering::Relaxed);
    PACING.pending[pid].store(false, Ordering::Relaxed);
}

/// `write`: retune the process's virtual frequency.
pub fn set_frequency(pid: usize, hz: u32) -> KernelResult<()> {
    let divisor = divisor_for(hz)?;
    PACING.targets[pid].store(divisor, Ordering::Relaxed);
    Ok(())
}

/// Current divisor of a process (0 when pacing is off).
pub fn target(pid: usize) -> u32 {
    PACING.targets[pid].load(Ordering::Relaxed)
}

/// Advance every paced process by one physical tick.
pub fn tick() {
    for pid in 0..MAX_PROCESSES {
        let target = PACING.targets[pid].load(Ordering::Relaxed);
        if target == 0 {
            continue;
        }
        let count = PACING.counters[pid].load(Ordering::Relaxed) + 1;
        if count >= target {
            PACING.counters[pid].store(0, Ordering::Relaxed);
            PACING.pending[pid].store(true, Ordering::Release);
        } else {
            PACING.counters[pid].store(count, Ordering::Relaxed);
        }
    }
}

/// Whether the process has an undelivered virtual tick.
pub fn is_pending(pid: usize) -> bool {
    PACING.pending[pid].load(Ordering::Acquire)
}

/// `read`: clear the pending flag with interrupts disabled, then spin with
/// interrupts enabled until the handler raises it again. The spin is the
/// scheduler's cooperative yield point.
pub fn wait(pid: usize) {
    crate::arch::interrupts::without_interrupts(|| {
        PACING.pending[pid].store(false, Ordering::Relaxed);
    });
    crate::arch::interrupts::enable();
    while !is_pending(pid) {
        core::hint::spin_loop();
    }
}

// ---------------------------------------------------------------------------
// CMOS programming and IRQ plumbing (bare metal only)
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod hw {
    use super::*;
    use crate::arch::x86::pic::{self, IRQ_RTC};
    use crate::arch::x86::port::{inb, outb};

    const CMOS_INDEX: u16 = 0x70;
    const CMOS_DATA: u16 = 0x71;
    /// Register A with NMI disabled.
    const REG_A: u8 = 0x8A;
    /// Register B with NMI disabled.
    const REG_B: u8 = 0x8B;
    /// Register C (interrupt status).
    const REG_C: u8 = 0x0C;
    /// Periodic-interrupt enable bit in register B.
    const PERIODIC_ENABLE: u8 = 0x40;
    /// Rate code 6: 32768 >> (6 - 1) = 1024 Hz.
    const RATE_1024HZ: u8 = 0x06;

    /// Program the periodic interrupt at 1024 Hz and unmask IRQ 8. Runs
    /// with interrupts still disabled during boot.
    pub fn init() {
        // SAFETY: CMOS index/data sequence per the RTC protocol: select a
        // register (NMI disabled), read-modify-write. No NMI can interleave
        // because bit 7 of the index stays set.
        unsafe {
            outb(CMOS_INDEX, REG_B);
            let prev = inb(CMOS_DATA);
            outb(CMOS_INDEX, REG_B);
            outb(CMOS_DATA, prev | PERIODIC_ENABLE);

            outb(CMOS_INDEX, REG_A);
            let prev = inb(CMOS_DATA);
            outb(CMOS_INDEX, REG_A);
            outb(CMOS_DATA, (prev & 0xF0) | RATE_1024HZ);
        }

        crate::arch::x86::irq::register(IRQ_RTC, handle_irq);
        pic::unmask(IRQ_RTC);
        log::info!("rtc: periodic tick at {} Hz", PHYSICAL_HZ);
    }

    /// IRQ 8 handler: advance pacing, rearm by reading register C.
    fn handle_irq() {
        tick();
        // SAFETY: Reading register C acknowledges the RTC interrupt; the
        // value itself is discarded.
        unsafe {
            outb(CMOS_INDEX, REG_C);
            let _ = inb(CMOS_DATA);
        }
        pic::eoi(IRQ_RTC);
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use hw::init;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisor_accepts_powers_of_two_in_range() {
        assert_eq!(divisor_for(2).unwrap(), 512);
        assert_eq!(divisor_for(8).unwrap(), 128);
        assert_eq!(divisor_for(1024).unwrap(), 1);

        assert!(divisor_for(0).is_err());
        assert!(divisor_for(1).is_err());
        assert!(divisor_for(3).is_err());
        assert!(divisor_for(1000).is_err());
        assert!(divisor_for(2048).is_err());
    }

    #[test]
    fn open_paces_at_two_hertz_and_close_stops() {
        open(4);
        assert_eq!(target(4), 512);
        close(4);
        assert_eq!(target(4), 0);
    }

    #[test]
    fn bad_write_leaves_divisor_unchanged() {
        open(5);
        assert_eq!(target(5), 512);
        assert!(set_frequency(5, 1000).is_err());
        assert_eq!(target(5), 512);
        assert!(set_frequency(5, 8).is_ok());
        assert_eq!(target(5), 128);
        close(5);
    }

    #[test]
    fn ticks_accumulate_into_pending() {
        open(3);
        set_frequency(3, 1024).unwrap(); // divisor 1: every tick pends
        assert!(!is_pending(3));
        tick();
        assert!(is_pending(3));

        set_frequency(3, 512).unwrap(); // divisor 2
        PACING.pending[3].store(false, core::sync::atomic::Ordering::Relaxed);
        tick();
        assert!(!is_pending(3));
        tick();
        assert!(is_pending(3));
        close(3);
    }
}
