//! Programmable interval timer
//!
//! Channel 0 in rate-generator mode is the scheduler's sole trigger. The
//! tick rate only needs to be slow enough for processes to make progress
//! and fast enough to feel interactive.

/// Scheduler tick rate.
pub const TICK_HZ: u32 = 50;

/// The PIT input clock.
const BASE_HZ: u32 = 1_193_182;

/// The 16-bit reload value for a requested rate.
pub fn reload_for(hz: u32) -> u16 {
    (BASE_HZ / hz) as u16
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod hw {
    use super::*;
    use crate::arch::x86::pic::{self, IRQ_PIT};
    use crate::arch::x86::port::outb;

    const CHANNEL_0: u16 = 0x40;
    const COMMAND: u16 = 0x43;
    /// Channel 0, lobyte/hibyte access, rate generator.
    const MODE: u8 = 0x36;

    /// Program the tick rate, register the handler, unmask IRQ 0.
    pub fn init() {
        let reload = reload_for(TICK_HZ);
        // SAFETY: Standard PIT programming: mode byte on the command port,
        // then the reload value low byte first on channel 0.
        unsafe {
            outb(COMMAND, MODE);
            outb(CHANNEL_0, (reload & 0xFF) as u8);
            outb(CHANNEL_0, (reload >> 8) as u8);
        }
        crate::arch::x86::irq::register(IRQ_PIT, handle_irq);
        pic::unmask(IRQ_PIT);
        log::info!("pit: scheduler tick at {} Hz", TICK_HZ);
    }

    /// IRQ 0: acknowledge first, then hand the tick to the scheduler. The
    /// scheduler may not return here (bootstrap and context switches), so
    /// the EOI cannot wait.
    fn handle_irq() {
        pic::eoi(IRQ_PIT);
        crate::sched::on_tick();
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use hw::init;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_matches_base_clock() {
        assert_eq!(reload_for(TICK_HZ), (1_193_182 / TICK_HZ) as u16);
        // Sanity: the reload fits 16 bits for any sensible rate.
        assert!(reload_for(20) > 0);
        assert!(reload_for(100) > 0);
    }
}
