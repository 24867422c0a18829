//! TriOS kernel library
//!
//! A small x86 protected-mode kernel: three text-mode virtual consoles,
//! up to six user processes time-sliced round-robin by the interval timer,
//! a read-only indexed filesystem, and the ten-call system-call interface
//! that ties them together.
//!
//! The crate builds for two targets. On bare metal (`target_os = "none"`,
//! 32-bit x86) the hardware paths in [`arch`] and the fixed-address statics
//! compile and the `trios-kernel` binary boots via multiboot. On a host
//! target the same logic modules compile against plain memory so the
//! standard `#[test]` harness can exercise them.

#![no_std]
#![cfg_attr(all(target_arch = "x86", target_os = "none"), feature(abi_x86_interrupt))]

// Host target: tests use the system allocator and std harness.
#[cfg(not(target_os = "none"))]
extern crate std;

#[macro_use]
pub mod print;

pub mod arch;
pub mod drivers;
pub mod error;
pub mod fs;
pub mod logger;
pub mod mm;
pub mod process;
pub mod sched;
pub mod syscall;
pub mod terminal;

// Re-exports used across subsystem boundaries and by tests.
pub use error::{KernelError, KernelResult};
