//! Architecture support
//!
//! Everything that touches registers, I/O ports or fixed physical addresses
//! lives under [`x86`] and only compiles for the bare-metal 32-bit target.
//! [`interrupts`] is the one surface the portable kernel code uses directly;
//! it degrades to plain closure calls on host builds.

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod x86;

pub mod interrupts;
