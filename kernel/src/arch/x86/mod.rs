//! 32-bit x86 protected-mode support
//!
//! Port I/O, the legacy 8259 interrupt controller, the interrupt descriptor
//! table, the TSS kernel-stack slot, paging control registers, the serial
//! log sink, context save/switch primitives and the ring-3 entry path.
//!
//! The boot loader is an external collaborator: it deposits the kernel and
//! the filesystem image in physical memory, installs a GDT holding the
//! selectors in [`segment`], and jumps to `_start` ([`multiboot`]) with the
//! multiboot information pointer in EBX.

pub mod context;
pub mod idt;
pub mod irq;
pub mod multiboot;
pub mod paging;
pub mod pic;
pub mod port;
pub mod segment;
pub mod serial;
pub mod usermode;
