//! Interrupt descriptor table
//!
//! Vectors 0–19 are exception gates that fold a CPU fault into a process
//! halt with the distinguished status (see [`crate::syscall::exec`]).
//! Vectors 0x20–0x2F carry the remapped hardware IRQs and route through the
//! per-line slots in [`super::irq`]. Vector 0x80 is the user-accessible
//! system-call trap gate. Everything else lands in a default gate.

use core::arch::naked_asm;

use lazy_static::lazy_static;

use super::pic::IRQ_VECTOR_BASE;
use super::segment::KERNEL_CS;

/// Stack layout pushed by the CPU on interrupt entry. The user ESP/SS pair
/// is present only when the interrupt crossed from ring 3; handlers here
/// only ever read `eip` and `cs`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterruptStackFrame {
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

type HandlerFn = extern "x86-interrupt" fn(InterruptStackFrame);
type HandlerFnWithCode = extern "x86-interrupt" fn(InterruptStackFrame, u32);

/// 32-bit trap gate: interrupts stay enabled in the handler.
const GATE_TRAP: u8 = 0xF;
/// 32-bit interrupt gate: interrupts disabled on entry.
const GATE_INTERRUPT: u8 = 0xE;

/// One IDT entry.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    reserved: u8,
    flags: u8,
    offset_high: u16,
}

impl GateDescriptor {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            reserved: 0,
            flags: 0,
            offset_high: 0,
        }
    }

    fn new(handler: usize, kind: u8, dpl: u8) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector: KERNEL_CS,
            reserved: 0,
            flags: 0x80 | (dpl << 5) | kind,
            offset_high: (handler >> 16) as u16,
        }
    }
}

/// The table itself; 256 gates.
#[repr(C, align(8))]
struct Idt {
    gates: [GateDescriptor; 256],
}

impl Idt {
    fn set(&mut self, vector: usize, handler: usize, kind: u8, dpl: u8) {
        self.gates[vector] = GateDescriptor::new(handler, kind, dpl);
    }

    fn set_exception(&mut self, vector: usize, handler: HandlerFn) {
        self.set(vector, handler as usize, GATE_TRAP, 0);
    }

    fn set_exception_with_code(&mut self, vector: usize, handler: HandlerFnWithCode) {
        self.set(vector, handler as usize, GATE_TRAP, 0);
    }

    fn set_irq(&mut self, vector: usize, handler: HandlerFn) {
        self.set(vector, handler as usize, GATE_INTERRUPT, 0);
    }
}

/// Operand for `lidt`.
#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

lazy_static! {
    static ref IDT: Idt = {
        let mut idt = Idt {
            gates: [GateDescriptor::missing(); 256],
        };

        let default: HandlerFn = default_handler;
        for vector in 0..256 {
            idt.set(vector, default as usize, GATE_INTERRUPT, 0);
        }

        idt.set_exception(0, exc_divide_error);
        idt.set_exception(1, exc_debug);
        idt.set_exception(2, exc_nmi);
        idt.set_exception(3, exc_breakpoint);
        idt.set_exception(4, exc_overflow);
        idt.set_exception(5, exc_bound_range);
        idt.set_exception(6, exc_invalid_opcode);
        idt.set_exception(7, exc_device_not_available);
        idt.set_exception_with_code(8, exc_double_fault);
        idt.set_exception(9, exc_coprocessor_overrun);
        idt.set_exception_with_code(10, exc_invalid_tss);
        idt.set_exception_with_code(11, exc_segment_not_present);
        idt.set_exception_with_code(12, exc_stack_fault);
        idt.set_exception_with_code(13, exc_general_protection);
        idt.set_exception_with_code(14, exc_page_fault);
        idt.set_exception(16, exc_fpu_error);
        idt.set_exception_with_code(17, exc_alignment_check);
        idt.set_exception(18, exc_machine_check);
        idt.set_exception(19, exc_simd_error);

        idt.set_irq(IRQ_VECTOR_BASE as usize, irq0_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 1, irq1_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 2, irq2_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 3, irq3_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 4, irq4_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 5, irq5_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 6, irq6_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 7, irq7_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 8, irq8_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 9, irq9_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 10, irq10_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 11, irq11_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 12, irq12_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 13, irq13_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 14, irq14_handler);
        idt.set_irq(IRQ_VECTOR_BASE as usize + 15, irq15_handler);

        // System calls: user-reachable trap gate so interrupts stay enabled
        // while the kernel runs on the caller's behalf.
        let syscall_gate: unsafe extern "C" fn() = syscall_entry;
        idt.set(0x80, syscall_gate as usize, GATE_TRAP, 3);

        idt
    };
}

/// Load the IDT register. Called once during boot.
pub fn init() {
    let pointer = IdtPointer {
        limit: (core::mem::size_of::<Idt>() - 1) as u16,
        base: &IDT.gates as *const _ as u32,
    };
    // SAFETY: The table lives in a lazy_static, so its address is stable
    // for the lifetime of the kernel and every gate was populated above.
    unsafe {
        core::arch::asm!("lidt [{}]", in(reg) &pointer, options(nostack, preserves_flags));
    }
    log::info!("idt loaded, {} gates", IDT.gates.len());
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

/// Report a CPU fault on the visible terminal and halt the faulting
/// process with the distinguished exception status. Exceptions arrive
/// through trap gates, so interrupts must be shut off here before any
/// shared state is touched.
fn fault(name: &str, frame: &InterruptStackFrame) -> ! {
    crate::arch::interrupts::disable();
    log::error!("exception: {} at {:#010x}", name, { frame.eip });
    println_visible!("EXCEPTION: {}", name);
    crate::syscall::exec::fault_halt()
}

macro_rules! exception {
    ($handler:ident, $name:expr) => {
        extern "x86-interrupt" fn $handler(frame: InterruptStackFrame) {
            fault($name, &frame);
        }
    };
}

macro_rules! exception_with_code {
    ($handler:ident, $name:expr) => {
        extern "x86-interrupt" fn $handler(frame: InterruptStackFrame, error_code: u32) {
            log::error!("exception: {} error code {:#x}", $name, error_code);
            fault($name, &frame);
        }
    };
}

exception!(exc_divide_error, "Divide Error");
exception!(exc_debug, "Debug");
exception!(exc_nmi, "NMI Interrupt");
exception!(exc_breakpoint, "Breakpoint");
exception!(exc_overflow, "Overflow");
exception!(exc_bound_range, "BOUND Range Exceeded");
exception!(exc_invalid_opcode, "Invalid Opcode");
exception!(exc_device_not_available, "Device Not Available");
exception_with_code!(exc_double_fault, "Double Fault");
exception!(exc_coprocessor_overrun, "Coprocessor Segment Overrun");
exception_with_code!(exc_invalid_tss, "Invalid TSS");
exception_with_code!(exc_segment_not_present, "Segment Not Present");
exception_with_code!(exc_stack_fault, "Stack Fault");
exception_with_code!(exc_general_protection, "General Protection");
exception!(exc_fpu_error, "x87 FPU Floating-Point Error");
exception_with_code!(exc_alignment_check, "Alignment Check");
exception!(exc_machine_check, "Machine Check");
exception!(exc_simd_error, "SIMD Floating-Point Exception");

extern "x86-interrupt" fn exc_page_fault(frame: InterruptStackFrame, error_code: u32) {
    let cr2: u32;
    // SAFETY: Reading CR2 (the faulting linear address) has no side effect.
    unsafe {
        core::arch::asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags));
    }
    log::error!("page fault at {:#010x}, error code {:#x}", cr2, error_code);
    fault("Page Fault", &frame);
}

extern "x86-interrupt" fn default_handler(_frame: InterruptStackFrame) {
    log::warn!("interrupt on an unexpected vector");
}

// ---------------------------------------------------------------------------
// Hardware IRQs
// ---------------------------------------------------------------------------

macro_rules! irq_stub {
    ($handler:ident, $line:expr) => {
        extern "x86-interrupt" fn $handler(_frame: InterruptStackFrame) {
            super::irq::dispatch($line);
        }
    };
}

irq_stub!(irq0_handler, 0);
irq_stub!(irq1_handler, 1);
irq_stub!(irq2_handler, 2);
irq_stub!(irq3_handler, 3);
irq_stub!(irq4_handler, 4);
irq_stub!(irq5_handler, 5);
irq_stub!(irq6_handler, 6);
irq_stub!(irq7_handler, 7);
irq_stub!(irq8_handler, 8);
irq_stub!(irq9_handler, 9);
irq_stub!(irq10_handler, 10);
irq_stub!(irq11_handler, 11);
irq_stub!(irq12_handler, 12);
irq_stub!(irq13_handler, 13);
irq_stub!(irq14_handler, 14);
irq_stub!(irq15_handler, 15);

// ---------------------------------------------------------------------------
// System-call gate
// ---------------------------------------------------------------------------

/// `int 0x80` trampoline: call number in EAX, arguments in EBX/ECX/EDX,
/// return value back in EAX. Saves the full register frame, switches to
/// kernel data segments, and funnels into [`crate::syscall::dispatch_raw`].
#[unsafe(naked)]
unsafe extern "C" fn syscall_entry() {
    naked_asm!(
        "pusha",
        "push ds",
        "push es",
        "mov eax, {kernel_ds}",
        "mov ds, ax",
        "mov es, ax",
        // Saved registers, relative to ESP: EBX +24, EDX +28, ECX +32, EAX +36.
        "mov eax, [esp + 28]", // edx -> third argument
        "push eax",
        "mov eax, [esp + 36]", // ecx -> second argument
        "push eax",
        "mov eax, [esp + 32]", // ebx -> first argument
        "push eax",
        "mov eax, [esp + 48]", // eax -> call number
        "push eax",
        "call {dispatch}",
        "add esp, 16",
        // Return value replaces the saved EAX popped by popa.
        "mov [esp + 36], eax",
        "pop es",
        "pop ds",
        "popa",
        "iretd",
        kernel_ds = const super::segment::KERNEL_DS as u32,
        dispatch = sym crate::syscall::dispatch_raw,
    )
}
