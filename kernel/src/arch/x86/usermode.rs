//! Ring-3 entry and the return path from a halting child
//!
//! `execute` calls [`enter_user`], which records the caller's kernel-stack
//! context (same frame layout as [`super::context`]) and drops to user mode
//! via `iretd`. The call "returns" only when the child process halts:
//! `halt` calls [`return_to_parent`], which resumes the recorded context
//! with the child's status as the apparent return value.

use core::arch::naked_asm;

use super::segment::{USER_CS, USER_DS};

/// EFLAGS value for user entry: IF set, reserved bit 1 set.
const USER_EFLAGS: u32 = 0x202;

/// Switch to ring 3 at `entry` with the user stack pointer `user_sp`.
///
/// The current kernel context is recorded into `sp_slot`/`bp_slot` first;
/// when the process started here eventually halts, [`return_to_parent`]
/// resumes that context and this function returns the halt status.
///
/// # Safety
/// - The current page directory must map `entry` and `user_sp` as
///   user-accessible.
/// - The TSS `esp0` must already point at this process's kernel stack top.
/// - Both slots must stay valid until the child halts.
#[unsafe(naked)]
pub unsafe extern "C" fn enter_user(
    entry: u32,
    user_sp: u32,
    sp_slot: *mut usize,
    bp_slot: *mut usize,
) -> usize {
    naked_asm!(
        "push ebx",
        "push esi",
        "push edi",
        "push ebp",
        "mov eax, [esp + 28]", // sp_slot
        "mov [eax], esp",
        "mov eax, [esp + 32]", // bp_slot
        "mov [eax], ebp",
        "mov ecx, [esp + 20]", // entry
        "mov edx, [esp + 24]", // user_sp
        // User data segments; stack accesses below go through SS.
        "mov eax, {user_ds}",
        "mov ds, ax",
        "mov es, ax",
        // iretd frame: SS, ESP, EFLAGS, CS, EIP.
        "push {user_ds}",
        "push edx",
        "push {eflags}",
        "push {user_cs}",
        "push ecx",
        "iretd",
        user_ds = const USER_DS as u32,
        user_cs = const USER_CS as u32,
        eflags = const USER_EFLAGS,
    )
}

/// Resume the context recorded by [`enter_user`] (or by the scheduler on
/// the parent's behalf), making that call return `status`. Never returns.
///
/// The parent's EBP is restored from the frozen frame itself; `saved_sp`
/// is the value recorded in the parent's PCB.
///
/// # Safety
/// - `saved_sp` must point at a frozen context frame on a live kernel
///   stack.
/// - The parent's page directory and TSS `esp0` must already be installed.
#[unsafe(naked)]
pub unsafe extern "C" fn return_to_parent(saved_sp: usize, status: u32) -> ! {
    naked_asm!(
        "mov ecx, [esp + 4]", // saved_sp
        "mov eax, [esp + 8]", // status -> apparent return value
        "mov esp, ecx",
        "pop ebp",
        "pop edi",
        "pop esi",
        "pop ebx",
        "ret",
    )
}
