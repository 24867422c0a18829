//! Per-line IRQ handler slots
//!
//! Device drivers register a plain function per IRQ line; the IDT stubs
//! route hardware interrupts here. Registration happens during boot with
//! interrupts disabled, dispatch happens inside interrupt handlers, so the
//! table is never contended.

use spin::Mutex;

/// Handler type for a hardware interrupt line.
pub type IrqHandler = fn();

const IRQ_LINES: usize = 16;

static HANDLERS: Mutex<[Option<IrqHandler>; IRQ_LINES]> = Mutex::new([None; IRQ_LINES]);

/// Install `handler` for `irq`. Replaces any previous handler.
pub fn register(irq: u8, handler: IrqHandler) {
    HANDLERS.lock()[irq as usize] = Some(handler);
}

/// Invoke the handler registered for `irq`, if any. Unhandled lines are
/// acknowledged so a spurious interrupt cannot wedge the controller.
pub fn dispatch(irq: u8) {
    let handler = HANDLERS.lock()[irq as usize];
    match handler {
        Some(handler) => handler(),
        None => super::pic::eoi(irq),
    }
}
