//! 16550 UART on COM1, used as the log sink
//!
//! Polled output only; the receive side is never enabled. Initialized before
//! the logger is installed so early records are not lost.

use core::fmt::{self, Write};

use spin::Mutex;

use super::port::{inb, outb};

/// COM1 base port.
const COM1: u16 = 0x3F8;

struct SerialPort {
    base: u16,
}

impl SerialPort {
    const fn new(base: u16) -> Self {
        Self { base }
    }

    fn init(&mut self) {
        // SAFETY: Direct writes to the 16550 at `base` following the UART
        // init sequence: disable interrupts, set the divisor via DLAB
        // (38400 baud), 8N1 framing, enable and clear the FIFOs, raise
        // DTR/RTS.
        unsafe {
            outb(self.base + 1, 0x00);
            outb(self.base + 3, 0x80);
            outb(self.base, 0x03);
            outb(self.base + 1, 0x00);
            outb(self.base + 3, 0x03);
            outb(self.base + 2, 0xC7);
            outb(self.base + 4, 0x0B);
        }
    }

    fn write_byte(&mut self, byte: u8) {
        // SAFETY: Polls the line-status register until the transmit buffer
        // is empty, then writes the data register. The port was initialized
        // by `init`.
        unsafe {
            while (inb(self.base + 5) & 0x20) == 0 {
                core::hint::spin_loop();
            }
            outb(self.base, byte);
        }
    }
}

impl Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

static PORT: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1));

/// Program the UART. Called once during early boot.
pub fn init() {
    PORT.lock().init();
}

/// Write formatted text to the serial port.
pub fn write_fmt(args: fmt::Arguments) {
    crate::arch::interrupts::without_interrupts(|| {
        let _ = PORT.lock().write_fmt(args);
    });
}
