//! Serial-port backend for the `log` facade
//!
//! Kernel subsystems log through `log::{error, warn, info, debug, trace}`;
//! records are written to COM1 so they are visible on the emulator's serial
//! console without disturbing the text-mode display. On host builds the
//! logger is absent and the facade discards records.

use log::{LevelFilter, Metadata, Record};

/// Messages at or below this level are emitted.
const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= DEFAULT_LEVEL
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        #[cfg(all(target_arch = "x86", target_os = "none"))]
        crate::arch::x86::serial::write_fmt(format_args!(
            "[{:5}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

/// Install the serial logger. Called once, before interrupts are enabled.
pub fn init() {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    crate::arch::x86::serial::init();

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(DEFAULT_LEVEL);
    }
}
