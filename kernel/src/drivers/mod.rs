//! Device drivers
//!
//! [`console`] renders text into whichever frame paging has wired to the
//! video address, [`keyboard`] turns scancodes into line-edited input,
//! [`rtc`] virtualizes the 1024 Hz clock per process, and [`pit`] is the
//! scheduler's tick source.

pub mod console;
pub mod keyboard;
pub mod pit;
pub mod rtc;
