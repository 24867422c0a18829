// Print macros for kernel output

/// Print to the console of the calling process's terminal.
#[cfg(all(target_arch = "x86", target_os = "none"))]
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::drivers::console::_print(format_args!($($arg)*)));
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Print to the visible terminal regardless of which process is scheduled.
/// Used from interrupt context (keyboard echo, fault reports) so the user
/// always sees the output on the screen that is currently displayed.
#[cfg(all(target_arch = "x86", target_os = "none"))]
#[macro_export]
macro_rules! print_visible {
    ($($arg:tt)*) => ($crate::drivers::console::_print_visible(format_args!($($arg)*)));
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
#[macro_export]
macro_rules! println_visible {
    () => ($crate::print_visible!("\n"));
    ($($arg:tt)*) => ($crate::print_visible!("{}\n", format_args!($($arg)*)));
}

// Stub implementations for host builds
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
#[macro_export]
macro_rules! println {
    () => {};
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
#[macro_export]
macro_rules! print_visible {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
#[macro_export]
macro_rules! println_visible {
    () => {};
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}
