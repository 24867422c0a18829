//! Kernel error types
//!
//! Internal APIs return [`KernelResult`]; the system-call dispatcher is the
//! single place where these are flattened to the ABI integers (−1, and −2
//! for process exhaustion).

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// No directory entry with the requested name (or index).
    NotFound,
    /// A caller-supplied value is malformed (bad length, bad frequency,
    /// name too long, type mismatch on open).
    InvalidArgument,
    /// A user pointer is null or outside the user region.
    BadAddress,
    /// File-descriptor index out of range or slot not in use.
    BadDescriptor,
    /// All file-descriptor slots 2..8 are occupied.
    DescriptorsExhausted,
    /// All six process slots are live.
    ProcessLimit,
    /// The named file is not a loadable executable.
    NotExecutable,
    /// The filesystem image contradicts its own metadata.
    CorruptImage,
    /// The operation is not supported by this descriptor kind.
    Unsupported,
}

/// Result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// The integer this error becomes at the system-call boundary.
    pub fn as_syscall_ret(self) -> i32 {
        match self {
            KernelError::ProcessLimit => -2,
            _ => -1,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::NotFound => "no such file",
            KernelError::InvalidArgument => "invalid argument",
            KernelError::BadAddress => "bad user address",
            KernelError::BadDescriptor => "bad file descriptor",
            KernelError::DescriptorsExhausted => "no free file descriptor",
            KernelError::ProcessLimit => "too many processes",
            KernelError::NotExecutable => "not an executable",
            KernelError::CorruptImage => "corrupt filesystem image",
            KernelError::Unsupported => "operation not supported",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_limit_maps_to_minus_two() {
        assert_eq!(KernelError::ProcessLimit.as_syscall_ret(), -2);
        assert_eq!(KernelError::NotFound.as_syscall_ret(), -1);
        assert_eq!(KernelError::BadDescriptor.as_syscall_ret(), -1);
    }
}
