//! System Call Faults
//!
//! A fault is a contract violation by the user program. Faults are never
//! reported back to user mode; the dispatcher terminates the offending
//! process with [`EXIT_FAULT`].

use core::fmt;

use crate::mm::VirtAddr;

/// Exit status of a process killed by a fault.
pub const EXIT_FAULT: i32 = -1;

/// Fatal error raised while decoding or validating a system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Address is null, below user space, or in kernel space.
    InvalidAddress(VirtAddr),
    /// Address is in user space but not mapped for user access.
    UnmappedAddress(VirtAddr),
    /// Kernel would write to a read-only user page.
    ReadOnlyAddress(VirtAddr),
    /// A required pointer argument was null.
    NullPointer,
    /// The call number is not in the call table.
    UnknownSyscall(u32),
    /// An argument did not have the kind its handler expected.
    BadArgument(usize),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress(va) => write!(f, "invalid user address {}", va),
            Self::UnmappedAddress(va) => write!(f, "unmapped user address {}", va),
            Self::ReadOnlyAddress(va) => write!(f, "write to read-only user address {}", va),
            Self::NullPointer => write!(f, "null pointer argument"),
            Self::UnknownSyscall(nr) => write!(f, "unknown system call {}", nr),
            Self::BadArgument(index) => write!(f, "argument {} has the wrong kind", index),
        }
    }
}

/// Why a readable user string cannot be used as a name.
///
/// Not a fault: the memory was valid, so the call just fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    /// No NUL within the allowed length.
    TooLong,
    /// Not valid UTF-8.
    NotUtf8,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong => write!(f, "name too long"),
            Self::NotUtf8 => write!(f, "name is not UTF-8"),
        }
    }
}
