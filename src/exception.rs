//! Trap Entry
//!
//! Receives the saved user context of an interrupt and routes system calls
//! to the dispatcher.
//!
//! # Trap Sources
//! - Vector 0x30 (`int $0x30`) from user mode: system call
//! - Anything else reaching this entry is not ours to handle
//!
//! # Security Considerations
//! - Only traps raised from user mode (CPL 3) are dispatched
//! - The frame is borrowed for one dispatch; only `eax` is written

use log::error;

use crate::fs::FileSystem;
use crate::process::Process;
use crate::syscall::Disposition;
use crate::Kernel;

/// Requested privilege level mask of a code segment selector.
const RPL_MASK: u16 = 0b11;
/// Privilege level of user code.
const USER_PL: u16 = 3;

/// Registers saved on trap entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct InterruptFrame {
    /// Return value register.
    pub eax: u32,
    /// Interrupt vector number.
    pub vec_no: u32,
    /// Error code pushed by the CPU, or 0.
    pub error_code: u32,
    /// Interrupted instruction pointer.
    pub eip: u32,
    /// Interrupted code segment selector.
    pub cs: u16,
    /// Saved flags register.
    pub eflags: u32,
    /// User stack pointer at trap time.
    pub esp: u32,
}

impl InterruptFrame {
    /// Frame for a system call trap from user code with the given stack.
    pub fn syscall(vector: u8, esp: u32) -> Self {
        Self {
            vec_no: vector as u32,
            cs: 0x1B,
            eflags: 0x202,
            esp,
            ..Self::default()
        }
    }

    /// Check whether the trap came from user mode.
    #[inline]
    pub fn from_user(&self) -> bool {
        self.cs & RPL_MASK == USER_PL
    }

    /// Store a system call's return value.
    #[inline]
    pub fn set_return(&mut self, value: i32) {
        self.eax = value as u32;
    }

    /// The return value register, as the user program sees it.
    #[inline]
    pub fn return_value(&self) -> i32 {
        self.eax as i32
    }
}

/// Handle a trap raised by `process`.
///
/// System call traps from user mode are dispatched; anything else is
/// reported and left alone.
pub fn handle_trap<F: FileSystem>(
    kernel: &Kernel<F>,
    process: &mut Process<F>,
    frame: &mut InterruptFrame,
) -> Disposition {
    if frame.vec_no != kernel.config().syscall_vector as u32 {
        error!(
            "[TRAP] {}: unexpected vector {:#04x} at eip {:#010x}",
            process.name(),
            frame.vec_no,
            frame.eip
        );
        return Disposition::Unhandled;
    }
    if !frame.from_user() {
        error!(
            "[TRAP] system call from kernel mode (cs {:#06x}, eip {:#010x})",
            frame.cs, frame.eip
        );
        return Disposition::Unhandled;
    }

    kernel.dispatch(process, frame)
}
