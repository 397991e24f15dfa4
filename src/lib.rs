//! userprog - System-Call Boundary for User Programs
//!
//! Everything between a user program's `int $0x30` and the kernel services
//! it asks for.
//!
//! # Responsibilities
//! - Validate every user address and buffer before the kernel touches it
//! - Decode call numbers and arguments from the trapped user stack
//! - Dispatch to the requested operation and store its result
//! - Keep each process's open files in its own descriptor table
//! - Serialize all filesystem access behind one guard
//!
//! # Collaborators
//! Process creation, the filesystem, page tables, and the console are
//! provided by the rest of the kernel through traits:
//! [`process::ProcessManager`], [`fs::FileSystem`], [`mm::PageDirectory`],
//! [`console::Console`], [`console::InputDevice`], [`console::PowerControl`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod console;
pub mod exception;
pub mod fs;
pub mod mm;
pub mod process;
pub mod syscall;

#[cfg(test)]
mod testing;

use alloc::boxed::Box;
use alloc::sync::Arc;

use config::Config;
use console::{Console, InputDevice, PowerControl};
use fs::{FileSystem, FsGuard};
use mm::PageDirectory;
use process::{Pid, Process, ProcessManager};
use syscall::SyscallTable;

pub use exception::{handle_trap, InterruptFrame};
pub use syscall::Disposition;

/// Devices system calls use directly, without the filesystem guard.
#[derive(Clone)]
pub struct Devices {
    pub console: Arc<dyn Console>,
    pub input: Arc<dyn InputDevice>,
    pub power: Arc<dyn PowerControl>,
}

/// The system-call layer of one kernel instance.
///
/// Shared by every thread; each dispatch borrows the calling process and its
/// trap frame for the duration of one call.
pub struct Kernel<F: FileSystem> {
    config: Config,
    pub(crate) fs: Arc<FsGuard<F>>,
    pub(crate) devices: Devices,
    pub(crate) processes: Box<dyn ProcessManager<F>>,
    pub(crate) table: SyscallTable<F>,
}

impl<F: FileSystem> Kernel<F> {
    /// Take ownership of the filesystem and build the call table.
    pub fn new(
        config: Config,
        fs: F,
        devices: Devices,
        processes: Box<dyn ProcessManager<F>>,
    ) -> Self {
        Self {
            config,
            fs: Arc::new(FsGuard::new(fs)),
            devices,
            processes,
            table: SyscallTable::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The filesystem guard, for kernel code outside system calls.
    #[inline]
    pub fn fs(&self) -> &Arc<FsGuard<F>> {
        &self.fs
    }

    /// Create the system-call record for a new process.
    pub fn new_process(
        &self,
        pid: Pid,
        name: &str,
        page_dir: Box<dyn PageDirectory + Send>,
    ) -> Process<F> {
        Process::new(pid, name, page_dir, Arc::clone(&self.fs))
    }
}
