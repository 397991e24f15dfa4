//! Filesystem access for system calls
//!
//! The filesystem itself lives outside this crate; it is reached through the
//! [`FileSystem`] and [`OpenFile`] traits. This module adds:
//! - [`FsGuard`]: the single lock every filesystem operation runs under
//! - [`FdTable`]: the per-process table of open file descriptors

mod fd;
mod guard;

use core::fmt;

pub use fd::{Fd, FdError, FdTable, OpenFileDescriptor};
pub use guard::FsGuard;

/// The shared, non-reentrant filesystem.
///
/// Every method is only ever called while the [`FsGuard`] is held.
pub trait FileSystem {
    /// An open file.
    type File: OpenFile;

    /// Create a file of `initial_size` bytes. False if it exists or the
    /// filesystem is out of space.
    fn create(&mut self, name: &str, initial_size: u32) -> bool;

    /// Remove a file by name. False if there is no such file.
    fn remove(&mut self, name: &str) -> bool;

    /// Open a file by name. `None` if there is no such file.
    fn open(&mut self, name: &str) -> Option<Self::File>;
}

/// An open file with its own cursor.
///
/// Also only used while the [`FsGuard`] is held.
pub trait OpenFile {
    /// Length of the file in bytes.
    fn length(&self) -> u32;

    /// Read at the cursor into `buf`; returns bytes read.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write `buf` at the cursor; returns bytes written.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Move the cursor. Positions past the end are allowed.
    fn seek(&mut self, position: u32);

    /// Current cursor position.
    fn tell(&self) -> u32;

    /// Close the file.
    fn close(self) -> Result<(), FsError>
    where
        Self: Sized;
}

/// Error reported by the external filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Closing a file failed (e.g. flushing its inode).
    CloseFailed,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CloseFailed => write!(f, "close failed"),
        }
    }
}
