//! File Descriptor Table
//!
//! Each process owns one [`FdTable`]. It maps small integers to open files
//! and hands out numbers monotonically, starting after the two reserved
//! console descriptors.
//!
//! # Design
//! - Table is an ordered map keyed by descriptor number, owned by exactly
//!   one process, so descriptors cannot alias across processes
//! - Numbers are never reused within a process
//! - Closing happens under the filesystem guard; dropping the table closes
//!   whatever is still open

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::fmt;

use log::{debug, warn};

use crate::process::Pid;

use super::{FileSystem, FsGuard, OpenFile};

/// A per-process file descriptor number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Fd(i32);

impl Fd {
    /// Console input.
    pub const STDIN: Self = Self(0);

    /// Console output.
    pub const STDOUT: Self = Self(1);

    /// First number handed out for a file.
    pub const FIRST_FILE: Self = Self(2);

    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Check for stdin or stdout.
    #[inline]
    pub const fn is_reserved(self) -> bool {
        self.0 == Self::STDIN.0 || self.0 == Self::STDOUT.0
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for descriptor table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// 0 and 1 are the console, not files.
    Reserved,
    /// No open file with this number in this process.
    NotFound,
    /// The descriptor counter ran out.
    Exhausted,
}

impl fmt::Display for FdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved => write!(f, "reserved descriptor"),
            Self::NotFound => write!(f, "bad file descriptor"),
            Self::Exhausted => write!(f, "descriptor numbers exhausted"),
        }
    }
}

/// One open file owned by one process.
#[derive(Debug)]
pub struct OpenFileDescriptor<T> {
    fd_num: Fd,
    owner: Pid,
    file: T,
}

impl<T> OpenFileDescriptor<T> {
    #[inline]
    pub fn fd_num(&self) -> Fd {
        self.fd_num
    }

    #[inline]
    pub fn owner(&self) -> Pid {
        self.owner
    }

    #[inline]
    pub fn file(&self) -> &T {
        &self.file
    }

    #[inline]
    pub fn file_mut(&mut self) -> &mut T {
        &mut self.file
    }
}

/// Per-process table of open file descriptors.
pub struct FdTable<F: FileSystem> {
    owner: Pid,
    fs: Arc<FsGuard<F>>,
    open: BTreeMap<Fd, OpenFileDescriptor<F::File>>,
    next_fd: i32,
}

impl<F: FileSystem> FdTable<F> {
    /// Create an empty table for `owner`.
    pub fn new(owner: Pid, fs: Arc<FsGuard<F>>) -> Self {
        Self {
            owner,
            fs,
            open: BTreeMap::new(),
            next_fd: Fd::FIRST_FILE.0,
        }
    }

    /// Process this table belongs to.
    #[inline]
    pub fn owner(&self) -> Pid {
        self.owner
    }

    /// Number of open descriptors.
    #[inline]
    pub fn len(&self) -> usize {
        self.open.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    #[inline]
    pub fn contains(&self, fd: Fd) -> bool {
        self.open.contains_key(&fd)
    }

    /// Store an open file and return its new descriptor number.
    ///
    /// On `Exhausted` the file is handed back so the caller can close it.
    pub fn allocate(&mut self, file: F::File) -> Result<Fd, (FdError, F::File)> {
        let fd_num = Fd(self.next_fd);
        let Some(next) = self.next_fd.checked_add(1) else {
            return Err((FdError::Exhausted, file));
        };
        self.next_fd = next;

        self.open.insert(
            fd_num,
            OpenFileDescriptor {
                fd_num,
                owner: self.owner,
                file,
            },
        );
        debug!("[FD] pid {} allocated fd {}", self.owner, fd_num);
        Ok(fd_num)
    }

    /// Look up an open descriptor.
    pub fn lookup(&self, fd: Fd) -> Result<&OpenFileDescriptor<F::File>, FdError> {
        if fd.is_reserved() {
            return Err(FdError::Reserved);
        }
        let desc = self.open.get(&fd).ok_or(FdError::NotFound)?;
        debug_assert_eq!(desc.owner, self.owner);
        Ok(desc)
    }

    /// Look up an open descriptor mutably.
    pub fn lookup_mut(&mut self, fd: Fd) -> Result<&mut OpenFileDescriptor<F::File>, FdError> {
        if fd.is_reserved() {
            return Err(FdError::Reserved);
        }
        let desc = self.open.get_mut(&fd).ok_or(FdError::NotFound)?;
        debug_assert_eq!(desc.owner, self.owner);
        Ok(desc)
    }

    /// Close a descriptor and its file.
    ///
    /// The descriptor is gone afterwards even if the filesystem reports a
    /// close failure; that failure is only logged.
    pub fn release(&mut self, fd: Fd) -> Result<(), FdError> {
        if fd.is_reserved() {
            return Err(FdError::Reserved);
        }
        let desc = self.open.remove(&fd).ok_or(FdError::NotFound)?;
        self.close(desc);
        Ok(())
    }

    /// Close every remaining descriptor.
    ///
    /// Each close is independent: a failure is logged and the rest still
    /// close. Calling it again on an empty table does nothing.
    pub fn drain_on_exit(&mut self) {
        if self.open.is_empty() {
            return;
        }
        debug!("[FD] pid {} closing {} descriptors", self.owner, self.open.len());
        while let Some((_, desc)) = self.open.pop_first() {
            self.close(desc);
        }
    }

    fn close(&self, desc: OpenFileDescriptor<F::File>) {
        let OpenFileDescriptor { fd_num, file, .. } = desc;
        if let Err(e) = self.fs.with_lock(|_| file.close()) {
            warn!("[FD] pid {} fd {}: {}", self.owner, fd_num, e);
        }
    }
}

impl<F: FileSystem> Drop for FdTable<F> {
    fn drop(&mut self) {
        self.drain_on_exit();
    }
}

impl<F: FileSystem> fmt::Debug for FdTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FdTable")
            .field("owner", &self.owner)
            .field("open", &self.open.keys().collect::<alloc::vec::Vec<_>>())
            .field("next_fd", &self.next_fd)
            .finish()
    }
}
