//! Filesystem Access Guard
//!
//! The filesystem is not reentrant, so it lives inside one lock and can only
//! be reached through [`FsGuard::with_lock`]. The lock is released when the
//! closure returns, whatever it returns, and on unwind.

use spin::Mutex;

use super::FileSystem;

/// Owner of the shared filesystem; serializes all access to it.
pub struct FsGuard<F> {
    fs: Mutex<F>,
}

impl<F: FileSystem> FsGuard<F> {
    /// Take ownership of the filesystem.
    pub const fn new(fs: F) -> Self {
        Self { fs: Mutex::new(fs) }
    }

    /// Run `op` with exclusive access to the filesystem.
    ///
    /// Spins while another thread holds the guard. Not reentrant: calling
    /// `with_lock` again from inside `op` deadlocks. `op` must not sleep:
    /// a filesystem whose operations block on disk I/O needs a sleeping
    /// lock in place of this one.
    pub fn with_lock<R>(&self, op: impl FnOnce(&mut F) -> R) -> R {
        let mut fs = self.fs.lock();
        op(&mut fs)
    }

    /// Check whether some thread currently holds the guard.
    pub fn is_locked(&self) -> bool {
        self.fs.is_locked()
    }

    /// Give the filesystem back.
    pub fn into_inner(self) -> F {
        self.fs.into_inner()
    }
}
