//! User Processes
//!
//! The kernel-side record of a user process as far as system calls are
//! concerned: identity, address space, open files, and exit status.
//! Creating, scheduling and reaping processes is the job of a
//! [`ProcessManager`] outside this crate.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use crate::fs::{FdTable, FileSystem, FsGuard};
use crate::mm::PageDirectory;

/// Process identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct Pid(i32);

impl Pid {
    #[inline]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process creation and reaping, provided by the rest of the kernel.
pub trait ProcessManager<F: FileSystem>: Send + Sync {
    /// Start a process running `cmd_line`.
    ///
    /// Loading the executable reads the filesystem; the implementation must
    /// do that inside `fs.with_lock`. Returns `None` if the process could not
    /// be created or loaded.
    fn execute(&self, cmd_line: &str, fs: &FsGuard<F>) -> Option<Pid>;

    /// Block until `child` exits and return its status.
    ///
    /// `None` if `child` is not a child of `parent` or was already waited on.
    fn wait(&self, parent: Pid, child: Pid) -> Option<i32>;
}

/// A user process, as seen by the system-call layer.
pub struct Process<F: FileSystem> {
    pid: Pid,
    name: String,
    page_dir: Box<dyn PageDirectory + Send>,
    fds: FdTable<F>,
    exit_status: Option<i32>,
}

impl<F: FileSystem> Process<F> {
    /// Create the record for a freshly loaded process.
    pub fn new(
        pid: Pid,
        name: impl Into<String>,
        page_dir: Box<dyn PageDirectory + Send>,
        fs: Arc<FsGuard<F>>,
    ) -> Self {
        Self {
            pid,
            name: name.into(),
            page_dir,
            fds: FdTable::new(pid, fs),
            exit_status: None,
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn fds(&self) -> &FdTable<F> {
        &self.fds
    }

    /// Status recorded by `exit` or a fault, once the process is done.
    #[inline]
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    #[inline]
    pub fn has_exited(&self) -> bool {
        self.exit_status.is_some()
    }

    /// Record the exit status and close every open file.
    pub(crate) fn finish(&mut self, status: i32) {
        self.exit_status = Some(status);
        self.fds.drain_on_exit();
    }

    /// Borrow the pieces a system call needs, separately.
    pub(crate) fn parts(&mut self) -> ProcessParts<'_, F> {
        ProcessParts {
            pid: self.pid,
            page_dir: &*self.page_dir,
            fds: &mut self.fds,
        }
    }
}

impl<F: FileSystem> fmt::Debug for Process<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("fds", &self.fds)
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

/// Disjoint borrows of a [`Process`].
pub(crate) struct ProcessParts<'p, F: FileSystem> {
    pub pid: Pid,
    pub page_dir: &'p dyn PageDirectory,
    pub fds: &'p mut FdTable<F>,
}

/// The two lines printed when a process terminates.
pub fn exit_message(name: &str, status: i32) -> [String; 2] {
    [
        alloc::format!("{}: exit({})\n", name, status),
        alloc::format!("Execution of '{}' complete.\n", name),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemFs, TestAddressSpace};

    #[test]
    fn test_exit_message() {
        let [first, second] = exit_message("proc", 7);
        assert_eq!(first, "proc: exit(7)\n");
        assert_eq!(second, "Execution of 'proc' complete.\n");
    }

    #[test]
    fn test_finish_closes_files() {
        let fs = Arc::new(FsGuard::new(MemFs::new()));
        fs.with_lock(|fs| fs.create("f", 0));
        let mut process = Process::new(
            Pid::new(1),
            "p",
            Box::new(TestAddressSpace::new()),
            Arc::clone(&fs),
        );
        let file = fs.with_lock(|fs| fs.open("f")).unwrap();
        assert!(process.parts().fds.allocate(file).is_ok());

        assert!(!process.has_exited());
        process.finish(3);
        assert_eq!(process.exit_status(), Some(3));
        assert!(process.fds().is_empty());
        assert_eq!(fs.with_lock(|fs| fs.open_count()), 0);
    }
}
