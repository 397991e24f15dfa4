//! System Call Table
//!
//! Maps call numbers to handlers. Each entry declares its argument kinds, so
//! the dispatcher can check arity and validate pointers before any handler
//! runs.

use core::fmt;

use crate::fs::FileSystem;

use super::args::MAX_ARGS;
use super::handler::{self, Handler};

/// System call numbers, fixed by the user-space runtime.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallNumber {
    Halt = 0,
    Exit = 1,
    Exec = 2,
    Wait = 3,
    Create = 4,
    Remove = 5,
    Open = 6,
    Filesize = 7,
    Read = 8,
    Write = 9,
    Seek = 10,
    Tell = 11,
    Close = 12,
}

impl SyscallNumber {
    /// Number of defined calls.
    pub const COUNT: usize = 13;

    const ALL: [Self; Self::COUNT] = [
        Self::Halt,
        Self::Exit,
        Self::Exec,
        Self::Wait,
        Self::Create,
        Self::Remove,
        Self::Open,
        Self::Filesize,
        Self::Read,
        Self::Write,
        Self::Seek,
        Self::Tell,
        Self::Close,
    ];

    /// Decode a raw call number.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }
}

/// What an argument word means, and how to validate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Plain integer: status, size, position, pid.
    Word,
    /// File descriptor number.
    Fd,
    /// Pointer to a NUL-terminated string, copied into the kernel.
    Str,
    /// Pointer to a buffer the kernel reads; length is argument `len`.
    InBuf { len: usize },
    /// Pointer to a buffer the kernel writes; length is argument `len`.
    OutBuf { len: usize },
}

/// One row of the call table.
pub struct SyscallEntry<F: FileSystem> {
    pub number: SyscallNumber,
    pub name: &'static str,
    pub args: &'static [ArgKind],
    pub handler: Handler<F>,
}

impl<F: FileSystem> SyscallEntry<F> {
    /// Number of argument words the call takes.
    #[inline]
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl<F: FileSystem> fmt::Debug for SyscallEntry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyscallEntry")
            .field("number", &self.number)
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

/// All calls, indexed by number.
pub struct SyscallTable<F: FileSystem> {
    entries: [SyscallEntry<F>; SyscallNumber::COUNT],
}

impl<F: FileSystem> SyscallTable<F> {
    /// Build the table.
    pub fn new() -> Self {
        use ArgKind::*;
        use SyscallNumber as N;

        let table = Self {
            entries: [
                entry(N::Halt, "halt", &[], handler::sys_halt),
                entry(N::Exit, "exit", &[Word], handler::sys_exit),
                entry(N::Exec, "exec", &[Str], handler::sys_exec),
                entry(N::Wait, "wait", &[Word], handler::sys_wait),
                entry(N::Create, "create", &[Str, Word], handler::sys_create),
                entry(N::Remove, "remove", &[Str], handler::sys_remove),
                entry(N::Open, "open", &[Str], handler::sys_open),
                entry(N::Filesize, "filesize", &[Fd], handler::sys_filesize),
                entry(N::Read, "read", &[Fd, OutBuf { len: 2 }, Word], handler::sys_read),
                entry(N::Write, "write", &[Fd, InBuf { len: 2 }, Word], handler::sys_write),
                entry(N::Seek, "seek", &[Fd, Word], handler::sys_seek),
                entry(N::Tell, "tell", &[Fd], handler::sys_tell),
                entry(N::Close, "close", &[Fd], handler::sys_close),
            ],
        };
        debug_assert!(table.is_consistent());
        table
    }

    /// Find the entry for a raw call number.
    pub fn lookup(&self, raw: u32) -> Option<&SyscallEntry<F>> {
        let number = SyscallNumber::from_raw(raw)?;
        self.entries.get(number as usize)
    }

    /// Entries are in number order, arities fit, and buffer lengths point
    /// at `Word` arguments.
    fn is_consistent(&self) -> bool {
        self.entries.iter().enumerate().all(|(i, e)| {
            e.number as usize == i
                && e.arity() <= MAX_ARGS
                && e.args.iter().all(|kind| match *kind {
                    ArgKind::InBuf { len } | ArgKind::OutBuf { len } => {
                        e.args.get(len) == Some(&ArgKind::Word)
                    }
                    _ => true,
                })
        })
    }
}

fn entry<F: FileSystem>(
    number: SyscallNumber,
    name: &'static str,
    args: &'static [ArgKind],
    handler: Handler<F>,
) -> SyscallEntry<F> {
    SyscallEntry {
        number,
        name,
        args,
        handler,
    }
}

impl<F: FileSystem> Default for SyscallTable<F> {
    fn default() -> Self {
        Self::new()
    }
}
