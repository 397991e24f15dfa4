//! System Call Handler
//!
//! Dispatches system calls and implements individual syscall handlers.
//!
//! # Security Considerations
//! - Call numbers are looked up in the call table; unknown numbers fault
//! - Arguments are read and every pointer validated before a handler runs
//! - A fault at any stage terminates the caller; nothing partial happens
//! - Filesystem work runs inside the filesystem guard, console I/O does not

use log::{debug, info, trace, warn};

use crate::exception::InterruptFrame;
use crate::fs::{Fd, FdTable, FileSystem, OpenFile};
use crate::mm::VirtAddr;
use crate::process::{exit_message, Pid, Process, ProcessParts};
use crate::Kernel;

use super::args::{Args, TrapStack};
use super::error::{Fault, NameError, EXIT_FAULT};
use super::validate::{UserBuffer, UserBufferMut, UserMemory};

/// Value returned to user space for failed calls.
const FAILED: i32 = -1;

/// Signature of a call handler.
pub type Handler<F> = fn(&mut Call<'_, F>) -> Result<Reply, Fault>;

/// What a handler wants done once it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Store the value in the return register.
    Value(i32),
    /// Leave the return register alone.
    Void,
    /// Terminate the caller with this status.
    Exit(i32),
    /// The machine was powered off.
    Halt,
}

/// What happened to the trapping process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Return to user mode.
    Resume,
    /// The process is finished; its files are closed. Never resume it.
    Exited(i32),
    /// The machine was powered off.
    Halted,
    /// The trap was not a system call from user mode.
    Unhandled,
}

/// Everything a handler may touch during one call.
pub struct Call<'a, F: FileSystem> {
    kernel: &'a Kernel<F>,
    pid: Pid,
    fds: &'a mut FdTable<F>,
    args: Args<'a>,
}

impl<F: FileSystem> Kernel<F> {
    /// Run the system call described by `frame` on behalf of `process`.
    ///
    /// A process that has already exited is never run again.
    pub fn dispatch(&self, process: &mut Process<F>, frame: &mut InterruptFrame) -> Disposition {
        if let Some(status) = process.exit_status() {
            warn!("[SYSCALL] {}: trap after exit ignored", process.name());
            return Disposition::Exited(status);
        }

        match self.run(process, frame) {
            Ok(Reply::Value(value)) => {
                frame.set_return(value);
                Disposition::Resume
            }
            Ok(Reply::Void) => Disposition::Resume,
            Ok(Reply::Exit(status)) => self.terminate(process, status),
            Ok(Reply::Halt) => Disposition::Halted,
            Err(fault) => {
                warn!("[SYSCALL] {}: {}, killing process", process.name(), fault);
                self.terminate(process, EXIT_FAULT)
            }
        }
    }

    /// Decode, validate and execute one call.
    fn run(&self, process: &mut Process<F>, frame: &InterruptFrame) -> Result<Reply, Fault> {
        let ProcessParts { pid, page_dir, fds } = process.parts();
        let memory = UserMemory::new(page_dir, self.config().region);

        let stack = TrapStack::new(&memory, VirtAddr::new(frame.esp as usize))?;
        let entry = self
            .table
            .lookup(stack.number())
            .ok_or(Fault::UnknownSyscall(stack.number()))?;
        let raw = stack.read_args(entry.arity())?;
        trace!("[SYSCALL] pid {}: {}{:?}", pid, entry.name, raw.as_slice());

        let args = Args::decode(&memory, entry.args, &raw, self.config().max_string_len)?;
        let mut call = Call {
            kernel: self,
            pid,
            fds,
            args,
        };
        (entry.handler)(&mut call)
    }

    /// Print the exit lines, record the status and close every file.
    fn terminate(&self, process: &mut Process<F>, status: i32) -> Disposition {
        for line in exit_message(process.name(), status) {
            self.devices.console.write(line.as_bytes());
        }
        debug!(
            "[PROCESS] pid {} ({}) exited with status {}",
            process.pid(),
            process.name(),
            status
        );
        process.finish(status);
        Disposition::Exited(status)
    }
}

/// Power off the machine.
pub(super) fn sys_halt<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    info!("[SYSCALL] pid {}: halt", call.pid);
    call.kernel.devices.power.power_off();
    Ok(Reply::Halt)
}

/// Terminate the caller with the given status.
pub(super) fn sys_exit<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    Ok(Reply::Exit(call.args.int(0)?))
}

/// Start a child process; its pid, or -1.
pub(super) fn sys_exec<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    let cmd_line = match call.args.name(0)?.to_str() {
        Ok(cmd_line) => cmd_line,
        Err(e) => return Ok(bad_name(call.pid, "exec", e, FAILED)),
    };
    let kernel = call.kernel;
    match kernel.processes.execute(cmd_line, &kernel.fs) {
        Some(child) => {
            debug!("[SYSCALL] pid {}: exec {:?} -> pid {}", call.pid, cmd_line, child);
            Ok(Reply::Value(child.as_i32()))
        }
        None => {
            debug!("[SYSCALL] pid {}: exec {:?} failed", call.pid, cmd_line);
            Ok(Reply::Value(FAILED))
        }
    }
}

/// Wait for a child; its exit status, or -1.
pub(super) fn sys_wait<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    let child = Pid::new(call.args.int(0)?);
    let status = call.kernel.processes.wait(call.pid, child);
    Ok(Reply::Value(status.unwrap_or(FAILED)))
}

/// Create a file; 1 on success, 0 on failure.
pub(super) fn sys_create<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    let name = match call.args.name(0)?.to_str() {
        Ok(name) => name,
        Err(e) => return Ok(bad_name(call.pid, "create", e, 0)),
    };
    let initial_size = call.args.word(1)?;
    let created = call.kernel.fs.with_lock(|fs| fs.create(name, initial_size));
    Ok(Reply::Value(created as i32))
}

/// Remove a file; 1 on success, 0 on failure.
pub(super) fn sys_remove<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    let name = match call.args.name(0)?.to_str() {
        Ok(name) => name,
        Err(e) => return Ok(bad_name(call.pid, "remove", e, 0)),
    };
    let removed = call.kernel.fs.with_lock(|fs| fs.remove(name));
    Ok(Reply::Value(removed as i32))
}

/// Open a file; the new descriptor, or -1.
pub(super) fn sys_open<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    let name = match call.args.name(0)?.to_str() {
        Ok(name) => name,
        Err(e) => return Ok(bad_name(call.pid, "open", e, FAILED)),
    };
    let fs = &call.kernel.fs;
    let Some(file) = fs.with_lock(|fs| fs.open(name)) else {
        debug!("[SYSCALL] pid {}: open {:?}: no such file", call.pid, name);
        return Ok(Reply::Value(FAILED));
    };

    match call.fds.allocate(file) {
        Ok(fd) => Ok(Reply::Value(fd.as_i32())),
        Err((e, file)) => {
            warn!("[SYSCALL] pid {}: open {:?}: {}", call.pid, name, e);
            if let Err(e) = fs.with_lock(|_| file.close()) {
                warn!("[SYSCALL] pid {}: open {:?}: {}", call.pid, name, e);
            }
            Ok(Reply::Value(FAILED))
        }
    }
}

/// Size of an open file in bytes, or -1.
pub(super) fn sys_filesize<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    let fd = call.args.fd(0)?;
    let length = match call.fds.lookup(fd) {
        Ok(desc) => call.kernel.fs.with_lock(|_| desc.file().length() as i32),
        Err(e) => {
            debug!("[SYSCALL] pid {}: filesize({}): {}", call.pid, fd, e);
            FAILED
        }
    };
    Ok(Reply::Value(length))
}

/// Read from stdin or a file into a user buffer; bytes read, or -1.
pub(super) fn sys_read<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    let fd = call.args.fd(0)?;
    let kernel = call.kernel;
    let buf = call.args.buffer_mut(1)?;
    let Ok(len) = i32::try_from(buf.len()) else {
        debug!("[SYSCALL] pid {}: read of {} bytes refused", call.pid, buf.len());
        return Ok(Reply::Value(FAILED));
    };

    if fd == Fd::STDIN {
        let input = &kernel.devices.input;
        for index in 0..buf.chunk_count() {
            if let Some(chunk) = buf.chunk_mut(index) {
                chunk.iter_mut().for_each(|byte| *byte = input.read_byte());
            }
        }
        return Ok(Reply::Value(len));
    }

    let desc = match call.fds.lookup_mut(fd) {
        Ok(desc) => desc,
        Err(e) => {
            debug!("[SYSCALL] pid {}: read({}): {}", call.pid, fd, e);
            return Ok(Reply::Value(FAILED));
        }
    };
    let read = kernel.fs.with_lock(|_| read_file(desc.file_mut(), buf));
    Ok(Reply::Value(i32::try_from(read).unwrap_or(len)))
}

/// Write a user buffer to stdout or a file; bytes written, or -1.
pub(super) fn sys_write<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    let fd = call.args.fd(0)?;
    let kernel = call.kernel;
    let buf = call.args.buffer(1)?;
    let Ok(len) = i32::try_from(buf.len()) else {
        debug!("[SYSCALL] pid {}: write of {} bytes refused", call.pid, buf.len());
        return Ok(Reply::Value(FAILED));
    };

    if fd == Fd::STDOUT {
        if !buf.is_empty() {
            kernel.devices.console.write(&buf.to_vec());
        }
        return Ok(Reply::Value(len));
    }

    let desc = match call.fds.lookup_mut(fd) {
        Ok(desc) => desc,
        Err(e) => {
            debug!("[SYSCALL] pid {}: write({}): {}", call.pid, fd, e);
            return Ok(Reply::Value(FAILED));
        }
    };
    let written = kernel.fs.with_lock(|_| write_file(desc.file_mut(), buf));
    Ok(Reply::Value(i32::try_from(written).unwrap_or(len)))
}

/// Move a file's cursor. Unknown descriptors are ignored.
pub(super) fn sys_seek<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    let fd = call.args.fd(0)?;
    let position = call.args.word(1)?;
    match call.fds.lookup_mut(fd) {
        Ok(desc) => call.kernel.fs.with_lock(|_| desc.file_mut().seek(position)),
        Err(e) => debug!("[SYSCALL] pid {}: seek({}): {}", call.pid, fd, e),
    }
    Ok(Reply::Void)
}

/// A file's cursor position, or -1.
pub(super) fn sys_tell<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    let fd = call.args.fd(0)?;
    let position = match call.fds.lookup(fd) {
        Ok(desc) => call.kernel.fs.with_lock(|_| desc.file().tell() as i32),
        Err(e) => {
            debug!("[SYSCALL] pid {}: tell({}): {}", call.pid, fd, e);
            FAILED
        }
    };
    Ok(Reply::Value(position))
}

/// Close a descriptor. Unknown descriptors are ignored.
pub(super) fn sys_close<F: FileSystem>(call: &mut Call<'_, F>) -> Result<Reply, Fault> {
    let fd = call.args.fd(0)?;
    if let Err(e) = call.fds.release(fd) {
        debug!("[SYSCALL] pid {}: close({}): {}", call.pid, fd, e);
    }
    Ok(Reply::Void)
}

/// Reply for a name argument that was readable but names nothing.
fn bad_name(pid: Pid, call: &str, e: NameError, failed: i32) -> Reply {
    debug!("[SYSCALL] pid {}: {}: {}", pid, call, e);
    Reply::Value(failed)
}

/// Fill `buf` from the file, stopping at end of file.
fn read_file(file: &mut impl OpenFile, buf: &mut UserBufferMut<'_>) -> usize {
    let mut total = 0;
    for index in 0..buf.chunk_count() {
        let Some(chunk) = buf.chunk_mut(index) else {
            break;
        };
        let n = file.read(chunk);
        total += n;
        if n < chunk.len() {
            break;
        }
    }
    total
}

/// Write `buf` to the file, stopping when the file stops accepting bytes.
fn write_file(file: &mut impl OpenFile, buf: &UserBuffer<'_>) -> usize {
    let mut total = 0;
    for chunk in buf.chunks() {
        let n = file.write(chunk);
        total += n;
        if n < chunk.len() {
            break;
        }
    }
    total
}
