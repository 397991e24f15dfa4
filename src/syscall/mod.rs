//! System Call Interface
//!
//! The boundary between user programs and the kernel.
//!
//! # Security Model
//! - Whitelist approach: only calls in the call table are accepted
//! - All parameters are validated before use
//! - Invalid pointers terminate the caller; they are never dereferenced
//! - Recoverable failures (missing file, bad fd, unusable name) return -1 or 0
//!
//! # Flow of one call
//! 1. Read the call number at the user stack pointer
//! 2. Read as many argument words as the call declares
//! 3. Validate and translate string and buffer arguments
//! 4. Run the handler, under the filesystem guard where needed
//! 5. Store the result in `eax`, or terminate the caller

mod args;
mod error;
mod handler;
mod table;
mod validate;

pub use args::{Arg, Args, RawArgs, TrapStack, MAX_ARGS};
pub use error::{Fault, NameError, EXIT_FAULT};
pub use handler::{Call, Disposition, Handler, Reply};
pub use table::{ArgKind, SyscallEntry, SyscallNumber, SyscallTable};
pub use validate::{Access, UserBuffer, UserBufferMut, UserMemory, UserString, WORD_SIZE};
