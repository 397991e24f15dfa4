//! Argument Marshalling
//!
//! The user program pushes the call number and then its arguments, one word
//! each, so at trap time the stack looks like:
//!
//! ```text
//! esp + 12  │ arg 2  │
//! esp +  8  │ arg 1  │
//! esp +  4  │ arg 0  │
//! esp       │ number │
//! ```
//!
//! [`TrapStack`] is the only way to reach those words. Each slot address is
//! computed with checked arithmetic and validated before it is read.

use alloc::vec::Vec;

use crate::fs::Fd;
use crate::mm::VirtAddr;

use super::error::Fault;
use super::table::ArgKind;
use super::validate::{UserBuffer, UserBufferMut, UserMemory, UserString, WORD_SIZE};

/// Most arguments any call takes.
pub const MAX_ARGS: usize = 3;

/// Raw argument words, exactly as many as the call declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawArgs {
    words: [u32; MAX_ARGS],
    count: usize,
}

impl RawArgs {
    /// The words that were read.
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.words[..self.count]
    }

    /// Word `index`, if it was read.
    #[inline]
    pub fn get(&self, index: usize) -> Option<u32> {
        self.as_slice().get(index).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Bounds-checked accessor over a trapped user stack.
pub struct TrapStack<'m, 'a> {
    memory: &'m UserMemory<'a>,
    esp: VirtAddr,
    number: u32,
}

impl<'m, 'a> TrapStack<'m, 'a> {
    /// Validate the stack pointer and read the call number at it.
    pub fn new(memory: &'m UserMemory<'a>, esp: VirtAddr) -> Result<Self, Fault> {
        let number = memory.read_word(esp)?;
        Ok(Self {
            memory,
            esp,
            number,
        })
    }

    /// The call number found at the stack pointer.
    #[inline]
    pub fn number(&self) -> u32 {
        self.number
    }

    /// User address of argument slot `index`.
    pub fn slot(&self, index: usize) -> Result<VirtAddr, Fault> {
        index
            .checked_add(1)
            .and_then(|n| n.checked_mul(WORD_SIZE))
            .and_then(|offset| self.esp.checked_add(offset))
            .ok_or(Fault::InvalidAddress(self.esp))
    }

    /// Read `count` argument words.
    ///
    /// Either every slot validates and all words are returned, or the first
    /// bad slot's fault is returned and nothing else.
    pub fn read_args(&self, count: usize) -> Result<RawArgs, Fault> {
        if count > MAX_ARGS {
            return Err(Fault::BadArgument(MAX_ARGS));
        }

        let mut words = [0u32; MAX_ARGS];
        for (index, word) in words.iter_mut().enumerate().take(count) {
            *word = self.memory.read_word(self.slot(index)?)?;
        }
        Ok(RawArgs { words, count })
    }
}

/// One decoded argument, already validated for its kind.
#[derive(Debug)]
pub enum Arg<'a> {
    Word(u32),
    Fd(Fd),
    Str(UserString),
    In(UserBuffer<'a>),
    Out(UserBufferMut<'a>),
}

/// Decoded arguments of one call.
#[derive(Debug)]
pub struct Args<'a> {
    args: Vec<Arg<'a>>,
}

impl<'a> Args<'a> {
    /// Validate and decode `raw` according to `kinds`.
    ///
    /// Strings are copied in, buffers are checked over their full length and
    /// translated. Any fault aborts the whole decode. A string that was
    /// readable but is no usable name is not a fault; the handler decides.
    pub fn decode(
        memory: &UserMemory<'a>,
        kinds: &[ArgKind],
        raw: &RawArgs,
        max_string_len: usize,
    ) -> Result<Self, Fault> {
        let word = |index: usize| raw.get(index).ok_or(Fault::BadArgument(index));

        let mut args = Vec::with_capacity(kinds.len());
        for (index, kind) in kinds.iter().enumerate() {
            let value = word(index)?;
            let arg = match *kind {
                ArgKind::Word => Arg::Word(value),
                ArgKind::Fd => Arg::Fd(Fd::new(value as i32)),
                ArgKind::Str => {
                    Arg::Str(memory.read_cstr(VirtAddr::new(value as usize), max_string_len)?)
                }
                ArgKind::InBuf { len } => {
                    Arg::In(memory.buffer(VirtAddr::new(value as usize), word(len)? as usize)?)
                }
                ArgKind::OutBuf { len } => {
                    Arg::Out(memory.buffer_mut(VirtAddr::new(value as usize), word(len)? as usize)?)
                }
            };
            args.push(arg);
        }
        Ok(Self { args })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument `index` as an unsigned word.
    pub fn word(&self, index: usize) -> Result<u32, Fault> {
        match self.args.get(index) {
            Some(Arg::Word(value)) => Ok(*value),
            _ => Err(Fault::BadArgument(index)),
        }
    }

    /// Argument `index` as a signed integer.
    pub fn int(&self, index: usize) -> Result<i32, Fault> {
        self.word(index).map(|value| value as i32)
    }

    pub fn fd(&self, index: usize) -> Result<Fd, Fault> {
        match self.args.get(index) {
            Some(Arg::Fd(fd)) => Ok(*fd),
            _ => Err(Fault::BadArgument(index)),
        }
    }

    /// Argument `index` as a copied-in string.
    pub fn name(&self, index: usize) -> Result<&UserString, Fault> {
        match self.args.get(index) {
            Some(Arg::Str(s)) => Ok(s),
            _ => Err(Fault::BadArgument(index)),
        }
    }

    pub fn buffer(&self, index: usize) -> Result<&UserBuffer<'a>, Fault> {
        match self.args.get(index) {
            Some(Arg::In(buf)) => Ok(buf),
            _ => Err(Fault::BadArgument(index)),
        }
    }

    pub fn buffer_mut(&mut self, index: usize) -> Result<&mut UserBufferMut<'a>, Fault> {
        match self.args.get_mut(index) {
            Some(Arg::Out(buf)) => Ok(buf),
            _ => Err(Fault::BadArgument(index)),
        }
    }
}
