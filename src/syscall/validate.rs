//! System Call Input Validation
//!
//! Every user address passes through here before the kernel reads or writes
//! through it.
//!
//! # Security Principles
//! - Validate ALL inputs before use
//! - Fail-secure: deny by default
//! - A buffer is checked over its whole length, and every page it touches is
//!   translated, before the first byte is accessed
//! - Strings are copied into kernel memory (no TOCTOU on names)

use alloc::vec::Vec;
use core::marker::PhantomData;

use crate::config::UserRegion;
use crate::mm::{KernelAddr, PageDirectory, PageFlags, VirtAddr};

use super::error::{Fault, NameError};

/// Size of one argument word on the user stack.
pub const WORD_SIZE: usize = 4;

/// How the kernel is going to touch a user page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A translated, contiguous piece of a user buffer inside one page.
#[derive(Debug, Clone, Copy)]
struct Chunk {
    addr: KernelAddr,
    len: usize,
}

/// View of one process's user memory, as seen from a system call.
pub struct UserMemory<'a> {
    page_dir: &'a dyn PageDirectory,
    region: UserRegion,
}

impl<'a> UserMemory<'a> {
    pub fn new(page_dir: &'a dyn PageDirectory, region: UserRegion) -> Self {
        Self { page_dir, region }
    }

    /// Check whether a single user address may be translated.
    #[inline]
    pub fn is_safe(&self, va: VirtAddr) -> bool {
        self.region.is_safe(va.as_usize())
    }

    /// Check whether every byte of `[base, base + len)` may be translated.
    #[inline]
    pub fn is_safe_range(&self, base: VirtAddr, len: usize) -> bool {
        self.region.is_safe_range(base.as_usize(), len)
    }

    /// Translate a user address into a kernel address.
    ///
    /// # Errors
    /// - `InvalidAddress` if the address is outside user space
    /// - `UnmappedAddress` if no user page is mapped there
    /// - `ReadOnlyAddress` if `access` is `Write` and the page is read-only
    pub fn translate(&self, va: VirtAddr, access: Access) -> Result<KernelAddr, Fault> {
        if !self.is_safe(va) {
            return Err(Fault::InvalidAddress(va));
        }

        let mapping = self
            .page_dir
            .lookup(va.align_down())
            .ok_or(Fault::UnmappedAddress(va))?;
        if !mapping.flags.contains(PageFlags::PRESENT | PageFlags::USER) {
            return Err(Fault::UnmappedAddress(va));
        }
        if access == Access::Write && !mapping.flags.contains(PageFlags::WRITABLE) {
            return Err(Fault::ReadOnlyAddress(va));
        }

        // SAFETY: page_offset() < PAGE_SIZE, so the result stays in the page
        Ok(unsafe { mapping.frame.add(va.page_offset()) })
    }

    /// Validate and translate a buffer the kernel will read from.
    pub fn buffer(&self, base: VirtAddr, len: usize) -> Result<UserBuffer<'a>, Fault> {
        let chunks = self.chunks(base, len, Access::Read)?;
        Ok(UserBuffer {
            chunks,
            len,
            _memory: PhantomData,
        })
    }

    /// Validate and translate a buffer the kernel will write into.
    pub fn buffer_mut(&self, base: VirtAddr, len: usize) -> Result<UserBufferMut<'a>, Fault> {
        let chunks = self.chunks(base, len, Access::Write)?;
        Ok(UserBufferMut {
            chunks,
            len,
            _memory: PhantomData,
        })
    }

    /// Read one little-endian argument word. The word may straddle pages.
    pub fn read_word(&self, va: VirtAddr) -> Result<u32, Fault> {
        let mut word = [0u8; WORD_SIZE];
        self.buffer(va, WORD_SIZE)?.copy_to(&mut word);
        Ok(u32::from_le_bytes(word))
    }

    /// Copy a NUL-terminated user string into the kernel.
    ///
    /// Each page the string touches is translated before it is read, and
    /// the walk never looks at more than `max_len + 1` bytes. A string with
    /// no NUL in that window comes back marked as too long; only an address
    /// fault on the way is an error.
    pub fn read_cstr(&self, va: VirtAddr, max_len: usize) -> Result<UserString, Fault> {
        if va.is_null() {
            return Err(Fault::NullPointer);
        }

        let window = max_len.saturating_add(1);
        let mut bytes = Vec::new();
        let mut cursor = va;
        loop {
            let kaddr = self.translate(cursor, Access::Read)?;
            // translate() proved cursor < kernel_split
            let span = cursor
                .bytes_to_page_end()
                .min(self.region.kernel_split() - cursor.as_usize())
                .min(window - bytes.len());

            // SAFETY: the page is mapped for user reads and span stays inside
            // both the page and user space
            let page = unsafe { core::slice::from_raw_parts(kaddr.as_ptr(), span) };
            if let Some(nul) = page.iter().position(|&b| b == 0) {
                bytes.extend_from_slice(&page[..nul]);
                return Ok(UserString {
                    bytes,
                    terminated: true,
                });
            }
            bytes.extend_from_slice(page);
            if bytes.len() == window {
                return Ok(UserString {
                    bytes,
                    terminated: false,
                });
            }
            cursor = VirtAddr::new(cursor.as_usize() + span);
        }
    }

    /// Split `[base, base + len)` into per-page kernel chunks.
    ///
    /// Nothing is returned unless every page translated.
    fn chunks(&self, base: VirtAddr, len: usize, access: Access) -> Result<Vec<Chunk>, Fault> {
        if len == 0 {
            return Ok(Vec::new());
        }
        if !self.is_safe_range(base, len) {
            let culprit = if self.is_safe(base) {
                VirtAddr::new(self.region.kernel_split())
            } else {
                base
            };
            return Err(Fault::InvalidAddress(culprit));
        }

        let mut chunks = Vec::new();
        let mut cursor = base;
        let mut remaining = len;
        while remaining > 0 {
            let span = remaining.min(cursor.bytes_to_page_end());
            let addr = self.translate(cursor, access)?;
            chunks.push(Chunk { addr, len: span });
            remaining -= span;
            // is_safe_range() proved base + len does not overflow
            cursor = VirtAddr::new(cursor.as_usize() + span);
        }
        Ok(chunks)
    }
}

/// A string copied in from user memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserString {
    bytes: Vec<u8>,
    terminated: bool,
}

impl UserString {
    /// Raw bytes copied, without the NUL.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The string as a name, if it is one.
    pub fn to_str(&self) -> Result<&str, NameError> {
        if !self.terminated {
            return Err(NameError::TooLong);
        }
        core::str::from_utf8(&self.bytes).map_err(|_| NameError::NotUtf8)
    }
}

/// A validated user-space buffer the kernel reads from.
///
/// Only constructed by [`UserMemory::buffer`], after every page of the
/// buffer was translated. The lifetime ties it to the page directory borrow.
#[derive(Debug)]
pub struct UserBuffer<'a> {
    chunks: Vec<Chunk>,
    len: usize,
    _memory: PhantomData<&'a ()>,
}

impl UserBuffer<'_> {
    /// Total length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over the buffer one page-bounded slice at a time.
    ///
    /// Contents may change underneath if another thread of the process
    /// writes to them (TOCTOU); callers that need a stable copy should use
    /// [`Self::to_vec`].
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.chunks.iter().map(|chunk| {
            // SAFETY:
            // - chunk.addr was translated from a mapped, user-readable page
            // - chunk.len stays within that page
            // - the page directory is borrowed for 'a, keeping the page mapped
            unsafe { core::slice::from_raw_parts(chunk.addr.as_ptr(), chunk.len) }
        })
    }

    /// Copy the start of the buffer into `dst`; returns bytes copied.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        for src in self.chunks() {
            if copied == dst.len() {
                break;
            }
            let n = src.len().min(dst.len() - copied);
            dst[copied..copied + n].copy_from_slice(&src[..n]);
            copied += n;
        }
        copied
    }

    /// Copy the whole buffer into kernel memory.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for chunk in self.chunks() {
            out.extend_from_slice(chunk);
        }
        out
    }
}

/// A validated user-space buffer the kernel writes into.
///
/// Only constructed by [`UserMemory::buffer_mut`], after every page of the
/// buffer was translated with write access.
#[derive(Debug)]
pub struct UserBufferMut<'a> {
    chunks: Vec<Chunk>,
    len: usize,
    _memory: PhantomData<&'a mut ()>,
}

impl UserBufferMut<'_> {
    /// Total length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of page-bounded pieces.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Borrow one piece mutably.
    ///
    /// Pieces are handed out one at a time: two user pages may share a
    /// frame, so two live `&mut` slices could alias.
    pub fn chunk_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let chunk = self.chunks.get(index)?;
        // SAFETY:
        // - chunk.addr was translated from a mapped, user-writable page
        // - chunk.len stays within that page
        // - &mut self ensures no other slice of this buffer is live
        Some(unsafe { core::slice::from_raw_parts_mut(chunk.addr.as_mut_ptr(), chunk.len) })
    }

    /// Copy `src` into the start of the buffer; returns bytes copied.
    pub fn fill_from(&mut self, src: &[u8]) -> usize {
        let mut copied = 0;
        for index in 0..self.chunk_count() {
            if copied == src.len() {
                break;
            }
            let Some(dst) = self.chunk_mut(index) else {
                break;
            };
            let n = dst.len().min(src.len() - copied);
            dst[..n].copy_from_slice(&src[copied..copied + n]);
            copied += n;
        }
        copied
    }
}
