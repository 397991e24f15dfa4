//! User and Kernel Address Types
//!
//! Type-safe wrappers that keep user-supplied addresses apart from
//! addresses the kernel may dereference.
//!
//! # Security Properties
//! - A [`VirtAddr`] is only a number; it can never be turned into a pointer
//! - A [`KernelAddr`] is only produced by translating through a page
//!   directory, and dereferencing it still requires `unsafe`

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// A user virtual address, as passed in by a user program.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Wrap a raw user address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check for the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Align the address down to the start of its page.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Bytes from this address to the end of its page.
    #[inline]
    pub const fn bytes_to_page_end(self) -> usize {
        PAGE_SIZE - self.page_offset()
    }

    /// Add an offset, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A kernel-accessible address obtained by translating a [`VirtAddr`].
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct KernelAddr(*mut u8);

impl KernelAddr {
    /// Wrap a kernel pointer.
    #[inline]
    pub const fn new(ptr: *mut u8) -> Self {
        Self(ptr)
    }

    /// Offset within the same mapping.
    ///
    /// # Safety
    /// The result must stay inside the page this address was translated from.
    #[inline]
    pub const unsafe fn add(self, offset: usize) -> Self {
        // SAFETY: caller keeps the offset inside the mapped page
        Self(unsafe { self.0.add(offset) })
    }

    /// Convert to a raw pointer.
    #[inline]
    pub const fn as_ptr(self) -> *const u8 {
        self.0 as *const u8
    }

    /// Convert to a mutable raw pointer.
    #[inline]
    pub const fn as_mut_ptr(self) -> *mut u8 {
        self.0
    }
}

impl fmt::Debug for KernelAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KernelAddr({:p})", self.0)
    }
}
