//! Kernel Configuration
//!
//! Address-space layout and limits used by the system-call layer.
//!
//! # Memory Layout (32-bit user processes)
//! ```text
//! 0x0000_0000 ┌──────────────────────┐
//!             │  unmapped / null     │  never valid
//! 0x0804_8000 ├──────────────────────┤  USER_BASE
//!             │  code, data, heap    │
//!             │        ...           │
//!             │  user stack          │
//! 0xC000_0000 ├──────────────────────┤  KERNEL_SPLIT
//!             │  kernel              │  never valid from a syscall
//! 0xFFFF_FFFF └──────────────────────┘
//! ```

use crate::mm::PAGE_SIZE;

/// Default user-space boundaries.
pub mod regions {
    /// Lowest address a user program may hand to the kernel.
    pub const USER_BASE: usize = 0x0804_8000;
    /// First kernel address; everything at or above it is off limits.
    pub const KERNEL_SPLIT: usize = 0xC000_0000;
}

/// Interrupt vector reserved for system calls.
pub const SYSCALL_VECTOR: u8 = 0x30;

/// The half-open interval `[user_base, kernel_split)` of addresses that
/// user programs may pass to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserRegion {
    user_base: usize,
    kernel_split: usize,
}

impl UserRegion {
    /// Create a region. Returns `None` unless `0 < user_base < kernel_split`.
    pub const fn new(user_base: usize, kernel_split: usize) -> Option<Self> {
        if user_base == 0 || user_base >= kernel_split {
            return None;
        }
        Some(Self {
            user_base,
            kernel_split,
        })
    }

    /// Lowest permitted user address.
    #[inline]
    pub const fn user_base(&self) -> usize {
        self.user_base
    }

    /// First address past user space.
    #[inline]
    pub const fn kernel_split(&self) -> usize {
        self.kernel_split
    }

    /// Check whether a single user address may be translated.
    ///
    /// Null, below `user_base`, and at or above `kernel_split` are unsafe.
    #[inline]
    pub const fn is_safe(&self, addr: usize) -> bool {
        addr != 0 && addr >= self.user_base && addr < self.kernel_split
    }

    /// Check that every byte of `[base, base + len)` is safe.
    ///
    /// The region is a single interval, so the range is safe exactly when
    /// its first byte is safe and its end does not pass `kernel_split`.
    /// An empty range is safe.
    pub const fn is_safe_range(&self, base: usize, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        if !self.is_safe(base) {
            return false;
        }
        match base.checked_add(len) {
            Some(end) => end <= self.kernel_split,
            None => false,
        }
    }
}

impl Default for UserRegion {
    fn default() -> Self {
        Self {
            user_base: regions::USER_BASE,
            kernel_split: regions::KERNEL_SPLIT,
        }
    }
}

/// Tunables for a [`crate::Kernel`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Addresses user programs may pass in.
    pub region: UserRegion,
    /// Longest string (excluding the NUL) accepted from user space.
    pub max_string_len: usize,
    /// Vector number the trap entry treats as a system call.
    pub syscall_vector: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: UserRegion::default(),
            max_string_len: PAGE_SIZE,
            syscall_vector: SYSCALL_VECTOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let region = UserRegion::default();
        assert!(!region.is_safe(0));
        assert!(!region.is_safe(regions::USER_BASE - 1));
        assert!(region.is_safe(regions::USER_BASE));
        assert!(region.is_safe(regions::KERNEL_SPLIT - 1));
        assert!(!region.is_safe(regions::KERNEL_SPLIT));
        assert!(!region.is_safe(usize::MAX));
    }

    #[test]
    fn test_range_crossing_split() {
        let region = UserRegion::default();
        let base = regions::KERNEL_SPLIT - 4;
        assert!(region.is_safe_range(base, 4));
        assert!(!region.is_safe_range(base, 5));
    }

    #[test]
    fn test_range_edge_cases() {
        let region = UserRegion::default();
        // Empty ranges never touch memory.
        assert!(region.is_safe_range(0, 0));
        assert!(!region.is_safe_range(0, 1));
        assert!(!region.is_safe_range(regions::USER_BASE, usize::MAX));
    }

    #[test]
    fn test_invalid_region() {
        assert!(UserRegion::new(0, 0x1000).is_none());
        assert!(UserRegion::new(0x2000, 0x1000).is_none());
        assert!(UserRegion::new(0x1000, 0x2000).is_some());
    }
}
