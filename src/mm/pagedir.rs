//! Per-process Page Directory Lookup
//!
//! The system-call layer never walks page tables itself. It asks the
//! owning process's page directory for the kernel mapping of one user page
//! and checks the attributes it gets back.

use bitflags::bitflags;

use super::address::{KernelAddr, VirtAddr};

bitflags! {
    /// Attributes of a user page mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        /// The page is mapped.
        const PRESENT = 1 << 0;
        /// The page may be written.
        const WRITABLE = 1 << 1;
        /// The page is accessible from user mode.
        const USER = 1 << 2;
    }
}

/// Result of a successful page lookup.
#[derive(Debug, Clone, Copy)]
pub struct Mapping {
    /// Kernel address of the first byte of the page.
    pub frame: KernelAddr,
    /// Page attributes.
    pub flags: PageFlags,
}

/// Page-table lookup for one process.
///
/// # Safety
/// Implementors guarantee that for every `Mapping` returned with
/// [`PageFlags::PRESENT`] set, `frame` points to [`super::PAGE_SIZE`] bytes
/// that stay valid for reads (and for writes when
/// [`PageFlags::WRITABLE`] is set) for as long as the directory is borrowed,
/// and that nothing else holds a Rust reference to those bytes meanwhile.
pub unsafe trait PageDirectory {
    /// Look up the page containing `page`. `page` is page-aligned.
    ///
    /// Returns `None` if nothing is mapped there.
    fn lookup(&self, page: VirtAddr) -> Option<Mapping>;
}
