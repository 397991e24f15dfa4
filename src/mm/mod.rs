//! Memory management interface for the system-call layer
//!
//! Provides:
//! - Typed user and kernel addresses
//! - The per-process page directory lookup used for translation
//!
//! # Security Principles
//! - User addresses are plain numbers until translated
//! - Translation always goes through the owning process's page directory

mod address;
mod pagedir;

pub use address::{KernelAddr, VirtAddr, PAGE_MASK, PAGE_SIZE};
pub use pagedir::{Mapping, PageDirectory, PageFlags};
