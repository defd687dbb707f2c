//! Strongly typed addresses for a 32-bit protected-mode kernel.
//!
//! Physical and virtual addresses live in two different worlds once paging is
//! enabled, and mixing them up is one of the easiest ways to corrupt a
//! kernel. This crate wraps both in dedicated newtypes, together with the
//! page-frame abstraction built on top of physical addresses, so that the
//! compiler catches the mix-ups instead of the machine.
#![cfg_attr(not(test), no_std)]

pub mod frame;
pub mod phys;
pub mod virt;

/// The size of a page, in bytes. The kernel only uses 4 KiB pages, large
/// pages are deliberately unsupported to keep the paging code simple.
pub const PAGE_SIZE: usize = 4096;

/// The number of low bits of an address that address a byte within a page.
pub const PAGE_SHIFT: u32 = 12;
