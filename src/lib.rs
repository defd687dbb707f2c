//! The memory-management and scheduling core of the Ferrite kernel: a
//! bitmap-based physical page allocator, a two-level paging virtual memory
//! manager, a preemptive round-robin scheduler and a minimal ELF32 program
//! loader.
//!
//! Hardware integration (interrupt dispatch, the trap-return path, serial
//! output, the boot protocol) lives outside this crate, behind the
//! [`arch::Platform`] trait and the [`boot::MemoryMap`] handoff. Everything
//! here can therefore run unmodified on the simulated platform used by the
//! test suite.
#![cfg_attr(not(test), no_std)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unreadable_literal)]

extern crate alloc;

pub mod arch;
pub mod boot;
pub mod config;
pub mod kernel;
pub mod mm;
pub mod task;
