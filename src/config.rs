/// The virtual address every user program is linked against, and the base of
/// the single user mapping window. The loader refuses any executable whose
/// entry point differs from this address.
pub const USER_BASE: u32 = 0x4000_0000;

/// The number of bytes left untouched at the very top of a freshly allocated
/// task stack, between the page end and the initial stack pointer.
pub const STACK_TOP_RESERVED: u32 = 16;

/// The EFLAGS image a new task starts with: the always-one reserved bit plus
/// the interrupt flag, so that preemption stays armed after the first resume.
pub const INITIAL_EFLAGS: u32 = 0x202;

/// Task names longer than this are truncated at creation.
pub const MAX_TASK_NAME: usize = 32;
