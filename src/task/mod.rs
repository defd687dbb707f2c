//! Tasks and their saved execution state.
//!
//! A task is a name, an entry point, a kernel-allocated stack and a saved
//! register frame sitting on that stack. Tasks never run until the
//! scheduler hands them the processor; creation only builds the state a
//! context switch would have saved, so the first switch to a fresh task is
//! indistinguishable from a switch to a preempted one.

use crate::arch::x86::{Selector, TrapFrame};
use crate::arch::Platform;
use crate::config::{MAX_TASK_NAME, STACK_TOP_RESERVED};
use crate::mm::paging::PAGE_SIZE;
use crate::mm::space::AddressSpace;
use crate::mm::{AllocError, Manager};
use addr::{frame::Frame, phys::Physical, virt::Virtual};
use alloc::string::String;
use core::fmt;

pub mod elf;
pub mod scheduler;

/// A task's position in the scheduler's arena. Identifiers are dense
/// indices, never reused identities; tasks are not reaped in this kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(pub usize);

/// The privilege a task runs at, which decides the segment selectors
/// loaded when switching to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Kernel,
    User,
}

impl Kind {
    /// The code and data selectors for this privilege level.
    #[must_use]
    pub const fn selectors(self) -> (Selector, Selector) {
        match self {
            Kind::Kernel => (Selector::KERNEL_CODE, Selector::KERNEL_DATA),
            Kind::User => (Selector::USER_CODE, Selector::USER_DATA),
        }
    }
}

/// A failure to create a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// No physical memory left for the task's stack.
    OutOfMemory,
}

impl From<AllocError> for SpawnError {
    fn from(_: AllocError) -> Self {
        SpawnError::OutOfMemory
    }
}

pub struct Task {
    name: String,
    kind: Kind,
    entry: Virtual,
    stack: Physical,
    stack_top: Virtual,
    space: AddressSpace,

    /// Scheduling links, owned by the scheduler.
    pub(crate) next: Id,
    pub(crate) prev: Id,
}

impl Task {
    /// Create a task: allocate a one-page stack, leave a small reserved
    /// strip at its top, and push the register frame a context switch
    /// restores from. The saved stack pointer is left pointing at that
    /// frame, so the switch path needs no special case for new tasks.
    pub fn create<P: Platform>(
        mm: &mut Manager,
        platform: &mut P,
        name: &str,
        kind: Kind,
        entry: Virtual,
        space: AddressSpace,
    ) -> Result<Self, SpawnError> {
        let stack = mm.allocate(PAGE_SIZE, platform)?;
        let top = Virtual::new(stack.as_u32()) + (PAGE_SIZE - STACK_TOP_RESERVED);
        let stack_top = top - TrapFrame::BYTES;

        let (code, data) = kind.selectors();
        let frame = TrapFrame::initial(entry, top, code, data);
        let offset = (stack_top.as_u32() - stack.as_u32()) as usize;
        frame.write_to(
            &mut platform.frame_mut(Frame::new(stack))[offset..offset + TrapFrame::BYTES as usize],
        );

        let mut name = String::from(name);
        name.truncate(MAX_TASK_NAME);
        log::info!("task: created {name:?} with entry {entry}");

        Ok(Self {
            name,
            kind,
            entry,
            stack,
            stack_top,
            space,
            next: Id(0),
            prev: Id(0),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn entry(&self) -> Virtual {
        self.entry
    }

    /// The physical page backing this task's kernel stack.
    #[must_use]
    pub fn stack(&self) -> Physical {
        self.stack
    }

    /// The saved stack pointer, aimed at the register frame to restore.
    #[must_use]
    pub fn stack_top(&self) -> Virtual {
        self.stack_top
    }

    #[must_use]
    pub fn space(&self) -> &AddressSpace {
        &self.space
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("entry", &self.entry)
            .field("stack_top", &self.stack_top)
            .finish_non_exhaustive()
    }
}
