//! The round-robin scheduler.
//!
//! Tasks live in an arena and are threaded into a circular ring through
//! their `next` and `prev` indices. The ring's head is always the most
//! recently created task; each new task is spliced in between the tail and
//! the old head, so a full revolution visits tasks from newest to oldest
//! and wraps. Selection is driven by the timer: every tick picks the
//! current task's successor and reports the switch the interrupt return
//! path must perform.

use super::{Id, Kind, SpawnError, Task};
use crate::arch::Platform;
use crate::mm::space::AddressSpace;
use crate::mm::Manager;
use addr::virt::Virtual;
use alloc::vec::Vec;
use sync::AtomicCell;

/// A switch the timer path must carry out: save into `from`, restore from
/// `to`. `from` is `None` for the very first dispatch, when there is no
/// task state to save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    pub from: Option<Id>,
    pub to: Id,
}

pub struct Scheduler {
    tasks: Vec<Task>,
    head: Option<Id>,
    tail: Option<Id>,
    current: Option<Id>,

    /// Whether the timer is allowed to preempt. Flipped from interrupt
    /// context, hence the atomic.
    enabled: AtomicCell<bool>,
    ticks: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            head: None,
            tail: None,
            current: None,
            enabled: AtomicCell::new(false),
            ticks: 0,
        }
    }

    /// Create a kernel task and add it to the ring.
    pub fn spawn_kernel<P: Platform>(
        &mut self,
        mm: &mut Manager,
        platform: &mut P,
        name: &str,
        entry: Virtual,
    ) -> Result<Id, SpawnError> {
        let task = Task::create(mm, platform, name, Kind::Kernel, entry, AddressSpace::new())?;
        Ok(self.insert(task))
    }

    /// Create a user task owning the given address space and add it to the
    /// ring.
    pub fn spawn_user<P: Platform>(
        &mut self,
        mm: &mut Manager,
        platform: &mut P,
        name: &str,
        entry: Virtual,
        space: AddressSpace,
    ) -> Result<Id, SpawnError> {
        let task = Task::create(mm, platform, name, Kind::User, entry, space)?;
        Ok(self.insert(task))
    }

    /// Splice a task in as the new head of the ring, between the tail and
    /// the previous head.
    fn insert(&mut self, mut task: Task) -> Id {
        let id = Id(self.tasks.len());
        match (self.head, self.tail) {
            (Some(head), Some(tail)) => {
                task.next = head;
                task.prev = tail;
                self.tasks[tail.0].next = id;
                self.tasks[head.0].prev = id;
            }
            _ => {
                task.next = id;
                task.prev = id;
                self.tail = Some(id);
            }
        }
        self.tasks.push(task);
        self.head = Some(id);
        id
    }

    /// Let the timer start preempting.
    pub fn enable(&self) {
        self.enabled.store(true);
        log::debug!("scheduler: preemption enabled");
    }

    /// Stop preemption. The current task keeps the processor until the
    /// scheduler is enabled again.
    pub fn disable(&self) {
        self.enabled.store(false);
        log::debug!("scheduler: preemption disabled");
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.load()
    }

    /// One timer tick: pick the next task in the ring and describe the
    /// switch to it, or `None` when the processor should stay where it is.
    /// Before a switch to a user task is reported, the user window is
    /// re-pointed at that task's memory.
    pub fn tick<P: Platform>(&mut self, mm: &mut Manager, platform: &mut P) -> Option<Switch> {
        if !self.enabled() {
            return None;
        }
        self.ticks += 1;

        let head = self.head?;
        let to = match self.current {
            None => head,
            Some(current) => {
                let next = self.tasks[current.0].next;
                if next == current {
                    return None;
                }
                next
            }
        };

        let from = self.current;
        self.current = Some(to);

        let task = &self.tasks[to.0];
        if task.kind() == Kind::User {
            task.space().map_window(mm, platform);
        }
        log::trace!("scheduler: dispatching {:?}", task.name());
        Some(Switch { from, to })
    }

    #[must_use]
    pub fn task(&self, id: Id) -> &Task {
        &self.tasks[id.0]
    }

    #[must_use]
    pub fn current(&self) -> Option<Id> {
        self.current
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Timer ticks handled since boot.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
