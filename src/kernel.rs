//! Ties the subsystems together into one bootable kernel value.
//!
//! Everything the kernel owns hangs off [`Kernel`]: the memory manager, the
//! scheduler and the platform it drives. The boot stub builds one from the
//! firmware memory map and publishes it through [`KERNEL`]; the test suite
//! builds its own against the simulator and never touches the global.

use crate::arch::{BootPlatform, Platform};
use crate::boot::MemoryMap;
use crate::mm::space::AddressSpace;
use crate::mm::{InitError, Manager};
use crate::task::elf::{self, LoadError};
use crate::task::scheduler::{Scheduler, Switch};
use crate::task::{Id, SpawnError};
use addr::{phys::Physical, virt::Virtual};
use sync::{Once, Spinlock};

/// The kernel, once booted. Interrupt handlers reach it through here.
pub static KERNEL: Once<Spinlock<Kernel<BootPlatform>>> = Once::new();

pub struct Kernel<P: Platform> {
    mm: Manager,
    scheduler: Scheduler,
    platform: P,
}

impl<P: Platform> Kernel<P> {
    /// Boot the kernel core: bring the memory manager up on the given
    /// platform (which enables paging) and start with an empty ring.
    pub fn boot(
        map: &MemoryMap,
        kernel_end: Physical,
        mut platform: P,
    ) -> Result<Self, InitError> {
        let mm = Manager::new(map, kernel_end, &mut platform)?;
        Ok(Self {
            mm,
            scheduler: Scheduler::new(),
            platform,
        })
    }

    /// Spawn a kernel task running at the given entry point.
    pub fn spawn_kernel_task(&mut self, name: &str, entry: Virtual) -> Result<Id, SpawnError> {
        self.scheduler
            .spawn_kernel(&mut self.mm, &mut self.platform, name, entry)
    }

    /// Load an ELF executable into a fresh address space and spawn a user
    /// task entering it.
    pub fn spawn_program(&mut self, name: &str, file: &[u8]) -> Result<Id, LoadError> {
        let mut space = AddressSpace::new();
        let entry = elf::load(&mut self.mm, &mut self.platform, &mut space, file)
            .map_err(|error| {
                log::error!("failed to load {name:?}: {error:?}");
                error
            })?;
        self.scheduler
            .spawn_user(&mut self.mm, &mut self.platform, name, entry, space)
            .map_err(|SpawnError::OutOfMemory| LoadError::OutOfMemory)
    }

    /// Handle one timer tick. The returned switch, if any, tells the
    /// interrupt return path which task state to save and restore.
    pub fn tick(&mut self) -> Option<Switch> {
        self.scheduler.tick(&mut self.mm, &mut self.platform)
    }

    pub fn enable_scheduler(&self) {
        self.scheduler.enable();
    }

    pub fn disable_scheduler(&self) {
        self.scheduler.disable();
    }

    #[must_use]
    pub fn mm(&self) -> &Manager {
        &self.mm
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn platform(&self) -> &P {
        &self.platform
    }
}

/// Boot the kernel on the default platform and publish it. Called once by
/// the boot stub, after the firmware memory map has been collected.
///
/// # Errors
/// Forwards the memory manager's boot failure, leaving the global unset.
pub fn setup(map: &MemoryMap, kernel_end: Physical) -> Result<(), InitError> {
    let kernel = Kernel::boot(map, kernel_end, BootPlatform::default())?;
    KERNEL.call_once(|| Spinlock::new(kernel));
    Ok(())
}
