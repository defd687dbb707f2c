//! Per-task user address spaces.
//!
//! There is a single user window in the virtual address space and every user
//! task claims the same window for its own memory. An [`AddressSpace`]
//! records which physical runs back which window pages for one task; on a
//! switch to that task the scheduler re-points the window at them. Only one
//! space is visible through the window at a time, and mapping a space
//! implicitly unmaps the previous occupant.

use super::paging::{PageFlags, PAGE_SIZE};
use super::{AllocError, Manager};
use crate::arch::Platform;
use addr::{phys::Physical, virt::Virtual};
use alloc::vec::Vec;

/// One contiguous user mapping: `pages` pages of physical memory at
/// `location`, visible at `virt` whenever the space owns the window.
#[derive(Debug, Clone, Copy)]
struct Mapping {
    virt: Virtual,
    location: Physical,
    pages: u32,
}

#[derive(Default)]
pub struct AddressSpace {
    regions: Vec<Mapping>,
}

impl AddressSpace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate physical memory for this space and map it at the given
    /// window address. The memory is zero-filled and immediately visible,
    /// since allocation only happens while the space is being built.
    pub fn allocate_memory<P: Platform>(
        &mut self,
        mm: &mut Manager,
        platform: &mut P,
        size: u32,
        virt: Virtual,
        flags: PageFlags,
    ) -> Result<Physical, AllocError> {
        let location = mm.allocate_at(virt, size, flags, platform)?;
        self.regions.push(Mapping {
            virt,
            location,
            pages: size.div_ceil(PAGE_SIZE),
        });
        Ok(location)
    }

    /// Point the user window at this space's memory. Every address here was
    /// validated when the region was allocated, so remapping cannot fail.
    /// Pages of the previous occupant that this space does not cover stay
    /// mapped until something overwrites them; the window contract is that
    /// only the current task runs user code, so nothing reads them in
    /// between.
    pub fn map_window<P: Platform>(&self, mm: &mut Manager, platform: &mut P) {
        for region in &self.regions {
            for page in 0..region.pages {
                mm.map_page(
                    region.location + page * PAGE_SIZE,
                    region.virt + page * PAGE_SIZE,
                    PageFlags::USER_PAGE,
                    platform,
                );
            }
        }
    }

    /// The physical location of the first region, if any memory has been
    /// allocated yet.
    #[must_use]
    pub fn location(&self) -> Option<Physical> {
        self.regions.first().map(|region| region.location)
    }

    /// Total pages owned by this space across all regions.
    #[must_use]
    pub fn pages(&self) -> u32 {
        self.regions.iter().map(|region| region.pages).sum()
    }
}
