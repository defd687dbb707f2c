//! The physical and virtual memory manager.
//!
//! Physical memory is tracked by a page-granular [`bitmap`]; translation is
//! driven through a page directory whose 1024 slots are all backed by a
//! page table from the start, so mapping a page never allocates an
//! intermediate structure. The manager is an explicit value constructed
//! once at boot from the memory map, not a collection of hidden statics,
//! which is what lets the whole thing run against the simulated platform.
//!
//! The structures the MMU walks live in the [`Placement`] frames directly
//! after the kernel image; the manager keeps its own working copies and
//! writes every change through [`crate::arch::Platform::frame_mut`], so the
//! hardware image and the copies never diverge.

use crate::arch::Platform;
use crate::boot::MemoryMap;
use addr::{frame::Frame, phys::Physical, virt::Virtual};
use alloc::boxed::Box;
use alloc::vec;
use bitmap::{Bitmap, GROUP_SIZE};
use paging::{PageDirectory, PageEntry, PageFlags, PageTable, ENTRY_COUNT, PAGE_SIZE};

pub mod bitmap;
pub mod paging;
pub mod space;

/// A failure while bringing the memory manager up. All of these are fatal
/// for the boot path, but they are reported as values so the condition can
/// be exercised without taking down the test harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The boot memory map has no usable region at the expected mark.
    NoUsableRegion,

    /// The linker-provided kernel image end is not page aligned.
    UnalignedKernelEnd,

    /// Managed memory ends before the manager's own bookkeeping does.
    InsufficientMemory,
}

/// A failure to allocate physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No run of free pages satisfies the request. The failing call leaves
    /// no partial state behind.
    OutOfMemory,

    /// The request is empty, wider than a bitmap group, misaligned, or
    /// escapes the address space; no allocator answer could ever satisfy it.
    OutOfRange,
}

/// A failure to mutate a single page mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// The address does not denote a managed, page-aligned page.
    InvalidPageIndex,
}

/// Where the manager's bookkeeping lives in physical memory: directly after
/// the kernel image, directory first, then the table array, then the
/// bitmap. The first page past the bitmap is the first allocatable byte.
/// The layout is deterministic so the boot stub and the linker script can
/// rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub directory: Physical,
    pub tables: Physical,
    pub bitmap: Physical,
    pub first_free: Physical,
}

pub struct Manager {
    bitmap: Bitmap,
    directory: Box<PageDirectory>,
    tables: Box<[PageTable]>,
    placement: Placement,
}

impl Manager {
    /// Bring the memory manager up: size the bitmap from the memory map's
    /// upper bound, back every directory slot with an empty table, identity
    /// map everything from address zero through the end of the bookkeeping
    /// as kernel pages, and switch paging on through the platform.
    pub fn new<P: Platform>(
        map: &MemoryMap,
        kernel_end: Physical,
        platform: &mut P,
    ) -> Result<Self, InitError> {
        let upper = map.upper_bound().ok_or(InitError::NoUsableRegion)?;
        if !kernel_end.is_page_aligned() {
            return Err(InitError::UnalignedKernelEnd);
        }

        let pages = upper.frame_index();
        let bitmap = Bitmap::new(pages);
        let groups = (bitmap.pages() / GROUP_SIZE) as u32;

        let tables_base = kernel_end + PAGE_SIZE;
        let bitmap_base = tables_base + ENTRY_COUNT as u32 * PAGE_SIZE;
        let placement = Placement {
            directory: kernel_end,
            tables: tables_base,
            bitmap: bitmap_base,
            first_free: (bitmap_base + groups * 4).page_align_up(),
        };
        if placement.first_free.frame_index() > bitmap.pages() || placement.first_free >= upper {
            return Err(InitError::InsufficientMemory);
        }

        let mut directory = Box::new(PageDirectory::empty());
        let tables = vec![PageTable::empty(); ENTRY_COUNT].into_boxed_slice();

        // Every directory slot points at its backing table from the start.
        // The slots are user-accessible; the table entries restrict access.
        for (index, entry) in directory.entries.iter_mut().enumerate() {
            let table = tables_base + index as u32 * PAGE_SIZE;
            *entry = PageEntry::new(table, PageFlags::USER_PAGE);
        }

        let mut manager = Self {
            bitmap,
            directory,
            tables,
            placement,
        };
        manager.publish(platform);

        // Identity map the kernel image and the bookkeeping itself
        for index in 0..placement.first_free.frame_index() {
            let address = index as u32 * PAGE_SIZE;
            manager.map_page(
                Physical::new(address),
                Virtual::new(address),
                PageFlags::KERNEL_PAGE,
                platform,
            );
        }

        platform.enable_paging(placement.directory);
        log::info!(
            "mm: {} pages managed, {} free, allocations start at {}",
            manager.bitmap.pages(),
            manager.bitmap.free_pages(),
            placement.first_free,
        );
        Ok(manager)
    }

    /// Allocate `size` bytes of physical memory, rounded up to whole pages.
    /// The run is identity mapped with kernel flags and zero-filled; the
    /// returned address is always page aligned.
    ///
    /// # Errors
    /// `OutOfRange` for empty requests or requests wider than a bitmap
    /// group, `OutOfMemory` when no free run fits. A failing call changes
    /// nothing.
    pub fn allocate<P: Platform>(
        &mut self,
        size: u32,
        platform: &mut P,
    ) -> Result<Physical, AllocError> {
        let address = self.allocate_pages(size, None, PageFlags::KERNEL_PAGE, platform)?;
        Ok(address)
    }

    /// Allocate `size` bytes of physical memory and map the run at the
    /// given page-aligned virtual address with the given flags, in
    /// addition to its identity mapping. Used for user-space mappings,
    /// where the virtual location is dictated by the program image.
    pub fn allocate_at<P: Platform>(
        &mut self,
        virt: Virtual,
        size: u32,
        flags: PageFlags,
        platform: &mut P,
    ) -> Result<Physical, AllocError> {
        self.allocate_pages(size, Some(virt), flags, platform)
    }

    fn allocate_pages<P: Platform>(
        &mut self,
        size: u32,
        virt: Option<Virtual>,
        flags: PageFlags,
        platform: &mut P,
    ) -> Result<Physical, AllocError> {
        let pages = Self::request_pages(size)?;
        if let Some(base) = virt {
            if !base.is_page_aligned() {
                return Err(AllocError::OutOfRange);
            }
            base.as_u32()
                .checked_add(pages as u32 * PAGE_SIZE)
                .ok_or(AllocError::OutOfRange)?;
        }

        let first = self.bitmap.find_run(pages).ok_or(AllocError::OutOfMemory)?;
        let address = Physical::new(first as u32 * PAGE_SIZE);

        for page in 0..pages as u32 {
            let physical = address + page * PAGE_SIZE;

            // The core reaches every frame it owns through the identity
            // mapping, so the run is identity mapped even when the caller
            // asked for it somewhere else
            self.map_page(
                physical,
                Virtual::new(physical.as_u32()),
                PageFlags::KERNEL_PAGE,
                platform,
            );
            if let Some(base) = virt {
                self.map_page(physical, base + page * PAGE_SIZE, flags, platform);
            }
            platform.frame_mut(Frame::new(physical)).fill(0);
        }
        Ok(address)
    }

    /// Map a single physical page at a virtual address: write the table
    /// entry, mark the physical page allocated in the bitmap, invalidate
    /// the stale translation. Together with [`Self::clear_page`] these are
    /// the only page-table mutators; every higher-level operation is a
    /// sequence of these.
    ///
    /// # Errors
    /// `InvalidPageIndex` when either address is not page aligned or the
    /// physical page lies outside managed memory.
    pub fn set_page<P: Platform>(
        &mut self,
        physical: Physical,
        virtual_: Virtual,
        flags: PageFlags,
        platform: &mut P,
    ) -> Result<(), MapError> {
        if !physical.is_page_aligned() || !virtual_.is_page_aligned() {
            return Err(MapError::InvalidPageIndex);
        }
        if physical.frame_index() >= self.bitmap.pages() {
            return Err(MapError::InvalidPageIndex);
        }

        let slot = self.tables[virtual_.directory_index()].entries[virtual_.table_index()];
        if let Some(previous) = slot.address() {
            if previous != physical {
                log::warn!("mm: remapping {virtual_} from {previous} to {physical}");
            }
        }
        self.map_page(physical, virtual_, flags, platform);
        Ok(())
    }

    /// Unmap the page at a virtual address: clear the table entry, release
    /// the physical page in the bitmap, invalidate the translation.
    /// Clearing an absent entry is a no-op.
    pub fn clear_page<P: Platform>(
        &mut self,
        virtual_: Virtual,
        platform: &mut P,
    ) -> Result<(), MapError> {
        if !virtual_.is_page_aligned() {
            return Err(MapError::InvalidPageIndex);
        }

        let entry = self.tables[virtual_.directory_index()].entries[virtual_.table_index()];
        if let Some(physical) = entry.address() {
            self.tables[virtual_.directory_index()].entries[virtual_.table_index()].clear();
            self.sync_entry(virtual_, PageEntry::ABSENT, platform);
            if physical.frame_index() < self.bitmap.pages() {
                self.bitmap.clear(physical.frame_index());
                self.sync_bitmap(physical.frame_index(), platform);
            }
        }
        platform.invalidate(virtual_);
        Ok(())
    }

    /// Resolve a virtual address through the tables. Returns the physical
    /// address of the byte, or `None` when the page is absent.
    #[must_use]
    pub fn resolve(&self, virtual_: Virtual) -> Option<Physical> {
        self.tables[virtual_.directory_index()].entries[virtual_.table_index()]
            .address()
            .map(|page| page + virtual_.page_offset())
    }

    /// The entry covering a virtual address, as the hardware would read it.
    #[must_use]
    pub fn entry(&self, virtual_: Virtual) -> PageEntry {
        self.tables[virtual_.directory_index()].entries[virtual_.table_index()]
    }

    /// The working copy of the page directory. The image the MMU walks
    /// sits in the [`Placement::directory`] frame and is written during
    /// construction; directory entries never change afterwards.
    #[must_use]
    pub fn directory(&self) -> &PageDirectory {
        &self.directory
    }

    #[must_use]
    pub fn placement(&self) -> Placement {
        self.placement
    }

    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.bitmap.pages()
    }

    #[must_use]
    pub fn free_pages(&self) -> usize {
        self.bitmap.free_pages()
    }

    /// Whether the physical page containing this address is allocated.
    /// Addresses past the managed upper bound are never handed out, so
    /// they report as free.
    #[must_use]
    pub fn page_allocated(&self, physical: Physical) -> bool {
        physical.frame_index() < self.bitmap.pages() && self.bitmap.is_set(physical.frame_index())
    }

    /// Infallible single-page mapping for addresses already validated at
    /// allocation time.
    pub(crate) fn map_page<P: Platform>(
        &mut self,
        physical: Physical,
        virtual_: Virtual,
        flags: PageFlags,
        platform: &mut P,
    ) {
        debug_assert!(physical.is_page_aligned() && virtual_.is_page_aligned());
        debug_assert!(physical.frame_index() < self.bitmap.pages());

        let entry = PageEntry::new(physical, flags);
        self.tables[virtual_.directory_index()].entries[virtual_.table_index()] = entry;
        self.bitmap.set(physical.frame_index());
        self.sync_entry(virtual_, entry, platform);
        self.sync_bitmap(physical.frame_index(), platform);
        platform.invalidate(virtual_);
    }

    /// Write the initial image of the translation structures into their
    /// [`Placement`] frames: the directory entries, all-absent tables and
    /// an all-free bitmap. Raw memory there holds whatever the firmware
    /// left behind, so everything is written before the directory is ever
    /// loaded.
    fn publish<P: Platform>(&self, platform: &mut P) {
        let image = platform.frame_mut(Frame::new(self.placement.directory));
        for (index, entry) in self.directory.entries.iter().enumerate() {
            image[index * 4..index * 4 + 4].copy_from_slice(&entry.raw().to_le_bytes());
        }
        for index in 0..ENTRY_COUNT {
            let table = self.placement.tables + index as u32 * PAGE_SIZE;
            platform.frame_mut(Frame::new(table)).fill(0);
        }

        let words = self.bitmap.pages() / GROUP_SIZE;
        for frame in 0..(words * 4).div_ceil(Frame::SIZE) {
            let chunk = self.placement.bitmap + (frame * Frame::SIZE) as u32;
            platform.frame_mut(Frame::new(chunk)).fill(0);
        }
    }

    /// Mirror one table entry into the frame the MMU walks.
    fn sync_entry<P: Platform>(&self, virtual_: Virtual, entry: PageEntry, platform: &mut P) {
        let table = self.placement.tables + virtual_.directory_index() as u32 * PAGE_SIZE;
        let offset = virtual_.table_index() * 4;
        platform.frame_mut(Frame::new(table))[offset..offset + 4]
            .copy_from_slice(&entry.raw().to_le_bytes());
    }

    /// Mirror one bitmap group into its placement frame.
    fn sync_bitmap<P: Platform>(&self, page: usize, platform: &mut P) {
        let group = page / GROUP_SIZE;
        let byte = group * 4;
        let chunk = self.placement.bitmap + (byte / Frame::SIZE * Frame::SIZE) as u32;
        let offset = byte % Frame::SIZE;
        platform.frame_mut(Frame::new(chunk))[offset..offset + 4]
            .copy_from_slice(&self.bitmap.group(group).to_le_bytes());
    }

    /// Translate a byte size into a page count the allocator can search
    /// for, rejecting sizes it could never satisfy.
    fn request_pages(size: u32) -> Result<usize, AllocError> {
        if size == 0 {
            return Err(AllocError::OutOfRange);
        }
        let pages = size.div_ceil(PAGE_SIZE) as usize;
        if pages > GROUP_SIZE {
            return Err(AllocError::OutOfRange);
        }
        Ok(pages)
    }
}
