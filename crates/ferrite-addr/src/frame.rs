use crate::{phys::Physical, PAGE_SHIFT, PAGE_SIZE};
use core::fmt;

/// A page frame: a page-sized, page-aligned chunk of physical memory. This
/// is the unit the physical allocator and the page-table code deal in.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Frame(Physical);

/// The index of a page frame in physical memory. Frame `n` covers the bytes
/// from `n * PAGE_SIZE` up to (but excluding) `(n + 1) * PAGE_SIZE`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Index(pub usize);

impl Frame {
    /// The size of a frame, in bytes.
    pub const SIZE: usize = PAGE_SIZE;

    /// Creates a new frame containing the given physical address. The
    /// address is aligned down to the frame boundary.
    #[must_use]
    pub const fn new(address: Physical) -> Self {
        Self(address.page_align_down())
    }

    /// The physical address of the first byte of this frame.
    #[must_use]
    pub const fn addr(self) -> Physical {
        self.0
    }

    /// The index of this frame in physical memory.
    #[must_use]
    pub const fn index(self) -> Index {
        Index(self.0.frame_index())
    }
}

impl Index {
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// The physical address of the first byte of the indexed frame.
    ///
    /// # Panics
    /// Panics if the index lies outside the 32-bit physical address space.
    #[must_use]
    pub const fn addr(self) -> Physical {
        match (self.0 as u64).checked_mul(PAGE_SIZE as u64) {
            Some(addr) if addr <= u32::MAX as u64 => Physical::new((self.0 as u32) << PAGE_SHIFT),
            _ => panic!("Frame index outside of the physical address space"),
        }
    }
}

impl From<Index> for Frame {
    fn from(index: Index) -> Self {
        Self::new(index.addr())
    }
}

impl From<Physical> for Frame {
    fn from(address: Physical) -> Self {
        Self::new(address)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame {}", self.0)
    }
}
