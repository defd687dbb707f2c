use crate::{PAGE_SHIFT, PAGE_SIZE};
use core::{
    fmt,
    ops::{Add, AddAssign, Sub, SubAssign},
};

/// A physical memory address. On this architecture the physical address space
/// is 32 bits wide, so every `u32` is a representable physical address; the
/// type exists to keep physical and virtual addresses apart, not to restrict
/// the value range.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Physical(pub(crate) u32);

impl Physical {
    /// Creates a new physical address.
    #[must_use]
    pub const fn new(address: u32) -> Self {
        Self(address)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Convert this physical address to a `u32`.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Convert this physical address to an `usize`, mostly useful for
    /// indexing and pointer arithmetic on the host side.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Align the address up to a page boundary. If the address is already
    /// aligned, it is returned unchanged.
    ///
    /// # Panics
    /// Panics if aligning up overflows the 32-bit address space.
    #[must_use]
    pub const fn page_align_up(self) -> Self {
        match self.0.checked_add(PAGE_SIZE as u32 - 1) {
            Some(addr) => Self(addr & !(PAGE_SIZE as u32 - 1)),
            None => panic!("Overflow while aligning up a physical address"),
        }
    }

    /// Align the address down to a page boundary. If the address is already
    /// aligned, it is returned unchanged.
    #[must_use]
    pub const fn page_align_down(self) -> Self {
        Self(self.0 & !(PAGE_SIZE as u32 - 1))
    }

    /// Checks if the address is aligned to a page boundary.
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0.trailing_zeros() >= PAGE_SHIFT
    }

    /// The index of the physical page frame containing this address.
    #[must_use]
    pub const fn frame_index(self) -> usize {
        (self.0 >> PAGE_SHIFT) as usize
    }
}

impl fmt::LowerHex for Physical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::UpperHex for Physical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl fmt::Display for Physical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<Physical> for u32 {
    fn from(address: Physical) -> Self {
        address.0
    }
}

impl From<Physical> for usize {
    fn from(address: Physical) -> Self {
        address.0 as usize
    }
}

impl From<u32> for Physical {
    fn from(address: u32) -> Self {
        Self::new(address)
    }
}

impl Add<u32> for Physical {
    type Output = Physical;

    fn add(self, rhs: u32) -> Self::Output {
        Self::new(self.0 + rhs)
    }
}

impl AddAssign<u32> for Physical {
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

impl Sub<u32> for Physical {
    type Output = Physical;

    fn sub(self, rhs: u32) -> Self::Output {
        Self::new(self.0 - rhs)
    }
}

impl Sub<Physical> for Physical {
    type Output = u32;

    fn sub(self, rhs: Physical) -> Self::Output {
        self.0 - rhs.0
    }
}

impl SubAssign<u32> for Physical {
    fn sub_assign(&mut self, rhs: u32) {
        self.0 -= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_alignment() {
        assert_eq!(Physical::new(0x1234).page_align_down(), Physical::new(0x1000));
        assert_eq!(Physical::new(0x1234).page_align_up(), Physical::new(0x2000));
        assert_eq!(Physical::new(0x2000).page_align_up(), Physical::new(0x2000));
        assert!(Physical::new(0x3000).is_page_aligned());
        assert!(!Physical::new(0x3004).is_page_aligned());
    }

    #[test]
    fn frame_index() {
        assert_eq!(Physical::new(0).frame_index(), 0);
        assert_eq!(Physical::new(0x1FFF).frame_index(), 1);
        assert_eq!(Physical::new(0x0100_0000).frame_index(), 4096);
    }
}
