use crate::{PAGE_SHIFT, PAGE_SIZE};
use core::{
    fmt,
    ops::{Add, AddAssign, Sub, SubAssign},
};

/// A virtual memory address. Virtual addresses are translated by the two
/// level page-directory/page-table hierarchy: the top 10 bits select a
/// directory entry, the next 10 bits a table entry and the low 12 bits a
/// byte within the page.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Virtual(pub(crate) u32);

impl Virtual {
    /// Creates a new virtual address.
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

    /// Convert this virtual address to a `u32`.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Convert this virtual address to an `usize`.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The index of the page-directory entry covering this address. Each
    /// directory entry spans 4 MiB of the virtual address space.
    #[must_use]
    pub const fn directory_index(self) -> usize {
        (self.0 >> 22) as usize
    }

    /// The index of the page-table entry covering this address, within the
    /// table selected by [`Self::directory_index`].
    #[must_use]
    pub const fn table_index(self) -> usize {
        ((self.0 >> PAGE_SHIFT) & 0x3FF) as usize
    }

    /// The index of the virtual page containing this address, counted from
    /// the start of the address space.
    #[must_use]
    pub const fn page_index(self) -> usize {
        (self.0 >> PAGE_SHIFT) as usize
    }

    /// The offset of this address within its page.
    #[must_use]
    pub const fn page_offset(self) -> u32 {
        self.0 & (PAGE_SIZE as u32 - 1)
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
            None => panic!("Overflow while aligning up a virtual address"),
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
}

impl fmt::LowerHex for Virtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::UpperHex for Virtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

impl fmt::Display for Virtual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<Virtual> for u32 {
    fn from(address: Virtual) -> Self {
        address.0
    }
}

impl From<Virtual> for usize {
    fn from(address: Virtual) -> Self {
        address.0 as usize
    }
}

impl From<u32> for Virtual {
    fn from(address: u32) -> Self {
        Self::new(address)
    }
}

impl Add<u32> for Virtual {
    type Output = Virtual;

    fn add(self, rhs: u32) -> Self::Output {
        Self::new(self.0 + rhs)
    }
}

impl AddAssign<u32> for Virtual {
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

impl Sub<u32> for Virtual {
    type Output = Virtual;

    fn sub(self, rhs: u32) -> Self::Output {
        Self::new(self.0 - rhs)
    }
}

impl Sub<Virtual> for Virtual {
    type Output = u32;

    fn sub(self, rhs: Virtual) -> Self::Output {
        self.0 - rhs.0
    }
}

impl SubAssign<u32> for Virtual {
    fn sub_assign(&mut self, rhs: u32) {
        self.0 -= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_indices() {
        let address = Virtual::new(0x4040_2084);
        assert_eq!(address.directory_index(), 0x101);
        assert_eq!(address.table_index(), 2);
        assert_eq!(address.page_offset(), 0x84);
        assert_eq!(address.page_index(), 0x40402);
    }

    #[test]
    fn boundaries() {
        assert_eq!(Virtual::new(0).directory_index(), 0);
        assert_eq!(Virtual::new(u32::MAX).directory_index(), 1023);
        assert_eq!(Virtual::new(u32::MAX).table_index(), 1023);
    }
}
