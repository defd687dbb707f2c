//! The two-level paging structures: a page directory whose 1024 entries
//! each cover 4 MiB of the virtual address space through a page table of
//! 1024 page-sized entries.

use addr::phys::Physical;
use bitflags::bitflags;

/// The size of a page, in bytes.
pub const PAGE_SIZE: u32 = addr::PAGE_SIZE as u32;

/// The number of entries in a page directory or page table.
pub const ENTRY_COUNT: usize = 1024;

/// The span of virtual address space covered by one directory entry.
pub const DIRECTORY_SPAN: u32 = PAGE_SIZE * ENTRY_COUNT as u32;

bitflags! {
    /// The flag bits of a directory or table entry. Only the three bits this
    /// kernel actually drives are modeled; the accessed/dirty bits the CPU
    /// maintains on its own are masked out when reading flags back.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;

        /// A kernel mapping: present and writable, supervisor only.
        const KERNEL_PAGE = Self::PRESENT.bits() | Self::WRITABLE.bits();

        /// A user mapping: present, writable, ring-3 accessible.
        const USER_PAGE = Self::PRESENT.bits() | Self::WRITABLE.bits() | Self::USER.bits();

        /// A read-only user mapping, used for loaded program images.
        const USER_PAGE_READ_ONLY = Self::PRESENT.bits() | Self::USER.bits();
    }
}

/// A single directory or table entry: a page-aligned physical address or'ed
/// with its flag bits.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageEntry(u32);

impl PageEntry {
    /// An entry with the present bit clear. The remaining bits are ignored
    /// by the CPU, so zero is the canonical absent entry.
    pub const ABSENT: PageEntry = PageEntry(0);

    /// Build an entry pointing at the given physical page.
    #[must_use]
    pub fn new(address: Physical, flags: PageFlags) -> Self {
        debug_assert!(address.is_page_aligned());
        Self(address.as_u32() | flags.bits())
    }

    #[must_use]
    pub const fn present(self) -> bool {
        self.0 & PageFlags::PRESENT.bits() != 0
    }

    /// The physical page address held by the entry, or `None` when the
    /// entry is absent.
    #[must_use]
    pub fn address(self) -> Option<Physical> {
        self.present()
            .then(|| Physical::new(self.0 & !(PAGE_SIZE - 1)))
    }

    #[must_use]
    pub fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0)
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// The raw bits, as written into the hardware structure.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A page table: translations for the 4 MiB slice of the address space its
/// owning directory entry covers.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [PageEntry; ENTRY_COUNT],
}

impl PageTable {
    /// A table with every entry absent.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: [PageEntry::ABSENT; ENTRY_COUNT],
        }
    }
}

/// The page directory, the root of the translation hierarchy.
#[repr(C, align(4096))]
pub struct PageDirectory {
    pub entries: [PageEntry; ENTRY_COUNT],
}

impl PageDirectory {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            entries: [PageEntry::ABSENT; ENTRY_COUNT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_packs_address_and_flags() {
        let entry = PageEntry::new(Physical::new(0x0050_2000), PageFlags::USER_PAGE);
        assert!(entry.present());
        assert_eq!(entry.address(), Some(Physical::new(0x0050_2000)));
        assert_eq!(entry.flags(), PageFlags::USER_PAGE);
        assert_eq!(entry.raw(), 0x0050_2007);
    }

    #[test]
    fn absent_entry_has_no_address() {
        assert!(!PageEntry::ABSENT.present());
        assert_eq!(PageEntry::ABSENT.address(), None);

        let mut entry = PageEntry::new(Physical::new(0x1000), PageFlags::KERNEL_PAGE);
        entry.clear();
        assert_eq!(entry, PageEntry::ABSENT);
    }

    #[test]
    fn composite_flags() {
        assert_eq!(PageFlags::KERNEL_PAGE.bits(), 0b011);
        assert_eq!(PageFlags::USER_PAGE.bits(), 0b111);
        assert_eq!(PageFlags::USER_PAGE_READ_ONLY.bits(), 0b101);
    }
}
