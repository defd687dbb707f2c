//! Boot handoff types. The boot stub (outside this crate) translates the
//! bootloader's memory map into a [`MemoryMap`] before handing control to
//! the memory manager.

use addr::phys::Physical;

/// Where allocatable physical memory is expected to begin. Everything below
/// the 16 MiB mark is written off wholesale: the legacy BIOS/real-mode
/// megabyte, the ISA DMA window and the option-ROM shadow ranges all live
/// down there and carving around them is not worth the complexity.
pub const MANAGED_MEMORY_START: u32 = 0x0100_0000;

/// The kind of a physical memory region reported by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Regular RAM, free for the kernel to use.
    Usable,

    /// Memory-mapped devices, firmware tables, or otherwise off-limits.
    Reserved,
}

/// One physical memory region of the boot memory map.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    pub start: Physical,
    pub length: u32,
    pub kind: RegionKind,
}

/// The boot-supplied physical memory map.
#[derive(Debug, Clone, Copy)]
pub struct MemoryMap<'a> {
    regions: &'a [Region],
}

impl<'a> MemoryMap<'a> {
    #[must_use]
    pub fn new(regions: &'a [Region]) -> Self {
        Self { regions }
    }

    #[must_use]
    pub fn regions(&self) -> &[Region] {
        self.regions
    }

    /// The end of managed physical memory: the end address of the first
    /// usable region that starts exactly at [`MANAGED_MEMORY_START`].
    ///
    /// This is a deliberate heuristic, not a general region merge: firmware
    /// on the machines this kernel targets always reports one large RAM
    /// region starting at the 16 MiB mark, and the first match wins even if
    /// a later region is larger. Returns `None` when no region qualifies,
    /// which the boot path treats as fatal.
    #[must_use]
    pub fn upper_bound(&self) -> Option<Physical> {
        self.regions
            .iter()
            .filter(|region| region.kind == RegionKind::Usable)
            .find(|region| region.start.as_u32() == MANAGED_MEMORY_START)
            .map(|region| {
                let end = u64::from(region.start.as_u32()) + u64::from(region.length);
                Physical::new(u32::try_from(end).unwrap_or(u32::MAX))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usable(start: u32, length: u32) -> Region {
        Region {
            start: Physical::new(start),
            length,
            kind: RegionKind::Usable,
        }
    }

    #[test]
    fn picks_the_first_qualifying_region() {
        let regions = [
            usable(0x0000_1000, 0x0009_0000),
            usable(MANAGED_MEMORY_START, 0x0100_0000),
            usable(MANAGED_MEMORY_START, 0x4000_0000),
        ];
        let map = MemoryMap::new(&regions);
        assert_eq!(map.upper_bound(), Some(Physical::new(0x0200_0000)));
    }

    #[test]
    fn ignores_reserved_regions_at_the_mark() {
        let regions = [
            Region {
                start: Physical::new(MANAGED_MEMORY_START),
                length: 0x0100_0000,
                kind: RegionKind::Reserved,
            },
            usable(MANAGED_MEMORY_START, 0x0200_0000),
        ];
        let map = MemoryMap::new(&regions);
        assert_eq!(map.upper_bound(), Some(Physical::new(0x0300_0000)));
    }

    #[test]
    fn no_region_at_the_mark() {
        let regions = [usable(0x0020_0000, 0x0100_0000)];
        assert_eq!(MemoryMap::new(&regions).upper_bound(), None);
        assert_eq!(MemoryMap::new(&[]).upper_bound(), None);
    }

    #[test]
    fn end_is_clamped_to_the_address_space() {
        let regions = [usable(MANAGED_MEMORY_START, u32::MAX)];
        let map = MemoryMap::new(&regions);
        assert_eq!(map.upper_bound(), Some(Physical::new(u32::MAX)));
    }
}
