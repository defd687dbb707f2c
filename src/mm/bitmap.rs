//! The physical page bitmap: one bit per page frame, packed into 32-bit
//! groups. Bit `n` set means physical page `n` is allocated, in other words
//! mapped into some address space.

use alloc::vec;
use alloc::vec::Vec;

/// The number of pages tracked by one bitmap group.
pub const GROUP_SIZE: usize = 32;

pub struct Bitmap {
    groups: Vec<u32>,
}

impl Bitmap {
    /// Create a bitmap tracking the given number of pages, all free. The
    /// page count is truncated down to a whole number of groups; the last
    /// few pages of an oddly-sized memory are simply never handed out.
    #[must_use]
    pub fn new(pages: usize) -> Self {
        Self {
            groups: vec![0; pages / GROUP_SIZE],
        }
    }

    /// The number of pages this bitmap tracks.
    #[must_use]
    pub fn pages(&self) -> usize {
        self.groups.len() * GROUP_SIZE
    }

    #[must_use]
    pub fn is_set(&self, page: usize) -> bool {
        self.groups[page / GROUP_SIZE] & (1 << (page % GROUP_SIZE)) != 0
    }

    /// The raw word of one group, as it is laid out in memory.
    #[must_use]
    pub fn group(&self, group: usize) -> u32 {
        self.groups[group]
    }

    pub fn set(&mut self, page: usize) {
        self.groups[page / GROUP_SIZE] |= 1 << (page % GROUP_SIZE);
    }

    pub fn clear(&mut self, page: usize) {
        self.groups[page / GROUP_SIZE] &= !(1 << (page % GROUP_SIZE));
    }

    /// The number of pages currently free.
    #[must_use]
    pub fn free_pages(&self) -> usize {
        self.groups
            .iter()
            .map(|group| group.count_zeros() as usize)
            .sum()
    }

    /// Find the first run of `pages` free pages, strict first-fit: groups
    /// are scanned in ascending order and, within a group, a window of
    /// `pages` bits is slid from bit 0 upwards.
    ///
    /// The window never crosses a group boundary, so a run that would only
    /// fit by straddling two adjacent groups is not found even though the
    /// pages are physically contiguous. Callers must treat runs wider than
    /// [`GROUP_SIZE`] as unsatisfiable.
    #[must_use]
    pub fn find_run(&self, pages: usize) -> Option<usize> {
        if pages == 0 || pages > GROUP_SIZE {
            return None;
        }

        let mask = if pages == GROUP_SIZE {
            u32::MAX
        } else {
            (1 << pages) - 1
        };

        for (index, &group) in self.groups.iter().enumerate() {
            if group == u32::MAX {
                continue;
            }

            let mut window = group;
            for bit in 0..=(GROUP_SIZE - pages) {
                if window & mask == 0 {
                    return Some(index * GROUP_SIZE + bit);
                }
                window >>= 1;
            }
        }
        None
    }
}
