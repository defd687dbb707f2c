//! A software platform. Physical frames live in a sparse map and are
//! created zero-filled on first touch; translation-cache invalidations and
//! the paging switch are recorded instead of executed. This is enough to
//! exercise the memory manager, the scheduler and the loader without
//! booting real hardware.

use super::Platform;
use addr::{
    frame::{self, Frame},
    phys::Physical,
    virt::Virtual,
};
use alloc::{boxed::Box, vec::Vec};
use hashbrown::HashMap;

/// A page of zeroes, handed out when a frame is read before it was ever
/// written. Mirrors the allocator guarantee that fresh frames are zeroed.
static ZERO_FRAME: [u8; Frame::SIZE] = [0; Frame::SIZE];

#[derive(Default)]
pub struct Sim {
    frames: HashMap<frame::Index, Box<[u8; Frame::SIZE]>>,
    invalidations: Vec<Virtual>,
    directory: Option<Physical>,
}

impl Sim {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `enable_paging` has been called, and with which directory.
    #[must_use]
    pub fn directory(&self) -> Option<Physical> {
        self.directory
    }

    #[must_use]
    pub fn paging_enabled(&self) -> bool {
        self.directory.is_some()
    }

    /// Every invalidation requested so far, in order.
    #[must_use]
    pub fn invalidations(&self) -> &[Virtual] {
        &self.invalidations
    }

    /// The number of frames that have actually been materialized.
    #[must_use]
    pub fn touched_frames(&self) -> usize {
        self.frames.len()
    }
}

impl Platform for Sim {
    fn invalidate(&mut self, address: Virtual) {
        self.invalidations.push(address);
    }

    fn enable_paging(&mut self, directory: Physical) {
        self.directory = Some(directory);
    }

    fn frame(&self, frame: Frame) -> &[u8] {
        self.frames
            .get(&frame.index())
            .map_or(&ZERO_FRAME[..], |bytes| &bytes[..])
    }

    fn frame_mut(&mut self, frame: Frame) -> &mut [u8] {
        &mut self
            .frames
            .entry(frame.index())
            .or_insert_with(|| Box::new([0; Frame::SIZE]))[..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_zeroed_on_first_touch() {
        let mut sim = Sim::new();
        let frame = Frame::new(Physical::new(0x5000));

        assert!(sim.frame(frame).iter().all(|&byte| byte == 0));
        sim.frame_mut(frame)[0] = 0xAB;
        assert_eq!(sim.frame(frame)[0], 0xAB);
        assert_eq!(sim.touched_frames(), 1);
    }

    #[test]
    fn records_paging_state() {
        let mut sim = Sim::new();
        assert!(!sim.paging_enabled());

        sim.enable_paging(Physical::new(0x0010_0000));
        sim.invalidate(Virtual::new(0x1000));

        assert_eq!(sim.directory(), Some(Physical::new(0x0010_0000)));
        assert_eq!(sim.invalidations(), &[Virtual::new(0x1000)]);
    }
}
