//! The boundary between the portable kernel core and the machine.
//!
//! Everything the memory manager and the scheduler need from the hardware is
//! funneled through the [`Platform`] trait: translation-cache maintenance,
//! switching paging on, and raw access to physical frames. The selection
//! logic above this seam is written once and is architecture-agnostic; the
//! register-level encodings live in [`x86`], and [`sim`] provides a pure
//! software platform for the test suite.

use addr::{frame::Frame, phys::Physical, virt::Virtual};

pub mod sim;
pub mod x86;

/// The services the kernel core requires from the machine it runs on.
pub trait Platform {
    /// Invalidate any cached translation for the given virtual address. The
    /// page-table mutators call this after every entry write.
    fn invalidate(&mut self, address: Virtual);

    /// Load the given page directory as the active one and enable paging.
    /// Called exactly once, at the end of memory-manager construction.
    fn enable_paging(&mut self, directory: Physical);

    /// The bytes of a physical frame, for reading. The slice is always
    /// [`Frame::SIZE`] bytes long.
    fn frame(&self, frame: Frame) -> &[u8];

    /// The bytes of a physical frame, for writing.
    fn frame_mut(&mut self, frame: Frame) -> &mut [u8];
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86")] {
        /// The platform the kernel boots on by default.
        pub type BootPlatform = x86::Bare;
    } else {
        /// Off-target builds (and the test suite) run against the simulator.
        pub type BootPlatform = sim::Sim;
    }
}
