//! x86 protected-mode specifics: segment selectors, the saved-context image
//! the trap-return path expects, and the bare-metal [`Platform`].

use crate::config;
use addr::virt::Virtual;

/// A segment selector. The GDT layout is fixed by the boot stub: kernel code
/// and data in the first two slots after the null descriptor, user code and
/// data after them with requested privilege level 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selector(pub u16);

impl Selector {
    pub const KERNEL_CODE: Selector = Selector(0x08);
    pub const KERNEL_DATA: Selector = Selector(0x10);
    pub const USER_CODE: Selector = Selector(0x1B);
    pub const USER_DATA: Selector = Selector(0x23);
}

/// The saved-context image of a suspended task, laid out exactly as the
/// trap-return path consumes it: it pops the segment registers and the
/// general registers, then executes `iret` against the five words at the
/// top. Fields appear in ascending memory order, so the restore order is
/// field order.
///
/// A new task's stack is seeded with one of these, which is what makes the
/// very first resume of a task indistinguishable from resuming a task that
/// was suspended by a timer interrupt: there is no special-cased first run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    pub gs: u32,
    pub es: u32,
    pub fs: u32,
    pub ds: u32,
    pub saved_eflags: u32,
    pub ebp: u32,
    pub edi: u32,
    pub esi: u32,
    pub edx: u32,
    pub ecx: u32,
    pub ebx: u32,
    pub eax: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
}

impl TrapFrame {
    /// The number of 32-bit words in the image.
    pub const WORDS: usize = 17;

    /// The size of the image on the stack, in bytes.
    pub const BYTES: u32 = (Self::WORDS * 4) as u32;

    /// Build the initial image of a task that has never run: general
    /// registers zeroed, the frame pointer and stack pointer at the stack
    /// top, interrupts armed, and the segment selectors of the requested
    /// privilege ring.
    #[must_use]
    pub fn initial(entry: Virtual, stack_top: Virtual, code: Selector, data: Selector) -> Self {
        Self {
            gs: u32::from(data.0),
            es: u32::from(data.0),
            fs: u32::from(data.0),
            ds: u32::from(data.0),
            saved_eflags: config::INITIAL_EFLAGS,
            ebp: stack_top.as_u32(),
            edi: 0,
            esi: 0,
            edx: 0,
            ecx: 0,
            ebx: 0,
            eax: 0,
            eip: entry.as_u32(),
            cs: u32::from(code.0),
            eflags: config::INITIAL_EFLAGS,
            esp: stack_top.as_u32(),
            ss: u32::from(data.0),
        }
    }

    /// The words of the image in ascending memory order.
    #[must_use]
    pub fn words(&self) -> [u32; Self::WORDS] {
        [
            self.gs,
            self.es,
            self.fs,
            self.ds,
            self.saved_eflags,
            self.ebp,
            self.edi,
            self.esi,
            self.edx,
            self.ecx,
            self.ebx,
            self.eax,
            self.eip,
            self.cs,
            self.eflags,
            self.esp,
            self.ss,
        ]
    }

    /// Serialize the image into `out`, which must be at least
    /// [`Self::BYTES`] bytes long.
    pub fn write_to(&self, out: &mut [u8]) {
        for (index, word) in self.words().iter().enumerate() {
            out[index * 4..index * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
    }
}

/// The real machine. Relies on the kernel identity-mapping invariant: every
/// physical frame the core touches is mapped at its own address, so frame
/// accesses are plain dereferences.
#[cfg(target_arch = "x86")]
#[derive(Debug, Default)]
pub struct Bare;

#[cfg(target_arch = "x86")]
impl super::Platform for Bare {
    fn invalidate(&mut self, address: Virtual) {
        unsafe {
            core::arch::asm!(
                "invlpg [{address}]",
                address = in(reg) address.as_usize(),
                options(nostack, preserves_flags),
            );
        }
    }

    fn enable_paging(&mut self, directory: addr::phys::Physical) {
        unsafe {
            core::arch::asm!(
                "mov cr3, {directory}",
                "mov {scratch}, cr0",
                "or {scratch}, 0x80000000",
                "mov cr0, {scratch}",
                directory = in(reg) directory.as_usize(),
                scratch = out(reg) _,
                options(nostack),
            );
        }
    }

    fn frame(&self, frame: addr::frame::Frame) -> &[u8] {
        unsafe {
            core::slice::from_raw_parts(
                frame.addr().as_usize() as *const u8,
                addr::frame::Frame::SIZE,
            )
        }
    }

    fn frame_mut(&mut self, frame: addr::frame::Frame) -> &mut [u8] {
        unsafe {
            core::slice::from_raw_parts_mut(
                frame.addr().as_usize() as *mut u8,
                addr::frame::Frame::SIZE,
            )
        }
    }
}
