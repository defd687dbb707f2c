//! The ELF program loader.
//!
//! Only statically linked ELF32 executables for this machine are accepted,
//! linked at the start of the user window. Validation happens up front, in
//! a fixed order, before any memory is touched: a rejected image leaves the
//! memory manager and the address space exactly as they were.

use crate::arch::Platform;
use crate::config::USER_BASE;
use crate::mm::paging::{PageFlags, PAGE_SIZE};
use crate::mm::space::AddressSpace;
use crate::mm::{AllocError, Manager};
use addr::{frame::Frame, virt::Virtual};
use core::num::TryFromIntError;
use elf::{endian::LittleEndian, ElfBytes};

// Byte offsets within the identification array.
const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;
const EI_VERSION: usize = 6;
const EI_NIDENT: usize = 16;

/// Error that can occur when loading an ELF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The file does not begin with the ELF magic, so it is not an ELF
    /// file at all.
    InvalidMagic,

    /// An ELF file, but truncated or inconsistent past the magic.
    Malformed,
    UnsupportedClass,
    UnsupportedEndianness,
    UnsupportedVersion,
    UnsupportedArchitecture,
    UnsupportedType,

    /// A loadable segment is misaligned, truncated, inconsistent or does
    /// not fit in the user window.
    InvalidSegment,

    /// The entry point is not the start of the user window.
    BadEntryPoint,
    OutOfMemory,
}

impl From<elf::ParseError> for LoadError {
    fn from(_: elf::ParseError) -> Self {
        LoadError::Malformed
    }
}

impl From<TryFromIntError> for LoadError {
    fn from(_: TryFromIntError) -> Self {
        LoadError::InvalidSegment
    }
}

impl From<AllocError> for LoadError {
    fn from(error: AllocError) -> Self {
        match error {
            AllocError::OutOfMemory => LoadError::OutOfMemory,
            AllocError::OutOfRange => LoadError::InvalidSegment,
        }
    }
}

/// Parse an ELF file, map its loadable segments into the given address
/// space, and return the entry point.
///
/// # Errors
/// Returns a `LoadError` if the image is rejected. Validation precedes
/// allocation, so a failed load maps nothing.
pub fn load<P: Platform>(
    mm: &mut Manager,
    platform: &mut P,
    space: &mut AddressSpace,
    file: &[u8],
) -> Result<Virtual, LoadError> {
    check_ident(file)?;
    let elf = check_elf(ElfBytes::<LittleEndian>::minimal_parse(file)?)?;

    let entry = u32::try_from(elf.ehdr.e_entry).map_err(|_| LoadError::BadEntryPoint)?;
    if entry != USER_BASE {
        return Err(LoadError::BadEntryPoint);
    }

    let segments = elf.segments().ok_or(LoadError::Malformed)?;
    for phdr in segments
        .iter()
        .filter(|phdr| phdr.p_type == elf::abi::PT_LOAD)
    {
        let vaddr = Virtual::new(u32::try_from(phdr.p_vaddr)?);
        let memsz = u32::try_from(phdr.p_memsz)?;
        let filesz = usize::try_from(phdr.p_filesz)?;
        let offset = usize::try_from(phdr.p_offset)?;

        if memsz == 0 {
            continue;
        }
        if !vaddr.is_page_aligned() || filesz as u64 > u64::from(memsz) {
            return Err(LoadError::InvalidSegment);
        }
        let end = offset.checked_add(filesz).ok_or(LoadError::InvalidSegment)?;
        if end > file.len() {
            return Err(LoadError::InvalidSegment);
        }

        // Frames come back zeroed, so anything past p_filesz is already
        // the zero fill the format asks for
        let location = space.allocate_memory(
            mm,
            platform,
            memsz,
            vaddr,
            PageFlags::USER_PAGE_READ_ONLY,
        )?;
        let mut remaining = &file[offset..end];
        let mut page = 0;
        while !remaining.is_empty() {
            let size = remaining.len().min(Frame::SIZE);
            let frame = Frame::new(location + page * PAGE_SIZE);
            platform.frame_mut(frame)[..size].copy_from_slice(&remaining[..size]);
            remaining = &remaining[size..];
            page += 1;
        }
    }

    Ok(Virtual::new(entry))
}

/// Validate the identification bytes before handing the file to the
/// parser, so each way an image can be foreign gets its own error.
fn check_ident(file: &[u8]) -> Result<(), LoadError> {
    let magic = [
        elf::abi::ELFMAG0,
        elf::abi::ELFMAG1,
        elf::abi::ELFMAG2,
        elf::abi::ELFMAG3,
    ];
    if file.len() < magic.len() || file[..magic.len()] != magic {
        return Err(LoadError::InvalidMagic);
    }

    let ident = file.get(..EI_NIDENT).ok_or(LoadError::Malformed)?;
    if ident[EI_CLASS] != elf::abi::ELFCLASS32 {
        return Err(LoadError::UnsupportedClass);
    }
    if ident[EI_DATA] != elf::abi::ELFDATA2LSB {
        return Err(LoadError::UnsupportedEndianness);
    }
    if ident[EI_VERSION] != 1 {
        return Err(LoadError::UnsupportedVersion);
    }
    Ok(())
}

fn check_elf(elf: ElfBytes<LittleEndian>) -> Result<ElfBytes<LittleEndian>, LoadError> {
    if elf.ehdr.e_machine != elf::abi::EM_386 {
        return Err(LoadError::UnsupportedArchitecture);
    }
    if elf.ehdr.e_type != elf::abi::ET_EXEC {
        return Err(LoadError::UnsupportedType);
    }
    Ok(elf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::tests::test_manager;
    use alloc::vec::Vec;

    /// Build a minimal statically linked ELF32 executable with one loadable
    /// segment at the start of the user window.
    pub(crate) fn minimal_elf(payload: &[u8], memsz: u32) -> Vec<u8> {
        let mut file = Vec::new();

        // identification
        file.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1]);
        file.extend_from_slice(&[0; 9]);

        // header: one program header directly after the 52 header bytes
        file.extend_from_slice(&2u16.to_le_bytes()); // e_type: ET_EXEC
        file.extend_from_slice(&3u16.to_le_bytes()); // e_machine: EM_386
        file.extend_from_slice(&1u32.to_le_bytes()); // e_version
        file.extend_from_slice(&USER_BASE.to_le_bytes()); // e_entry
        file.extend_from_slice(&52u32.to_le_bytes()); // e_phoff
        file.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        file.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        file.extend_from_slice(&52u16.to_le_bytes()); // e_ehsize
        file.extend_from_slice(&32u16.to_le_bytes()); // e_phentsize
        file.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        file.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
        file.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        file.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

        // program header: payload sits directly after it, at offset 84
        file.extend_from_slice(&1u32.to_le_bytes()); // p_type: PT_LOAD
        file.extend_from_slice(&84u32.to_le_bytes()); // p_offset
        file.extend_from_slice(&USER_BASE.to_le_bytes()); // p_vaddr
        file.extend_from_slice(&0u32.to_le_bytes()); // p_paddr
        file.extend_from_slice(&(payload.len() as u32).to_le_bytes()); // p_filesz
        file.extend_from_slice(&memsz.to_le_bytes()); // p_memsz
        file.extend_from_slice(&5u32.to_le_bytes()); // p_flags: R | X
        file.extend_from_slice(&0x1000u32.to_le_bytes()); // p_align

        file.extend_from_slice(payload);
        file
    }

    #[test]
    fn loads_a_program() {
        let (mut mm, mut sim) = test_manager(0x0100_0000);
        let mut space = AddressSpace::new();
        let payload: Vec<u8> = (0..200u32).map(|byte| byte as u8).collect();
        let file = minimal_elf(&payload, payload.len() as u32);

        let entry = load(&mut mm, &mut sim, &mut space, &file).unwrap();
        assert_eq!(entry, Virtual::new(USER_BASE));

        let location = space.location().unwrap();
        assert_eq!(mm.resolve(Virtual::new(USER_BASE)), Some(location));
        assert_eq!(
            mm.entry(Virtual::new(USER_BASE)).flags(),
            PageFlags::USER_PAGE_READ_ONLY
        );
        assert_eq!(
            &sim.frame(Frame::new(location))[..payload.len()],
            &payload[..]
        );
    }

    #[test]
    fn zero_fills_past_the_file_image() {
        let (mut mm, mut sim) = test_manager(0x0100_0000);
        let mut space = AddressSpace::new();
        let payload = [0xFFu8; 100];
        let file = minimal_elf(&payload, PAGE_SIZE * 2);

        load(&mut mm, &mut sim, &mut space, &file).unwrap();

        let location = space.location().unwrap();
        assert_eq!(space.pages(), 2);
        let first = sim.frame(Frame::new(location));
        assert!(first[payload.len()..].iter().all(|&byte| byte == 0));
        let second = sim.frame(Frame::new(location + PAGE_SIZE));
        assert!(second.iter().all(|&byte| byte == 0));
    }

    #[test]
    fn spans_multiple_pages() {
        let (mut mm, mut sim) = test_manager(0x0100_0000);
        let mut space = AddressSpace::new();
        let payload: Vec<u8> = (0..PAGE_SIZE + 500).map(|byte| (byte % 251) as u8).collect();
        let file = minimal_elf(&payload, payload.len() as u32);

        load(&mut mm, &mut sim, &mut space, &file).unwrap();

        let location = space.location().unwrap();
        assert_eq!(
            sim.frame(Frame::new(location)),
            &payload[..Frame::SIZE]
        );
        assert_eq!(
            &sim.frame(Frame::new(location + PAGE_SIZE))[..500],
            &payload[Frame::SIZE..]
        );
    }

    #[test]
    fn rejects_foreign_images_without_touching_memory() {
        let (mut mm, mut sim) = test_manager(0x0100_0000);
        let free = mm.free_pages();
        let pristine = minimal_elf(&[0x90; 16], 16);

        let cases: [(usize, u8, LoadError); 5] = [
            (0, 0x7E, LoadError::InvalidMagic),
            (EI_CLASS, 2, LoadError::UnsupportedClass),
            (EI_DATA, 2, LoadError::UnsupportedEndianness),
            (EI_VERSION, 0, LoadError::UnsupportedVersion),
            (18, 0x3E, LoadError::UnsupportedArchitecture),
        ];
        for (offset, value, expected) in cases {
            let mut space = AddressSpace::new();
            let mut file = pristine.clone();
            file[offset] = value;
            assert_eq!(
                load(&mut mm, &mut sim, &mut space, &file),
                Err(expected)
            );
            assert_eq!(space.location(), None);
        }
        assert_eq!(mm.free_pages(), free);
        assert_eq!(mm.resolve(Virtual::new(USER_BASE)), None);
    }

    #[test]
    fn rejects_non_executables() {
        let (mut mm, mut sim) = test_manager(0x0100_0000);
        let mut space = AddressSpace::new();
        let mut file = minimal_elf(&[0x90; 16], 16);
        file[16] = 3; // ET_DYN
        assert_eq!(
            load(&mut mm, &mut sim, &mut space, &file),
            Err(LoadError::UnsupportedType)
        );
    }

    #[test]
    fn rejects_an_entry_point_away_from_the_window_start() {
        let (mut mm, mut sim) = test_manager(0x0100_0000);
        let mut space = AddressSpace::new();
        let mut file = minimal_elf(&[0x90; 16], 16);
        file[24..28].copy_from_slice(&(USER_BASE + 0x1000).to_le_bytes());
        assert_eq!(
            load(&mut mm, &mut sim, &mut space, &file),
            Err(LoadError::BadEntryPoint)
        );
        assert_eq!(mm.resolve(Virtual::new(USER_BASE)), None);
    }

    #[test]
    fn rejects_a_segment_that_escapes_the_file() {
        let (mut mm, mut sim) = test_manager(0x0100_0000);
        let free = mm.free_pages();
        let mut space = AddressSpace::new();
        let mut file = minimal_elf(&[0x90; 16], PAGE_SIZE);
        file[68..72].copy_from_slice(&0x1000u32.to_le_bytes()); // p_filesz
        assert_eq!(
            load(&mut mm, &mut sim, &mut space, &file),
            Err(LoadError::InvalidSegment)
        );
        assert_eq!(mm.free_pages(), free);
    }

    #[test]
    fn rejects_a_misaligned_segment() {
        let (mut mm, mut sim) = test_manager(0x0100_0000);
        let mut space = AddressSpace::new();
        let mut file = minimal_elf(&[0x90; 16], 16);
        file[60..64].copy_from_slice(&(USER_BASE + 4).to_le_bytes()); // p_vaddr
        assert_eq!(
            load(&mut mm, &mut sim, &mut space, &file),
            Err(LoadError::InvalidSegment)
        );
    }

    #[test]
    fn truncated_files_are_told_apart_from_foreign_ones() {
        let (mut mm, mut sim) = test_manager(0x0100_0000);
        let mut space = AddressSpace::new();

        // too short for the magic: not an ELF file at all
        assert_eq!(
            load(&mut mm, &mut sim, &mut space, &[0x7F, b'E']),
            Err(LoadError::InvalidMagic)
        );

        // valid magic, cut off before the header ends: malformed ELF
        let pristine = minimal_elf(&[0x90; 16], 16);
        assert_eq!(
            load(&mut mm, &mut sim, &mut space, &pristine[..12]),
            Err(LoadError::Malformed)
        );
        assert_eq!(
            load(&mut mm, &mut sim, &mut space, &pristine[..40]),
            Err(LoadError::Malformed)
        );
    }
}
