// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::bytes;
use super::section_header::Elf64Shdr;
use super::types::*;
use super::ElfError;

/// The word width an image was built for. Selected from the identification
/// bytes and the only place where the 32/64-bit structure layouts differ;
/// everything past the parsing boundary works on widened 64-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

impl ElfClass {
    pub const fn ehdr_size(self) -> usize {
        match self {
            Self::Elf32 => 52,
            Self::Elf64 => 64,
        }
    }

    pub const fn shdr_entsize(self) -> usize {
        match self {
            Self::Elf32 => 40,
            Self::Elf64 => 64,
        }
    }

    pub const fn phdr_entsize(self) -> usize {
        match self {
            Self::Elf32 => 32,
            Self::Elf64 => 56,
        }
    }

    pub const fn sym_entsize(self) -> usize {
        match self {
            Self::Elf32 => 16,
            Self::Elf64 => 24,
        }
    }

    pub const fn dyn_entsize(self) -> usize {
        match self {
            Self::Elf32 => 8,
            Self::Elf64 => 16,
        }
    }

    pub const fn rel_entsize(self) -> usize {
        match self {
            Self::Elf32 => 8,
            Self::Elf64 => 16,
        }
    }

    pub const fn rela_entsize(self) -> usize {
        match self {
            Self::Elf32 => 12,
            Self::Elf64 => 24,
        }
    }

    pub const fn rel_entsize_for(self, with_addend: bool) -> usize {
        if with_addend {
            self.rela_entsize()
        } else {
            self.rel_entsize()
        }
    }
}

/// Supported target architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfMachine {
    /// 32-bit x86 (EM_386 and EM_486).
    X86,
    /// 64-bit x86 (EM_X86_64).
    Amd64,
}

impl ElfMachine {
    const EM_386: Elf64Half = 3;
    const EM_486: Elf64Half = 6;
    const EM_X86_64: Elf64Half = 62;

    fn from_e_machine(class: ElfClass, e_machine: Elf64Half) -> Result<Self, ElfError> {
        let (machine, natural) = match e_machine {
            Self::EM_386 | Self::EM_486 => (Self::X86, ElfClass::Elf32),
            Self::EM_X86_64 => (Self::Amd64, ElfClass::Elf64),
            _ => return Err(ElfError::UnsupportedMachine),
        };
        if natural != class {
            return Err(ElfError::MachineMismatch);
        }
        Ok(machine)
    }

    /// The section type of this architecture's natural relocation
    /// convention: addend-less SHT_REL streams on x86, addend-carrying
    /// SHT_RELA streams on x86-64.
    pub(crate) fn reloc_section_type(self) -> Elf64Word {
        match self {
            Self::X86 => Elf64Shdr::SHT_REL,
            Self::Amd64 => Elf64Shdr::SHT_RELA,
        }
    }

    pub(crate) fn relocs_have_addend(self) -> bool {
        matches!(self, Self::Amd64)
    }
}

/// The fixed-size ELF file header, widened to the 64-bit field layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Elf64Hdr {
    pub e_ident: [Elf64char; 16],
    pub e_type: Elf64Half,
    pub e_machine: Elf64Half,
    pub e_version: Elf64Word,
    pub e_entry: Elf64Addr,
    pub e_phoff: Elf64Off,
    pub e_shoff: Elf64Off,
    pub e_flags: Elf64Word,
    pub e_ehsize: Elf64Half,
    pub e_phentsize: Elf64Half,
    pub e_phnum: Elf64Half,
    pub e_shentsize: Elf64Half,
    pub e_shnum: Elf64Word,
    pub e_shstrndx: Elf64Word,
}

impl Elf64Hdr {
    const EI_MAG0: usize = 0;
    const EI_CLASS: usize = 4;
    const EI_DATA: usize = 5;
    const EI_VERSION: usize = 6;

    const ELFMAG: [Elf64char; 4] = [0x7f, b'E', b'L', b'F'];

    const ELFCLASS32: Elf64char = 1;
    const ELFCLASS64: Elf64char = 2;

    const ELFDATA2LSB: Elf64char = 1;

    const EV_CURRENT: Elf64Word = 1;

    pub const ET_REL: Elf64Half = 1;
    pub const ET_EXEC: Elf64Half = 2;
    pub const ET_DYN: Elf64Half = 3;

    /// Reads and validates a file header from the start of the raw image.
    ///
    /// Checks the identification bytes (magic, class, endianness, format
    /// version), matches the machine against the class, verifies the
    /// self-declared header/entry sizes against the width constants, and
    /// checks that both header tables lie within the file without
    /// overlapping the ELF header itself. Each violated field is reported
    /// with its own [`ElfError`] variant.
    ///
    /// On success returns the widened header together with the parsing
    /// profile for the rest of the image.
    pub fn read(buf: &[u8], file_size: u64) -> Result<(Self, ElfClass, ElfMachine), ElfError> {
        if buf.len() < 16 {
            return Err(ElfError::FileTooShort);
        }
        let e_ident: [Elf64char; 16] = buf[..16].try_into().unwrap();
        if e_ident[Self::EI_MAG0..Self::EI_MAG0 + Self::ELFMAG.len()] != Self::ELFMAG {
            return Err(ElfError::UnrecognizedMagic);
        }
        let class = match e_ident[Self::EI_CLASS] {
            Self::ELFCLASS32 => ElfClass::Elf32,
            Self::ELFCLASS64 => ElfClass::Elf64,
            _ => return Err(ElfError::UnsupportedClass),
        };
        if e_ident[Self::EI_DATA] != Self::ELFDATA2LSB {
            return Err(ElfError::UnsupportedEndianess);
        }
        if e_ident[Self::EI_VERSION] != Self::EV_CURRENT as Elf64char {
            return Err(ElfError::UnsupportedVersion);
        }

        if buf.len() < class.ehdr_size() {
            return Err(ElfError::FileTooShort);
        }
        let hdr = match class {
            ElfClass::Elf32 => Self {
                e_ident,
                e_type: bytes::le_u16(buf, 16)?,
                e_machine: bytes::le_u16(buf, 18)?,
                e_version: bytes::le_u32(buf, 20)?,
                e_entry: bytes::le_u32(buf, 24)?.into(),
                e_phoff: bytes::le_u32(buf, 28)?.into(),
                e_shoff: bytes::le_u32(buf, 32)?.into(),
                e_flags: bytes::le_u32(buf, 36)?,
                e_ehsize: bytes::le_u16(buf, 40)?,
                e_phentsize: bytes::le_u16(buf, 42)?,
                e_phnum: bytes::le_u16(buf, 44)?,
                e_shentsize: bytes::le_u16(buf, 46)?,
                e_shnum: bytes::le_u16(buf, 48)?.into(),
                e_shstrndx: bytes::le_u16(buf, 50)?.into(),
            },
            ElfClass::Elf64 => Self {
                e_ident,
                e_type: bytes::le_u16(buf, 16)?,
                e_machine: bytes::le_u16(buf, 18)?,
                e_version: bytes::le_u32(buf, 20)?,
                e_entry: bytes::le_u64(buf, 24)?,
                e_phoff: bytes::le_u64(buf, 32)?,
                e_shoff: bytes::le_u64(buf, 40)?,
                e_flags: bytes::le_u32(buf, 48)?,
                e_ehsize: bytes::le_u16(buf, 52)?,
                e_phentsize: bytes::le_u16(buf, 54)?,
                e_phnum: bytes::le_u16(buf, 56)?,
                e_shentsize: bytes::le_u16(buf, 58)?,
                e_shnum: bytes::le_u16(buf, 60)?.into(),
                e_shstrndx: bytes::le_u16(buf, 62)?.into(),
            },
        };

        let machine = ElfMachine::from_e_machine(class, hdr.e_machine)?;
        if hdr.e_version != Self::EV_CURRENT {
            return Err(ElfError::UnsupportedVersion);
        }
        match hdr.e_type {
            Self::ET_REL | Self::ET_EXEC | Self::ET_DYN => (),
            _ => return Err(ElfError::UnsupportedType),
        }

        if usize::from(hdr.e_ehsize) != class.ehdr_size() {
            return Err(ElfError::InvalidHdrSize);
        }
        if usize::from(hdr.e_shentsize) != class.shdr_entsize() {
            return Err(ElfError::InvalidShdrSize);
        }
        if usize::from(hdr.e_phentsize) != class.phdr_entsize()
            && (hdr.e_phnum != 0 || hdr.e_type == Self::ET_EXEC || hdr.e_type == Self::ET_DYN)
        {
            return Err(ElfError::InvalidPhdrSize);
        }

        hdr.check_table(hdr.e_phoff, hdr.e_phnum.into(), class.phdr_entsize(), file_size)?;
        hdr.check_table(hdr.e_shoff, hdr.e_shnum, class.shdr_entsize(), file_size)?;

        if hdr.e_shstrndx == 0 || hdr.e_shstrndx >= hdr.e_shnum {
            return Err(ElfError::InvalidSectionIndex);
        }

        Ok((hdr, class, machine))
    }

    /// A header table must lie within the file and must not start inside
    /// the ELF header.
    fn check_table(
        &self,
        offset: Elf64Off,
        count: Elf64Word,
        entsize: usize,
        file_size: u64,
    ) -> Result<(), ElfError> {
        if count == 0 {
            return Ok(());
        }
        if offset < self.e_ehsize.into() {
            return Err(ElfError::InvalidFileRange);
        }
        let size = (count as u64)
            .checked_mul(entsize as u64)
            .ok_or(ElfError::InvalidFileRange)?;
        let end = offset.checked_add(size).ok_or(ElfError::InvalidFileRange)?;
        if end > file_size {
            return Err(ElfError::InvalidFileRange);
        }
        Ok(())
    }
}
