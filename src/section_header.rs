// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::bytes;
use super::header::ElfClass;
use super::types::*;
use super::ElfError;
use bitflags::bitflags;

bitflags! {
    /// Section attribute flags from the `sh_flags` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Elf64ShdrFlags: Elf64Xword {
        const WRITE            = 0x001;
        const ALLOC            = 0x002;
        const EXECINSTR        = 0x004;
        const MERGE            = 0x010;
        const STRINGS          = 0x020;
        const INFO_LINK        = 0x040;
        const LINK_ORDER       = 0x080;
        const OS_NONCONFORMING = 0x100;
        const GROUP            = 0x200;
        const TLS              = 0x400;
        const COMPRESSED       = 0x800;
    }
}

/// An ELF section header, widened to the 64-bit field layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Elf64Shdr {
    pub sh_name: Elf64Word,
    pub sh_type: Elf64Word,
    pub sh_flags: Elf64Xword,
    pub sh_addr: Elf64Addr,
    pub sh_offset: Elf64Off,
    pub sh_size: Elf64Xword,
    pub sh_link: Elf64Word,
    pub sh_info: Elf64Word,
    pub sh_addralign: Elf64Xword,
    pub sh_entsize: Elf64Xword,
}

impl Elf64Shdr {
    pub const SHT_NULL: Elf64Word = 0;
    pub const SHT_PROGBITS: Elf64Word = 1;
    pub const SHT_SYMTAB: Elf64Word = 2;
    pub const SHT_STRTAB: Elf64Word = 3;
    pub const SHT_RELA: Elf64Word = 4;
    pub const SHT_NOBITS: Elf64Word = 8;
    pub const SHT_REL: Elf64Word = 9;
    pub const SHT_DYNSYM: Elf64Word = 11;
    pub const SHT_DYNAMIC: Elf64Word = 6;
    pub const SHT_NOTE: Elf64Word = 7;

    /// Reads one section header entry at `offset` within the raw file.
    pub fn read(class: ElfClass, buf: &[u8], offset: usize) -> Result<Self, ElfError> {
        let entry = bytes::subslice(buf, offset, class.shdr_entsize())?;
        Ok(match class {
            ElfClass::Elf32 => Self {
                sh_name: bytes::le_u32(entry, 0)?,
                sh_type: bytes::le_u32(entry, 4)?,
                sh_flags: bytes::le_u32(entry, 8)?.into(),
                sh_addr: bytes::le_u32(entry, 12)?.into(),
                sh_offset: bytes::le_u32(entry, 16)?.into(),
                sh_size: bytes::le_u32(entry, 20)?.into(),
                sh_link: bytes::le_u32(entry, 24)?,
                sh_info: bytes::le_u32(entry, 28)?,
                sh_addralign: bytes::le_u32(entry, 32)?.into(),
                sh_entsize: bytes::le_u32(entry, 36)?.into(),
            },
            ElfClass::Elf64 => Self {
                sh_name: bytes::le_u32(entry, 0)?,
                sh_type: bytes::le_u32(entry, 4)?,
                sh_flags: bytes::le_u64(entry, 8)?,
                sh_addr: bytes::le_u64(entry, 16)?,
                sh_offset: bytes::le_u64(entry, 24)?,
                sh_size: bytes::le_u64(entry, 32)?,
                sh_link: bytes::le_u32(entry, 40)?,
                sh_info: bytes::le_u32(entry, 44)?,
                sh_addralign: bytes::le_u64(entry, 48)?,
                sh_entsize: bytes::le_u64(entry, 56)?,
            },
        })
    }

    pub fn flags(&self) -> Elf64ShdrFlags {
        Elf64ShdrFlags::from_bits_retain(self.sh_flags)
    }

    pub fn is_alloc(&self) -> bool {
        self.flags().contains(Elf64ShdrFlags::ALLOC)
    }

    pub fn is_nobits(&self) -> bool {
        self.sh_type == Self::SHT_NOBITS
    }

    /// Checks the fields every section must satisfy regardless of its
    /// type: a file-backed section must lie within the file and must not
    /// overlap the ELF header.
    pub fn verify(&self, ehdr_size: usize, file_size: u64) -> Result<(), ElfError> {
        if !self.is_nobits() && self.sh_type != Self::SHT_NULL && self.sh_size != 0 {
            let end = self
                .sh_offset
                .checked_add(self.sh_size)
                .ok_or(ElfError::InvalidFileRange)?;
            if end > file_size || self.sh_offset < ehdr_size as u64 {
                return Err(ElfError::InvalidFileRange);
            }
        }
        Ok(())
    }
}

/// Loader-private bookkeeping attached to each section header slot.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ShdrExtra {
    /// Index of the dynamic entry that claimed this section, so a second
    /// claim can be rejected.
    pub dyn_index: Option<u16>,
}
