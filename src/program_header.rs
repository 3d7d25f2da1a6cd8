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
    /// Segment permission flags from the `p_flags` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Elf64PhdrFlags: Elf64Word {
        const EXECUTE = 0x1;
        const WRITE   = 0x2;
        const READ    = 0x4;
    }
}

/// An ELF program header, widened to the 64-bit field layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Elf64Phdr {
    pub p_type: Elf64Word,
    pub p_flags: Elf64Word,
    pub p_offset: Elf64Off,
    pub p_vaddr: Elf64Addr,
    pub p_paddr: Elf64Addr,
    pub p_filesz: Elf64Xword,
    pub p_memsz: Elf64Xword,
    pub p_align: Elf64Xword,
}

impl Elf64Phdr {
    pub const PT_NULL: Elf64Word = 0;
    pub const PT_LOAD: Elf64Word = 1;
    pub const PT_DYNAMIC: Elf64Word = 2;

    /// Reads one program header entry at `offset` within the raw file.
    /// The flags word sits at the end of the 32-bit layout but right
    /// after the type in the 64-bit one.
    pub fn read(class: ElfClass, buf: &[u8], offset: usize) -> Result<Self, ElfError> {
        let entry = bytes::subslice(buf, offset, class.phdr_entsize())?;
        Ok(match class {
            ElfClass::Elf32 => Self {
                p_type: bytes::le_u32(entry, 0)?,
                p_offset: bytes::le_u32(entry, 4)?.into(),
                p_vaddr: bytes::le_u32(entry, 8)?.into(),
                p_paddr: bytes::le_u32(entry, 12)?.into(),
                p_filesz: bytes::le_u32(entry, 16)?.into(),
                p_memsz: bytes::le_u32(entry, 20)?.into(),
                p_flags: bytes::le_u32(entry, 24)?,
                p_align: bytes::le_u32(entry, 28)?.into(),
            },
            ElfClass::Elf64 => Self {
                p_type: bytes::le_u32(entry, 0)?,
                p_flags: bytes::le_u32(entry, 4)?,
                p_offset: bytes::le_u64(entry, 8)?,
                p_vaddr: bytes::le_u64(entry, 16)?,
                p_paddr: bytes::le_u64(entry, 24)?,
                p_filesz: bytes::le_u64(entry, 32)?,
                p_memsz: bytes::le_u64(entry, 40)?,
                p_align: bytes::le_u64(entry, 48)?,
            },
        })
    }

    pub fn flags(&self) -> Elf64PhdrFlags {
        Elf64PhdrFlags::from_bits_retain(self.p_flags)
    }
}
