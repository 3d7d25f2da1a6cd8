// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::bytes;
use super::image::ElfImage;
use super::relocation::{read_implicit_addend, Elf64Reloc, RelocKind};
use super::section_header::Elf64Shdr;
use super::types::*;
use super::ElfError;
use alloc::vec::Vec;

/// What a debug info blob contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugInfoKind<'a> {
    /// A DWARF section embedded in the image.
    Dwarf { section_name: &'a str },
    /// A `.gnu_debuglink` pointer to an external debug file, with the
    /// CRC32 of that file.
    DebugLink { filename: &'a str, crc: u32 },
}

/// One debug info blob, as reported by
/// [`enumerate_debug_info`](ElfImage::enumerate_debug_info). The id,
/// offset and size together identify the blob to
/// [`read_debug_info`](ElfImage::read_debug_info).
#[derive(Debug, Clone, Copy)]
pub struct ElfDebugInfo<'a> {
    pub id: u32,
    pub file_offset: Elf64Off,
    pub size: Elf64Xword,
    pub kind: DebugInfoKind<'a>,
}

const NT_GNU_BUILD_ID: Elf64Word = 3;

impl ElfImage<'_> {
    /// Visits the debug information carried by the image: embedded DWARF
    /// sections and `.gnu_debuglink` references to external files.
    pub fn enumerate_debug_info(
        &self,
        cb: &mut dyn FnMut(&ElfDebugInfo<'_>) -> Result<(), ElfError>,
    ) -> Result<(), ElfError> {
        for (idx, shdr) in self.org_shdrs.iter().enumerate().skip(1) {
            if shdr.is_alloc() || shdr.sh_type != Elf64Shdr::SHT_PROGBITS {
                continue;
            }
            let name = self.section_name(shdr)?;
            let kind = if name.starts_with(".debug_") || name == ".WATCOM_references" {
                DebugInfoKind::Dwarf { section_name: name }
            } else if name == ".gnu_debuglink" {
                let (filename, crc) = self.parse_debug_link(idx)?;
                DebugInfoKind::DebugLink { filename, crc }
            } else {
                continue;
            };
            cb(&ElfDebugInfo {
                id: (idx - 1) as u32,
                file_offset: shdr.sh_offset,
                size: shdr.sh_size,
                kind,
            })?;
        }
        Ok(())
    }

    /// A debug link is a NUL-terminated file name padded to a 4-byte
    /// boundary, followed by the CRC32 of the named file.
    fn parse_debug_link(&self, idx: usize) -> Result<(&str, u32), ElfError> {
        let data = self.section_bytes(idx)?;
        if data.len() < 8 || data.len() % 4 != 0 {
            return Err(ElfError::InvalidDebugLink);
        }
        let name_area = &data[..data.len() - 4];
        let end = name_area
            .iter()
            .position(|&b| b == 0)
            .ok_or(ElfError::InvalidDebugLink)?;
        let filename =
            core::str::from_utf8(&name_area[..end]).map_err(|_| ElfError::InvalidDebugLink)?;
        let crc = bytes::le_u32(data, data.len() - 4)?;
        Ok((filename, crc))
    }

    /// Reads one debug info blob, applying any relocations targeting it
    /// so the DWARF data carries usable link addresses. The identifying
    /// triple must match what the enumeration reported.
    pub fn read_debug_info(
        &self,
        id: u32,
        file_offset: Elf64Off,
        size: Elf64Xword,
    ) -> Result<Vec<u8>, ElfError> {
        let idx = id as usize + 1;
        if idx >= self.org_shdrs.len() {
            return Err(ElfError::DebugInfoNotFound);
        }
        let shdr = &self.org_shdrs[idx];
        if shdr.is_alloc()
            || shdr.sh_type != Elf64Shdr::SHT_PROGBITS
            || shdr.sh_offset != file_offset
            || shdr.sh_size != size
        {
            return Err(ElfError::DebugInfoNotFound);
        }

        let mut data = self.section_bytes(idx)?.to_vec();
        if let Some(reloc_idx) = self.find_reloc_section(idx) {
            self.apply_debug_relocs(&mut data, idx, reloc_idx)?;
        }
        Ok(data)
    }

    /// The relocation section targeting `target`, if any. Usually the
    /// very next section.
    fn find_reloc_section(&self, target: usize) -> Option<usize> {
        let reloc_type = self.machine.reloc_section_type();
        let is_match = |idx: usize| {
            let shdr = &self.org_shdrs[idx];
            shdr.sh_type == reloc_type && shdr.sh_info as usize == target
        };
        if target + 1 < self.org_shdrs.len() && is_match(target + 1) {
            return Some(target + 1);
        }
        (1..self.org_shdrs.len()).find(|&idx| is_match(idx))
    }

    /// Debug sections are unallocated, so relocation offsets are plain
    /// offsets into the section. Unresolvable symbols abort the read;
    /// object files referencing external symbols from debug data cannot
    /// be consumed without a linking step.
    fn apply_debug_relocs(
        &self,
        data: &mut [u8],
        target: usize,
        reloc_idx: usize,
    ) -> Result<(), ElfError> {
        let with_addend = self.machine.relocs_have_addend();
        let entsize = self.class.rel_entsize_for(with_addend);
        let relocs = self.section_bytes(reloc_idx)?;
        if self.org_shdrs[reloc_idx].sh_size % entsize as Elf64Xword != 0 {
            return Err(ElfError::InvalidRelocationEntrySize);
        }
        let target_off = self.org_shdrs[target].sh_offset as usize;
        let table = self.symtab_for_relocs();
        let base = self.link_address;
        let mut no_imports =
            |_: &str, _: u32| -> Result<Elf64Addr, ElfError> { Err(ElfError::SymbolNotFound) };

        for i in 0..relocs.len() / entsize {
            let reloc = Elf64Reloc::read(self.class, with_addend, relocs, i * entsize)?;
            let spec = self.machine.reloc_spec(reloc.r_type)?;
            if spec.kind == RelocKind::None {
                continue;
            }
            let place = reloc.r_offset as usize;
            if place
                .checked_add(spec.len)
                .map_or(true, |end| end > data.len())
            {
                return Err(ElfError::InvalidRelocationOffset);
            }
            let addend = match reloc.r_addend {
                Some(a) => a,
                None => {
                    read_implicit_addend(self.file_bytes(), target_off + place, spec.len)?
                }
            };
            let sym_value =
                self.reloc_symbol_value(table, reloc.r_sym, base, &mut no_imports)?;
            super::relocation::apply_reloc(
                spec,
                data,
                place,
                base.wrapping_add(reloc.r_offset),
                base,
                self.link_address,
                sym_value,
                addend,
            )?;
        }
        Ok(())
    }

    fn symtab_for_relocs(&self) -> Option<(usize, usize)> {
        self.symtab.or(self.dyn_symtab)
    }

    /// The GNU build id note, when the image carries one.
    pub fn query_build_id(&self) -> Result<Option<&[u8]>, ElfError> {
        let Some(idx) = self
            .org_shdrs
            .iter()
            .position(|shdr| {
                self.section_name(shdr)
                    .is_ok_and(|name| name == ".note.gnu.build-id")
            })
        else {
            return Ok(None);
        };
        let data = self.section_bytes(idx)?;
        if data.len() % 4 != 0 || data.len() < 12 {
            return Err(ElfError::InvalidNoteSection);
        }
        let namesz = bytes::le_u32(data, 0)? as usize;
        let descsz = bytes::le_u32(data, 4)? as usize;
        let n_type = bytes::le_u32(data, 8)?;
        let name_aligned = namesz.checked_add(3).ok_or(ElfError::InvalidNoteSection)? & !3;
        if namesz > data.len()
            || descsz > data.len()
            || 12 + name_aligned + descsz > data.len()
            || n_type != NT_GNU_BUILD_ID
        {
            return Err(ElfError::InvalidNoteSection);
        }
        let owner = &data[12..12 + namesz];
        if owner != b"GNU\0" {
            return Err(ElfError::InvalidNoteSection);
        }
        Ok(Some(&data[12 + name_aligned..12 + name_aligned + descsz]))
    }

    /// Section indices of `.eh_frame` and `.eh_frame_hdr`, computed on
    /// first use.
    pub fn eh_frame_sections(&self) -> (Option<Elf64Word>, Option<Elf64Word>) {
        *self.eh_frame.get_or_init(|| {
            let mut eh_frame = None;
            let mut eh_frame_hdr = None;
            for (idx, shdr) in self.org_shdrs.iter().enumerate().skip(1) {
                match self.section_name(shdr) {
                    Ok(".eh_frame") => eh_frame = Some(idx as Elf64Word),
                    Ok(".eh_frame_hdr") => eh_frame_hdr = Some(idx as Elf64Word),
                    _ => (),
                }
            }
            (eh_frame, eh_frame_hdr)
        })
    }
}
