// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::image::ElfImage;
use super::types::*;
use super::ElfError;

/// Address translation between the three coordinate systems of an
/// opened image: link addresses as the linker assigned them, offsets
/// within the loaded image (RVAs), and (segment, offset) pairs counted
/// from [`first_sect`](ElfImage::for_each_segment).
impl ElfImage<'_> {
    /// Maps a link-time address to the segment containing it.
    ///
    /// The section table is walked backwards so that the last section
    /// claiming an address wins; an address right at the end of a
    /// segment is attributed to it only when no later segment starts
    /// there.
    pub fn link_address_to_seg_offset(
        &self,
        link_addr: Elf64Addr,
    ) -> Result<(usize, Elf64Xword), ElfError> {
        let mut boundary: Option<(usize, Elf64Xword)> = None;
        for idx in (self.first_sect..self.org_shdrs.len()).rev() {
            let shdr = &self.org_shdrs[idx];
            if !shdr.is_alloc() || link_addr < shdr.sh_addr {
                continue;
            }
            let off = link_addr - shdr.sh_addr;
            if off < shdr.sh_size {
                return Ok((idx - self.first_sect, off));
            }
            if off == shdr.sh_size && boundary.is_none() {
                boundary = Some((idx - self.first_sect, off));
            }
        }
        boundary.ok_or(ElfError::UnmappedVaddrRange)
    }

    /// Maps a link-time address to its offset within the loaded image.
    pub fn link_address_to_rva(&self, link_addr: Elf64Addr) -> Result<Elf64Addr, ElfError> {
        let (seg, off) = self.link_address_to_seg_offset(link_addr)?;
        Ok(self.shdrs[seg + self.first_sect].sh_addr + off)
    }

    /// Maps a (segment, offset) pair to an offset within the loaded
    /// image. Offsets past the end of a segment are accepted while they
    /// stay within the alignment gap before the next one.
    pub fn seg_offset_to_rva(
        &self,
        seg: usize,
        offset: Elf64Xword,
    ) -> Result<Elf64Addr, ElfError> {
        let idx = seg + self.first_sect;
        if idx >= self.shdrs.len() {
            return Err(ElfError::InvalidSectionIndex);
        }
        let shdr = &self.shdrs[idx];
        if !shdr.is_alloc() {
            return Err(ElfError::UnmappedVaddrRange);
        }
        let rva = shdr
            .sh_addr
            .checked_add(offset)
            .ok_or(ElfError::InvalidAddressRange)?;
        if offset > shdr.sh_size {
            let bound = match self.next_alloc_section(idx) {
                Some(next) => self.shdrs[next].sh_addr,
                None => self.image_size,
            };
            if rva >= bound {
                return Err(ElfError::UnmappedVaddrRange);
            }
        }
        Ok(rva)
    }

    /// Maps an offset within the loaded image back to a (segment,
    /// offset) pair. A segment's reach extends up to the start of the
    /// following one, covering alignment padding.
    pub fn rva_to_seg_offset(&self, rva: Elf64Addr) -> Result<(usize, Elf64Xword), ElfError> {
        let mut next_addr: Option<Elf64Addr> = None;
        for idx in (self.first_sect..self.shdrs.len()).rev() {
            let shdr = &self.shdrs[idx];
            if !shdr.is_alloc() {
                continue;
            }
            if rva >= shdr.sh_addr {
                let off = rva - shdr.sh_addr;
                let span = match next_addr {
                    Some(next) => next - shdr.sh_addr,
                    None => shdr.sh_size,
                };
                if off <= span {
                    return Ok((idx - self.first_sect, off));
                }
                return Err(ElfError::UnmappedVaddrRange);
            }
            next_addr = Some(shdr.sh_addr);
        }
        Err(ElfError::UnmappedVaddrRange)
    }
}
