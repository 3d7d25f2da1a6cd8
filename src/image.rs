// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::dynamic::{scan_dynamic, DynInfo, DynScanCtx, Elf64Dyn};
use super::file_range::Elf64FileRange;
use super::header::{Elf64Hdr, ElfClass, ElfMachine};
use super::program_header::{Elf64Phdr, Elf64PhdrFlags};
use super::relocation::{apply_reloc, read_implicit_addend, RelocKind};
use super::section_header::{Elf64Shdr, Elf64ShdrFlags, ShdrExtra};
use super::source::{ImageBytes, ImageSource};
use super::syms::{Elf64Sym, ElfSymbol, ImportResolver, SymbolFilter, SymbolRef};
use super::types::*;
use super::ElfError;
use alloc::borrow::Cow;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::OnceCell;
use core::fmt;
use log::{debug, trace};

/// How much malformedness [`ElfImage::open`] tolerates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StrictnessMode {
    /// Reject everything a loader could not act on.
    #[default]
    Strict,
    /// Opened to inspect debug information, tolerate loader-irrelevant
    /// dynamic entries and sloppy table padding.
    ForDebug,
    /// Opened only to validate structure, same relaxations as
    /// [`StrictnessMode::ForDebug`].
    ForValidation,
}

impl StrictnessMode {
    pub(crate) fn is_relaxed(self) -> bool {
        !matches!(self, Self::Strict)
    }
}

/// Knobs for [`ElfImage::open`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ElfOpenOptions {
    /// Require this architecture instead of accepting any supported one.
    pub arch: Option<ElfMachine>,
    pub strictness: StrictnessMode,
    /// Rewrite zeroed section addresses that some linkers leave behind
    /// in otherwise well-ordered images instead of rejecting them.
    pub repair_misordered_sections: bool,
}

/// One region of the loaded image, as reported by
/// [`ElfImage::for_each_segment`].
#[derive(Debug)]
pub struct ElfSegment<'a> {
    pub name: Cow<'a, str>,
    pub flags: Elf64ShdrFlags,
    /// Address in the link domain, allocated sections only.
    pub link_address: Option<Elf64Addr>,
    /// Offset within the loaded image, allocated sections only.
    pub rva: Option<Elf64Addr>,
    /// Backing file offset, absent for uninitialized data.
    pub file_offset: Option<Elf64Off>,
    pub file_size: Elf64Xword,
    pub size: Elf64Xword,
    /// Bytes up to the next allocated section, allocated sections only.
    pub mapped_size: Option<Elf64Xword>,
    pub align: Elf64Xword,
}

/// A validated ELF object or image, ready for address translation,
/// symbol lookup and relocation.
///
/// Opening never modifies the underlying file; the section header table
/// is kept twice, once as read from the file and once with the load
/// addresses the loader assigns.
pub struct ElfImage<'a> {
    pub(crate) source: &'a dyn ImageSource,
    pub(crate) bytes: ImageBytes<'a>,
    pub(crate) hdr: Elf64Hdr,
    pub(crate) class: ElfClass,
    pub(crate) machine: ElfMachine,
    pub(crate) strictness: StrictnessMode,
    /// Section headers with loader-assigned addresses.
    pub(crate) shdrs: Vec<Elf64Shdr>,
    /// Section headers exactly as stored in the file.
    pub(crate) org_shdrs: Vec<Elf64Shdr>,
    pub(crate) extras: Vec<ShdrExtra>,
    /// First section index that maps into the image; 0 when the ELF
    /// headers themselves are covered by a load segment.
    pub(crate) first_sect: usize,
    pub(crate) shdrs_in_order: bool,
    pub(crate) image_size: Elf64Xword,
    /// Link-time base address, zero for relocatable objects.
    pub(crate) link_address: Elf64Addr,
    /// Regular symbol table as (symtab, strtab) section indices.
    pub(crate) symtab: Option<(usize, usize)>,
    /// Dynamic symbol table as (symtab, strtab) section indices.
    pub(crate) dyn_symtab: Option<(usize, usize)>,
    pub(crate) dynamic_section: Option<usize>,
    pub(crate) dyn_info: DynInfo,
    pub(crate) eh_frame: OnceCell<(Option<Elf64Word>, Option<Elf64Word>)>,
}

impl fmt::Debug for ElfImage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElfImage")
            .field("name", &self.source.log_name())
            .field("class", &self.class)
            .field("machine", &self.machine)
            .field("e_type", &self.hdr.e_type)
            .field("image_size", &self.image_size)
            .field("link_address", &self.link_address)
            .finish()
    }
}

impl Drop for ElfImage<'_> {
    fn drop(&mut self) {
        if self.bytes.is_mapped() {
            self.source.unmap();
        }
    }
}

fn align_up(value: Elf64Xword, align: Elf64Xword) -> Option<Elf64Xword> {
    if align <= 1 {
        return Some(value);
    }
    Some(value.checked_add(align - 1)? & !(align - 1))
}

impl<'a> ElfImage<'a> {
    /// Reads and validates an image from `source`.
    ///
    /// The whole structure is checked up front: the file header, both
    /// header tables, every section, and for executables and shared
    /// objects the load segments and the dynamic table. Afterwards the
    /// working section headers carry loader-assigned addresses, offsets
    /// from the start of the loaded image.
    pub fn open(source: &'a dyn ImageSource, opts: &ElfOpenOptions) -> Result<Self, ElfError> {
        let file_size = source.size();
        let bytes = match source.map() {
            Some(mapped) => ImageBytes::Mapped(mapped),
            None => {
                let len = usize::try_from(file_size).map_err(|_| ElfError::ImageTooBig)?;
                let mut buffered = vec![0u8; len];
                source.read_at(0, &mut buffered)?;
                ImageBytes::Buffered(buffered)
            }
        };
        let buf = bytes.bytes();

        let (hdr, class, machine) = Elf64Hdr::read(buf, file_size)?;
        trace!(
            "{}: class={:?} machine={:?} type={}",
            source.log_name(),
            class,
            machine,
            hdr.e_type
        );
        if class == ElfClass::Elf32 && file_size > u64::from(u32::MAX) {
            return Err(ElfError::ImageTooBig);
        }
        if let Some(arch) = opts.arch {
            if arch != machine {
                return Err(ElfError::MachineMismatch);
            }
        }

        let mut image = Self {
            source,
            bytes,
            hdr,
            class,
            machine,
            strictness: opts.strictness,
            shdrs: Vec::new(),
            org_shdrs: Vec::new(),
            extras: Vec::new(),
            first_sect: 1,
            shdrs_in_order: true,
            image_size: 0,
            link_address: 0,
            symtab: None,
            dyn_symtab: None,
            dynamic_section: None,
            dyn_info: DynInfo::default(),
            eh_frame: OnceCell::new(),
        };

        image.process_sections(file_size)?;
        if image.hdr.e_type == Elf64Hdr::ET_REL {
            image.assign_rel_addresses()?;
        } else {
            image.cross_validate_segments(file_size, opts)?;
            image.validate_dynamic()?;
            image.convert_to_rvas();
        }
        image.shdrs_in_order = image.compute_shdr_order();

        debug!(
            "{}: opened, image size {:#x}, link address {:#x}",
            source.log_name(),
            image.image_size,
            image.link_address
        );
        Ok(image)
    }

    pub(crate) fn file_bytes(&self) -> &[u8] {
        self.bytes.bytes()
    }

    pub(crate) fn section_bytes(&self, idx: usize) -> Result<&[u8], ElfError> {
        let shdr = &self.org_shdrs[idx];
        if shdr.is_nobits() {
            return Ok(&[]);
        }
        Elf64FileRange::try_from((shdr.sh_offset, shdr.sh_size))?.slice(self.file_bytes())
    }

    /// Looks up a NUL-terminated string in the string table section
    /// `strtab` at byte offset `off`.
    pub(crate) fn strtab_str(&self, strtab: usize, off: Elf64Word) -> Result<&str, ElfError> {
        let table = self.section_bytes(strtab)?;
        let tail = table
            .get(off as usize..)
            .ok_or(ElfError::InvalidStrtabString)?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(ElfError::UnterminatedStrtab)?;
        core::str::from_utf8(&tail[..end]).map_err(|_| ElfError::InvalidStrtabString)
    }

    pub(crate) fn section_name(&self, shdr: &Elf64Shdr) -> Result<&str, ElfError> {
        self.strtab_str(self.hdr.e_shstrndx as usize, shdr.sh_name)
    }

    /// First pass over the section header table. Validates each entry
    /// against the file and records the symbol and dynamic tables.
    fn process_sections(&mut self, file_size: u64) -> Result<(), ElfError> {
        let shnum = self.hdr.e_shnum as usize;
        let buf = self.file_bytes();
        let mut shdrs = Vec::with_capacity(shnum);
        for i in 0..shnum {
            let off = self.hdr.e_shoff as usize + i * self.class.shdr_entsize();
            shdrs.push(Elf64Shdr::read(self.class, buf, off)?);
        }
        if shdrs.is_empty() || shdrs[0] != Elf64Shdr::default() {
            return Err(ElfError::IncompatibleSectionType);
        }

        let shstrndx = self.hdr.e_shstrndx as usize;
        let shstr = &shdrs[shstrndx];
        if shstr.sh_type != Elf64Shdr::SHT_STRTAB || shstr.sh_size == 0 {
            return Err(ElfError::IncompatibleSectionType);
        }

        let is_rel = self.hdr.e_type == Elf64Hdr::ET_REL;
        let mut symtab = None;
        let mut dyn_symtab = None;
        let mut dynamic_section = None;
        for (i, shdr) in shdrs.iter().enumerate().skip(1) {
            shdr.verify(self.class.ehdr_size(), file_size)?;
            if Elf64Xword::from(shdr.sh_name) >= shstr.sh_size {
                return Err(ElfError::InvalidStrtabString);
            }
            if shdr.sh_link != 0 && shdr.sh_link as usize >= shnum {
                return Err(ElfError::InvalidSectionIndex);
            }

            match shdr.sh_type {
                Elf64Shdr::SHT_STRTAB => {
                    let table = Elf64FileRange::try_from((shdr.sh_offset, shdr.sh_size))?
                        .slice(buf)?;
                    if table.last() != Some(&0) {
                        return Err(ElfError::UnterminatedStrtab);
                    }
                }
                Elf64Shdr::SHT_SYMTAB => {
                    if symtab.is_some() {
                        return Err(ElfError::MultipleSymtabs);
                    }
                    Self::check_symtab(&shdrs, shdr, self.class)?;
                    symtab = Some((i, shdr.sh_link as usize));
                }
                Elf64Shdr::SHT_DYNSYM => {
                    if is_rel {
                        return Err(ElfError::IncompatibleSectionType);
                    }
                    if dyn_symtab.is_some() {
                        return Err(ElfError::MultipleSymtabs);
                    }
                    Self::check_symtab(&shdrs, shdr, self.class)?;
                    dyn_symtab = Some((i, shdr.sh_link as usize));
                }
                Elf64Shdr::SHT_DYNAMIC => {
                    if is_rel {
                        return Err(ElfError::IncompatibleSectionType);
                    }
                    if dynamic_section.is_some() {
                        return Err(ElfError::MultipleDynamicSections);
                    }
                    let entsize = self.class.dyn_entsize() as Elf64Xword;
                    if shdr.sh_entsize != entsize || shdr.sh_size % entsize != 0 {
                        return Err(ElfError::InvalidDynamicEntrySize);
                    }
                    let count = shdr.sh_size / entsize;
                    if !(2..=65535).contains(&count) {
                        return Err(ElfError::InvalidDynamicEntrySize);
                    }
                    dynamic_section = Some(i);
                }
                _ => (),
            }
        }

        self.symtab = symtab;
        self.dyn_symtab = dyn_symtab;
        self.dynamic_section = dynamic_section;
        self.extras = vec![ShdrExtra::default(); shdrs.len()];
        self.org_shdrs = shdrs.clone();
        self.shdrs = shdrs;
        Ok(())
    }

    fn check_symtab(
        shdrs: &[Elf64Shdr],
        shdr: &Elf64Shdr,
        class: ElfClass,
    ) -> Result<(), ElfError> {
        let entsize = class.sym_entsize() as Elf64Xword;
        if shdr.sh_entsize != entsize || shdr.sh_size % entsize != 0 {
            return Err(ElfError::InvalidSymbolEntrySize);
        }
        let strtab = shdrs
            .get(shdr.sh_link as usize)
            .ok_or(ElfError::InvalidSectionIndex)?;
        if shdr.sh_link == 0 || strtab.sh_type != Elf64Shdr::SHT_STRTAB {
            return Err(ElfError::IncompatibleSectionType);
        }
        Ok(())
    }

    /// Relocatable objects carry no addresses; lay the allocated
    /// sections out back to back, honoring each section's alignment.
    fn assign_rel_addresses(&mut self) -> Result<(), ElfError> {
        let mut cursor: Elf64Xword = 0;
        for shdr in self.shdrs.iter_mut().skip(1) {
            if !shdr.is_alloc() {
                continue;
            }
            if shdr.sh_addralign > 1 && !shdr.sh_addralign.is_power_of_two() {
                return Err(ElfError::InvalidAddressAlignment);
            }
            cursor = align_up(cursor, shdr.sh_addralign).ok_or(ElfError::ImageTooBig)?;
            shdr.sh_addr = cursor;
            cursor = cursor
                .checked_add(shdr.sh_size)
                .ok_or(ElfError::ImageTooBig)?;
        }
        self.image_size = cursor;
        self.link_address = 0;
        self.first_sect = 1;
        Ok(())
    }

    /// Matches the allocated sections against the PT_LOAD program
    /// headers. Every allocated byte must be covered by exactly one load
    /// segment and the sections must tile the segments in address order.
    fn cross_validate_segments(
        &mut self,
        file_size: u64,
        opts: &ElfOpenOptions,
    ) -> Result<(), ElfError> {
        let phnum = self.hdr.e_phnum as usize;
        if !(2..32768).contains(&phnum) {
            return Err(ElfError::InvalidPhdrCount);
        }
        let buf = self.file_bytes();
        let mut phdrs = Vec::with_capacity(phnum);
        for i in 0..phnum {
            let off = self.hdr.e_phoff as usize + i * self.class.phdr_entsize();
            phdrs.push(Elf64Phdr::read(self.class, buf, off)?);
        }

        if opts.repair_misordered_sections {
            self.repair_section_addresses();
        }

        // Allocated sections must appear in ascending address order so
        // they can be tiled against the segments in one pass.
        let mut prev_end: Elf64Addr = 0;
        for shdr in self.shdrs.iter().skip(1).filter(|s| s.is_alloc()) {
            if shdr.sh_addr < prev_end {
                return Err(ElfError::SectionsOutOfOrder);
            }
            prev_end = shdr
                .sh_addr
                .checked_add(shdr.sh_size)
                .ok_or(ElfError::InvalidAddressRange)?;
        }

        let shnum = self.shdrs.len();
        let mut load_count = 0usize;
        let mut next_shdr = 1usize;
        let mut top: Elf64Addr = 0;
        let mut link_address: Option<Elf64Addr> = None;
        let mut dyn_phdr_count = 0usize;

        for phdr in phdrs.iter() {
            if phdr.p_type == Elf64Phdr::PT_NULL {
                continue;
            }
            let file_end = phdr
                .p_offset
                .checked_add(phdr.p_filesz)
                .ok_or(ElfError::InvalidFileRange)?;
            if file_end > file_size {
                return Err(ElfError::InvalidFileRange);
            }
            if !Elf64PhdrFlags::all().contains(phdr.flags()) {
                return Err(ElfError::InvalidSegmentFlags);
            }
            if phdr.p_align > 1 {
                if !phdr.p_align.is_power_of_two() {
                    return Err(ElfError::UnalignedSegmentAddress);
                }
                if phdr.p_memsz > 0
                    && phdr.p_filesz > 0
                    && phdr.p_offset % phdr.p_align != phdr.p_vaddr % phdr.p_align
                {
                    return Err(ElfError::UnalignedSegmentAddress);
                }
            }

            match phdr.p_type {
                Elf64Phdr::PT_LOAD => {
                    if phdr.p_memsz < phdr.p_filesz {
                        return Err(ElfError::InvalidSegmentSize);
                    }
                    // A later segment may revisit lower addresses, so the
                    // image top is the maximum over all load ends.
                    let load_end = phdr
                        .p_vaddr
                        .checked_add(phdr.p_memsz)
                        .ok_or(ElfError::InvalidAddressRange)?;
                    top = top.max(load_end);
                    if link_address.is_none() {
                        link_address = Some(phdr.p_vaddr);
                    }
                    self.match_load_segment(phdr, load_count, &mut next_shdr)?;
                    load_count += 1;
                }
                Elf64Phdr::PT_DYNAMIC => {
                    dyn_phdr_count += 1;
                    let dynamic = self
                        .dynamic_section
                        .ok_or(ElfError::MissingDynamicSection)?;
                    let shdr = &self.shdrs[dynamic];
                    if phdr.p_offset != shdr.sh_offset
                        || phdr.p_memsz.max(phdr.p_filesz) != shdr.sh_size
                    {
                        return Err(ElfError::DynamicPhdrMismatch);
                    }
                }
                _ => (),
            }
        }

        if load_count == 0 {
            return Err(ElfError::MissingLoadSegments);
        }
        if self.dynamic_section.is_some() && dyn_phdr_count != 1 {
            return Err(ElfError::DynamicPhdrConflict);
        }
        while next_shdr < shnum {
            let shdr = &self.shdrs[next_shdr];
            if shdr.is_alloc() && shdr.sh_size > 0 {
                return Err(ElfError::SectionWithoutSegment);
            }
            next_shdr += 1;
        }

        let link_address = link_address.unwrap_or(0);
        self.link_address = link_address;
        self.image_size = top.wrapping_sub(link_address);
        Ok(())
    }

    /// Tiles the allocated sections starting at `next_shdr` into one
    /// PT_LOAD segment.
    fn match_load_segment(
        &mut self,
        phdr: &Elf64Phdr,
        load_index: usize,
        next_shdr: &mut usize,
    ) -> Result<(), ElfError> {
        let shnum = self.shdrs.len();
        let mut addr = phdr.p_vaddr;
        let mut off = phdr.p_offset;
        let mut mem_left = phdr.p_memsz;
        let mut file_left = phdr.p_filesz;

        // The first load segment often starts at the file header to map
        // the ELF and program headers too; no section describes those
        // bytes, so synthesize one.
        if load_index == 0
            && *next_shdr == 1
            && shnum > 1
            && self.shdrs[1].is_alloc()
            && self.shdrs[1].sh_addr == self.shdrs[1].sh_offset
            && addr == off
            && self.shdrs[1].sh_addr > addr
        {
            let gap = self.shdrs[1].sh_addr - addr;
            if file_left >= gap && mem_left >= gap {
                let pseudo = Elf64Shdr {
                    sh_name: 0,
                    sh_type: Elf64Shdr::SHT_PROGBITS,
                    sh_flags: (Elf64ShdrFlags::ALLOC
                        | if phdr.flags().contains(Elf64PhdrFlags::WRITE) {
                            Elf64ShdrFlags::WRITE
                        } else {
                            Elf64ShdrFlags::empty()
                        }
                        | if phdr.flags().contains(Elf64PhdrFlags::EXECUTE) {
                            Elf64ShdrFlags::EXECINSTR
                        } else {
                            Elf64ShdrFlags::empty()
                        })
                    .bits(),
                    sh_addr: addr,
                    sh_offset: off,
                    sh_size: gap,
                    sh_link: 0,
                    sh_info: 0,
                    sh_addralign: phdr.p_align,
                    sh_entsize: 0,
                };
                self.shdrs[0] = pseudo;
                self.org_shdrs[0] = pseudo;
                self.first_sect = 0;
                addr += gap;
                off += gap;
                mem_left -= gap;
                file_left -= gap;
            }
        }

        while mem_left > 0 && *next_shdr < shnum {
            let shdr = self.shdrs[*next_shdr];
            if !shdr.is_alloc() {
                // Unallocated file content inside a load segment's file
                // range would be mapped by accident.
                if !shdr.is_nobits()
                    && shdr.sh_size > 0
                    && shdr.sh_offset < off + file_left
                    && shdr.sh_offset + shdr.sh_size > off
                {
                    return Err(ElfError::LoadSegmentConflict);
                }
                *next_shdr += 1;
                continue;
            }
            if shdr.sh_size == 0 {
                *next_shdr += 1;
                continue;
            }
            if shdr.sh_addr >= addr + mem_left {
                // Belongs to a later segment.
                break;
            }

            if shdr.sh_addr > addr {
                // Tolerate small alignment padding between sections.
                let gap = shdr.sh_addr - addr;
                if gap >= shdr.sh_addralign.max(4096) || gap > mem_left {
                    return Err(ElfError::LoadSegmentConflict);
                }
                if !shdr.is_nobits() {
                    let file_gap = shdr.sh_offset.wrapping_sub(off);
                    if file_gap > file_left {
                        return Err(ElfError::LoadSegmentConflict);
                    }
                    off += file_gap;
                    file_left -= file_gap;
                }
                addr += gap;
                mem_left -= gap;
            }

            let matches = shdr.sh_addr == addr
                && mem_left >= shdr.sh_size
                && if shdr.is_nobits() {
                    file_left == 0 || mem_left > shdr.sh_size
                } else {
                    off == shdr.sh_offset && file_left >= shdr.sh_size
                };
            if !matches {
                return Err(ElfError::LoadSegmentConflict);
            }

            addr += shdr.sh_size;
            mem_left -= shdr.sh_size;
            if !shdr.is_nobits() {
                off += shdr.sh_size;
                file_left -= shdr.sh_size;
            }
            *next_shdr += 1;
        }
        Ok(())
    }

    /// Some linkers zero the address of late sections while keeping them
    /// in load order. Recreate the address from the running cursor.
    fn repair_section_addresses(&mut self) {
        let mut next_addr: Elf64Addr = 0;
        for shdr in self.shdrs.iter_mut().skip(1) {
            if !shdr.is_alloc() {
                continue;
            }
            if shdr.sh_addr == 0 && shdr.sh_addr < next_addr {
                shdr.sh_addr =
                    align_up(next_addr, shdr.sh_addralign.max(1)).unwrap_or(next_addr);
            }
            next_addr = shdr.sh_addr.wrapping_add(shdr.sh_size);
        }
    }

    fn validate_dynamic(&mut self) -> Result<(), ElfError> {
        let Some(dynamic) = self.dynamic_section else {
            return Err(ElfError::MissingDynamicSection);
        };
        let (dyn_symtab, dyn_strtab) = self.dyn_symtab.ok_or(ElfError::MissingDynamicTable)?;

        let shdr = self.shdrs[dynamic];
        let entsize = self.class.dyn_entsize();
        let count = (shdr.sh_size / entsize as Elf64Xword) as usize;
        let buf = self.file_bytes();
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            entries.push(Elf64Dyn::read(
                self.class,
                buf,
                shdr.sh_offset as usize + i * entsize,
            )?);
        }

        let ctx = DynScanCtx {
            class: self.class,
            machine: self.machine,
            strictness: self.strictness,
            link_address: self.link_address,
            image_size: self.image_size,
            shdrs: &self.shdrs,
            extras: &mut self.extras,
            dyn_symtab,
            dyn_strtab,
        };
        self.dyn_info = scan_dynamic(ctx, &entries)?;
        Ok(())
    }

    /// Rebase the working section headers from link addresses to offsets
    /// within the loaded image.
    fn convert_to_rvas(&mut self) {
        let link = self.link_address;
        for shdr in self.shdrs[self.first_sect..].iter_mut() {
            if shdr.is_alloc() {
                shdr.sh_addr = shdr.sh_addr.wrapping_sub(link);
            }
        }
    }

    fn compute_shdr_order(&self) -> bool {
        let mut prev: Elf64Addr = 0;
        for shdr in self.shdrs[self.first_sect..].iter() {
            if !shdr.is_alloc() {
                continue;
            }
            if shdr.sh_addr < prev {
                return false;
            }
            prev = shdr.sh_addr;
        }
        true
    }

    /// The allocated section following `idx` in address order.
    pub(crate) fn next_alloc_section(&self, idx: usize) -> Option<usize> {
        if self.shdrs_in_order {
            return (idx + 1..self.shdrs.len())
                .find(|&i| self.shdrs[i].is_alloc());
        }
        let addr = self.shdrs[idx].sh_addr;
        let mut best: Option<(usize, Elf64Addr)> = None;
        for i in self.first_sect..self.shdrs.len() {
            let shdr = &self.shdrs[i];
            if i == idx || !shdr.is_alloc() || shdr.sh_addr <= addr {
                continue;
            }
            let delta = shdr.sh_addr - addr;
            if best.map_or(true, |(_, d)| delta < d) {
                best = Some((i, delta));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Size of the loaded image in bytes.
    pub fn image_size(&self) -> Elf64Xword {
        self.image_size
    }

    pub fn class(&self) -> ElfClass {
        self.class
    }

    pub fn machine(&self) -> ElfMachine {
        self.machine
    }

    /// The program entry point rebased to `base`, when the image has
    /// one. Relocatable objects do not.
    pub fn entry_point(&self, base: Elf64Addr) -> Option<Elf64Addr> {
        if self.hdr.e_type == Elf64Hdr::ET_REL || self.hdr.e_entry == 0 {
            return None;
        }
        Some(
            base.wrapping_add(self.hdr.e_entry)
                .wrapping_sub(self.link_address),
        )
    }

    /// Produces the loaded image in `dst`, relocated for `base`.
    ///
    /// Uninitialized data is zero-filled, every allocated section is
    /// copied to its assigned offset and all relocations are applied,
    /// pulling undefined symbols from `resolver`. Executables are linked
    /// to a fixed address and cannot be materialized this way.
    pub fn get_bits(
        &self,
        base: Elf64Addr,
        dst: &mut [u8],
        resolver: &mut dyn ImportResolver,
    ) -> Result<(), ElfError> {
        if self.hdr.e_type == Elf64Hdr::ET_EXEC {
            return Err(ElfError::UnsupportedExecImage);
        }
        let size = usize::try_from(self.image_size).map_err(|_| ElfError::ImageTooBig)?;
        if dst.len() < size {
            return Err(ElfError::InvalidAddressRange);
        }
        dst[..size].fill(0);
        for idx in self.first_sect..self.shdrs.len() {
            let shdr = &self.shdrs[idx];
            if !shdr.is_alloc() || shdr.is_nobits() || shdr.sh_size == 0 {
                continue;
            }
            let src = self.section_bytes(idx)?;
            let start = usize::try_from(shdr.sh_addr).map_err(|_| ElfError::ImageTooBig)?;
            let end = start
                .checked_add(src.len())
                .ok_or(ElfError::InvalidAddressRange)?;
            if end > size {
                return Err(ElfError::InvalidAddressRange);
            }
            dst[start..end].copy_from_slice(src);
        }
        self.relocate_into(&mut dst[..size], base, resolver)
    }

    /// Applies all relocations to a previously materialized image.
    ///
    /// `old_base` is accepted for symmetry but not consulted: addends
    /// are always taken from the file, so relocating is idempotent and
    /// independent of any earlier base.
    pub fn relocate(
        &self,
        bits: &mut [u8],
        new_base: Elf64Addr,
        _old_base: Elf64Addr,
        resolver: &mut dyn ImportResolver,
    ) -> Result<(), ElfError> {
        if self.hdr.e_type == Elf64Hdr::ET_EXEC {
            return Err(ElfError::UnsupportedExecImage);
        }
        self.relocate_into(bits, new_base, resolver)
    }

    fn relocate_into(
        &self,
        bits: &mut [u8],
        base: Elf64Addr,
        resolver: &mut dyn ImportResolver,
    ) -> Result<(), ElfError> {
        trace!("{}: relocating for base {:#x}", self.source.log_name(), base);
        if self.hdr.e_type == Elf64Hdr::ET_REL {
            self.relocate_sections(bits, base, resolver)
        } else {
            self.relocate_dynamic(bits, base, resolver)
        }
    }

    /// Relocation driver for relocatable objects: one relocation section
    /// per target section, offsets relative to the target.
    fn relocate_sections(
        &self,
        bits: &mut [u8],
        base: Elf64Addr,
        resolver: &mut dyn ImportResolver,
    ) -> Result<(), ElfError> {
        let with_addend = self.machine.relocs_have_addend();
        let reloc_type = self.machine.reloc_section_type();
        let entsize = self.class.rel_entsize_for(with_addend);

        for idx in 1..self.shdrs.len() {
            let shdr = &self.org_shdrs[idx];
            if shdr.sh_type != reloc_type {
                continue;
            }
            let target = shdr.sh_info as usize;
            if target == 0 || target >= self.shdrs.len() {
                return Err(ElfError::InvalidSectionIndex);
            }
            if !self.shdrs[target].is_alloc() {
                continue;
            }
            if shdr.sh_entsize != entsize as Elf64Xword
                || shdr.sh_size % entsize as Elf64Xword != 0
            {
                return Err(ElfError::InvalidRelocationEntrySize);
            }

            let relocs = self.section_bytes(idx)?;
            let count = relocs.len() / entsize;
            let target_addr = self.shdrs[target].sh_addr;
            let target_shdr = &self.org_shdrs[target];
            for i in 0..count {
                let reloc = super::relocation::Elf64Reloc::read(
                    self.class,
                    with_addend,
                    relocs,
                    i * entsize,
                )?;
                let spec = self.machine.reloc_spec(reloc.r_type)?;
                if spec.kind == RelocKind::None {
                    continue;
                }
                // The fixup must lie entirely inside the target section,
                // not merely inside the image.
                if reloc
                    .r_offset
                    .checked_add(spec.len as Elf64Xword)
                    .map_or(true, |end| end > target_shdr.sh_size)
                {
                    return Err(ElfError::InvalidRelocationOffset);
                }
                let place_off = target_addr
                    .checked_add(reloc.r_offset)
                    .ok_or(ElfError::InvalidRelocationOffset)?
                    as usize;
                if place_off
                    .checked_add(spec.len)
                    .map_or(true, |end| end > bits.len())
                {
                    return Err(ElfError::InvalidRelocationOffset);
                }
                let addend = match reloc.r_addend {
                    Some(a) => a,
                    None if target_shdr.is_nobits() => 0,
                    None => read_implicit_addend(
                        self.file_bytes(),
                        target_shdr.sh_offset as usize + reloc.r_offset as usize,
                        spec.len,
                    )?,
                };
                let sym_value =
                    self.reloc_symbol_value(self.symtab, reloc.r_sym, base, resolver)?;
                apply_reloc(
                    spec,
                    bits,
                    place_off,
                    base.wrapping_add(place_off as Elf64Addr),
                    base,
                    self.link_address,
                    sym_value,
                    addend,
                )?;
            }
        }
        Ok(())
    }

    /// Relocation driver for shared objects: the dynamic table names the
    /// streams and offsets are link addresses within the whole image.
    fn relocate_dynamic(
        &self,
        bits: &mut [u8],
        base: Elf64Addr,
        resolver: &mut dyn ImportResolver,
    ) -> Result<(), ElfError> {
        let streams = [&self.dyn_info.rel, &self.dyn_info.jmp];
        for stream in streams {
            let Some(shdr_idx) = stream.shdr else {
                continue;
            };
            let with_addend = stream.tag == Some(Elf64Dyn::DT_RELA);
            let entsize = self.class.rel_entsize_for(with_addend);
            let relocs = self.section_bytes(shdr_idx)?;
            let count = relocs.len() / entsize;
            for i in 0..count {
                let reloc = super::relocation::Elf64Reloc::read(
                    self.class,
                    with_addend,
                    relocs,
                    i * entsize,
                )?;
                let spec = self.machine.reloc_spec(reloc.r_type)?;
                if spec.kind == RelocKind::None {
                    continue;
                }
                let rva = reloc.r_offset.wrapping_sub(self.link_address);
                if rva.checked_add(spec.len as Elf64Addr).map_or(true, |end| {
                    end > self.image_size || end as usize > bits.len()
                }) {
                    return Err(ElfError::InvalidRelocationOffset);
                }
                let place_off = rva as usize;
                let addend = match reloc.r_addend {
                    Some(a) => a,
                    None => self.image_word_at(rva, spec.len)?,
                };
                let sym_value =
                    self.reloc_symbol_value(self.dyn_symtab, reloc.r_sym, base, resolver)?;
                apply_reloc(
                    spec,
                    bits,
                    place_off,
                    base.wrapping_add(rva),
                    base,
                    self.link_address,
                    sym_value,
                    addend,
                )?;
            }
        }
        Ok(())
    }

    /// Reads the original file bytes behind an image offset; offsets in
    /// uninitialized data read as zero.
    fn image_word_at(&self, rva: Elf64Addr, len: usize) -> Result<Elf64Sxword, ElfError> {
        for idx in self.first_sect..self.shdrs.len() {
            let shdr = &self.shdrs[idx];
            if !shdr.is_alloc() || rva < shdr.sh_addr || rva - shdr.sh_addr >= shdr.sh_size {
                continue;
            }
            if shdr.is_nobits() {
                return Ok(0);
            }
            let off = self.org_shdrs[idx].sh_offset as usize + (rva - shdr.sh_addr) as usize;
            return read_implicit_addend(self.file_bytes(), off, len);
        }
        Ok(0)
    }

    /// Symbol address feeding one relocation. Index zero stands for "no
    /// symbol" and undefined symbols are resolved by the caller.
    pub(crate) fn reloc_symbol_value(
        &self,
        table: Option<(usize, usize)>,
        r_sym: Elf64Word,
        base: Elf64Addr,
        resolver: &mut dyn ImportResolver,
    ) -> Result<Elf64Addr, ElfError> {
        if r_sym == 0 {
            return Ok(0);
        }
        let table = table.ok_or(ElfError::InvalidSymbolIndex)?;
        let (sym, name) = self.read_symbol(table, r_sym)?;
        if sym.is_undefined() {
            return resolver.resolve(name, r_sym);
        }
        self.symbol_value(&sym, base)
    }

    fn symbol_count(&self, table: (usize, usize)) -> usize {
        (self.shdrs[table.0].sh_size / self.class.sym_entsize() as Elf64Xword) as usize
    }

    fn read_symbol(
        &self,
        table: (usize, usize),
        idx: Elf64Word,
    ) -> Result<(Elf64Sym, &str), ElfError> {
        if idx as usize >= self.symbol_count(table) {
            return Err(ElfError::InvalidSymbolIndex);
        }
        let syms = self.section_bytes(table.0)?;
        let sym = Elf64Sym::read(self.class, syms, idx as usize * self.class.sym_entsize())?;
        let name = self.strtab_str(table.1, sym.st_name)?;
        Ok((sym, name))
    }

    /// Address of a defined symbol once the image is loaded at `base`.
    fn symbol_value(&self, sym: &Elf64Sym, base: Elf64Addr) -> Result<Elf64Addr, ElfError> {
        if sym.st_shndx == Elf64Sym::SHN_ABS {
            return Ok(sym.st_value);
        }
        let idx = usize::from(sym.st_shndx);
        if idx >= self.shdrs.len() {
            return Err(ElfError::InvalidSectionIndex);
        }
        if self.hdr.e_type == Elf64Hdr::ET_REL {
            // Section addresses were assigned at open time.
            Ok(base
                .wrapping_add(self.shdrs[idx].sh_addr)
                .wrapping_add(sym.st_value))
        } else {
            Ok(base
                .wrapping_add(sym.st_value)
                .wrapping_sub(self.link_address))
        }
    }

    /// The symbol table queries work against: the dynamic one for
    /// executables and shared objects, the regular one for objects.
    fn query_table(&self) -> Option<(usize, usize)> {
        self.dyn_symtab.or(self.symtab)
    }

    /// Looks a symbol up by name or table index. Name lookups only see
    /// defined global and weak symbols.
    pub fn get_symbol(&self, sym: SymbolRef<'_>, base: Elf64Addr) -> Result<Elf64Addr, ElfError> {
        let table = self.query_table().ok_or(ElfError::SymbolNotFound)?;
        match sym {
            SymbolRef::Name(wanted) => {
                let count = self.symbol_count(table);
                for idx in 1..count {
                    let (sym, name) = self.read_symbol(table, idx as Elf64Word)?;
                    if !sym.is_undefined()
                        && matches!(sym.bind(), Elf64Sym::STB_GLOBAL | Elf64Sym::STB_WEAK)
                        && name == wanted
                    {
                        return self.symbol_value(&sym, base);
                    }
                }
                Err(ElfError::SymbolNotFound)
            }
            SymbolRef::Ordinal(idx) => {
                let (sym, _) = self.read_symbol(table, idx)?;
                if sym.is_undefined()
                    || !matches!(sym.bind(), Elf64Sym::STB_GLOBAL | Elf64Sym::STB_WEAK)
                {
                    return Err(ElfError::SymbolNotFound);
                }
                self.symbol_value(&sym, base)
            }
        }
    }

    /// Visits every named, defined symbol, rebased to `base`. Returning
    /// an error from the callback stops the walk.
    pub fn enumerate_symbols(
        &self,
        filter: SymbolFilter,
        base: Elf64Addr,
        cb: &mut dyn FnMut(&ElfSymbol<'_>) -> Result<(), ElfError>,
    ) -> Result<(), ElfError> {
        let Some(table) = self.query_table() else {
            return Ok(());
        };
        let count = self.symbol_count(table);
        for idx in 1..count {
            let (sym, name) = self.read_symbol(table, idx as Elf64Word)?;
            if sym.is_undefined() || name.is_empty() {
                continue;
            }
            if filter == SymbolFilter::Exported && sym.bind() != Elf64Sym::STB_GLOBAL {
                continue;
            }
            let value = self.symbol_value(&sym, base)?;
            cb(&ElfSymbol {
                name,
                ordinal: idx as Elf64Word,
                value,
                size: sym.st_size,
                bind: sym.bind(),
            })?;
        }
        Ok(())
    }

    /// Visits each mapped region of the image in section order.
    pub fn for_each_segment(
        &self,
        cb: &mut dyn FnMut(&ElfSegment<'_>) -> Result<(), ElfError>,
    ) -> Result<(), ElfError> {
        for idx in self.first_sect..self.shdrs.len() {
            let shdr = &self.shdrs[idx];
            if shdr.sh_type == Elf64Shdr::SHT_NULL && idx != 0 {
                continue;
            }
            let name: Cow<'_, str> = if idx == 0 {
                Cow::Borrowed(".elf.headers")
            } else {
                match self.section_name(shdr)? {
                    "" => Cow::Owned(format!("UnamedSect{:02}", idx)),
                    n => Cow::Borrowed(n),
                }
            };
            let alloc = shdr.is_alloc();
            let mapped_size = if alloc {
                let end = self
                    .next_alloc_section(idx)
                    .map(|n| self.shdrs[n].sh_addr)
                    .unwrap_or(self.image_size);
                Some(end.saturating_sub(shdr.sh_addr))
            } else {
                None
            };
            cb(&ElfSegment {
                name,
                flags: shdr.flags(),
                link_address: alloc.then(|| self.org_shdrs[idx].sh_addr),
                rva: alloc.then_some(shdr.sh_addr),
                file_offset: (!shdr.is_nobits()).then_some(self.org_shdrs[idx].sh_offset),
                file_size: if shdr.is_nobits() { 0 } else { shdr.sh_size },
                size: shdr.sh_size,
                mapped_size,
                align: shdr.sh_addralign,
            })?;
        }
        Ok(())
    }
}
