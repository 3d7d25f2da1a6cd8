// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::addr_range::Elf64AddrRange;
use super::bytes;
use super::header::{ElfClass, ElfMachine};
use super::image::StrictnessMode;
use super::section_header::{Elf64Shdr, ShdrExtra};
use super::types::*;
use super::ElfError;

/// An ELF dynamic table entry, widened to the 64-bit field layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Elf64Dyn {
    pub d_tag: Elf64Sxword,
    pub d_val: Elf64Xword,
}

impl Elf64Dyn {
    pub const DT_NULL: Elf64Sxword = 0;
    pub const DT_NEEDED: Elf64Sxword = 1;
    pub const DT_PLTRELSZ: Elf64Sxword = 2;
    pub const DT_PLTGOT: Elf64Sxword = 3;
    pub const DT_HASH: Elf64Sxword = 4;
    pub const DT_STRTAB: Elf64Sxword = 5;
    pub const DT_SYMTAB: Elf64Sxword = 6;
    pub const DT_RELA: Elf64Sxword = 7;
    pub const DT_RELASZ: Elf64Sxword = 8;
    pub const DT_RELAENT: Elf64Sxword = 9;
    pub const DT_STRSZ: Elf64Sxword = 10;
    pub const DT_SYMENT: Elf64Sxword = 11;
    pub const DT_INIT: Elf64Sxword = 12;
    pub const DT_FINI: Elf64Sxword = 13;
    pub const DT_SONAME: Elf64Sxword = 14;
    pub const DT_RPATH: Elf64Sxword = 15;
    pub const DT_SYMBOLIC: Elf64Sxword = 16;
    pub const DT_REL: Elf64Sxword = 17;
    pub const DT_RELSZ: Elf64Sxword = 18;
    pub const DT_RELENT: Elf64Sxword = 19;
    pub const DT_PLTREL: Elf64Sxword = 20;
    pub const DT_DEBUG: Elf64Sxword = 21;
    pub const DT_TEXTREL: Elf64Sxword = 22;
    pub const DT_JMPREL: Elf64Sxword = 23;
    pub const DT_BIND_NOW: Elf64Sxword = 24;
    pub const DT_INIT_ARRAY: Elf64Sxword = 25;
    pub const DT_FINI_ARRAY: Elf64Sxword = 26;
    pub const DT_INIT_ARRAYSZ: Elf64Sxword = 27;
    pub const DT_FINI_ARRAYSZ: Elf64Sxword = 28;
    pub const DT_RUNPATH: Elf64Sxword = 29;
    pub const DT_FLAGS: Elf64Sxword = 30;
    pub const DT_ENCODING: Elf64Sxword = 32;
    pub const DT_PREINIT_ARRAY: Elf64Sxword = 32;
    pub const DT_PREINIT_ARRAYSZ: Elf64Sxword = 33;
    pub const DT_LOOS: Elf64Sxword = 0x6000_000d;

    /// Reads one dynamic table entry at `offset` within the raw file.
    pub fn read(class: ElfClass, buf: &[u8], offset: usize) -> Result<Self, ElfError> {
        let entry = bytes::subslice(buf, offset, class.dyn_entsize())?;
        Ok(match class {
            ElfClass::Elf32 => Self {
                d_tag: bytes::le_i32(entry, 0)?.into(),
                d_val: bytes::le_u32(entry, 4)?.into(),
            },
            ElfClass::Elf64 => Self {
                d_tag: bytes::le_i64(entry, 0)?,
                d_val: bytes::le_u64(entry, 8)?,
            },
        })
    }
}

/// Location of one relocation stream announced by the dynamic table,
/// collected across several entries and checked as a group afterwards.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct DynRelocStream {
    pub addr: Option<Elf64Addr>,
    pub size: Option<Elf64Xword>,
    pub entsize: Option<Elf64Xword>,
    /// Index of the section header backing the stream.
    pub shdr: Option<usize>,
    /// DT_REL or DT_RELA, whichever convention the stream declared.
    pub tag: Option<Elf64Sxword>,
}

impl DynRelocStream {
    fn set_tag(&mut self, tag: Elf64Sxword) -> Result<(), ElfError> {
        match self.tag {
            None => {
                self.tag = Some(tag);
                Ok(())
            }
            Some(t) if t == tag => Ok(()),
            Some(_) => Err(ElfError::DynamicFieldConflict),
        }
    }

    fn set_field(
        field: &mut Option<Elf64Xword>,
        value: Elf64Xword,
    ) -> Result<(), ElfError> {
        if field.is_some() {
            return Err(ElfError::DynamicFieldConflict);
        }
        *field = Some(value);
        Ok(())
    }

    pub(crate) fn section_type(&self) -> Option<Elf64Word> {
        match self.tag? {
            Elf64Dyn::DT_REL => Some(Elf64Shdr::SHT_REL),
            Elf64Dyn::DT_RELA => Some(Elf64Shdr::SHT_RELA),
            _ => None,
        }
    }
}

/// What the dynamic table told us about the image's relocation streams.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct DynInfo {
    /// The DT_REL/DT_RELA stream.
    pub rel: DynRelocStream,
    /// The DT_JMPREL stream, typed by DT_PLTREL.
    pub jmp: DynRelocStream,
}

/// Everything the dynamic table is validated against. Section addresses
/// are still in the link domain at this point.
pub(crate) struct DynScanCtx<'a> {
    pub class: ElfClass,
    pub machine: ElfMachine,
    pub strictness: StrictnessMode,
    pub link_address: Elf64Addr,
    pub image_size: Elf64Xword,
    pub shdrs: &'a [Elf64Shdr],
    pub extras: &'a mut [ShdrExtra],
    /// Section index of the SHT_DYNSYM table.
    pub dyn_symtab: usize,
    /// Section index of the dynamic string table.
    pub dyn_strtab: usize,
}

impl DynScanCtx<'_> {
    fn check_address(&self, d_ptr: Elf64Addr) -> Result<(), ElfError> {
        let image = Elf64AddrRange::try_from((self.link_address, self.image_size))
            .map_err(|_| ElfError::DynamicAddressOutOfRange)?;
        if !image.contains(d_ptr) {
            return Err(ElfError::DynamicAddressOutOfRange);
        }
        Ok(())
    }

    fn check_str_offset(&self, d_val: Elf64Xword) -> Result<(), ElfError> {
        if d_val >= self.shdrs[self.dyn_strtab].sh_size {
            return Err(ElfError::DynamicStringOutOfRange);
        }
        Ok(())
    }

    /// Tags that only debuggers care about are tolerated when the image
    /// was opened for inspection rather than for loading.
    fn check_relaxed(&self) -> Result<(), ElfError> {
        if !self.strictness.is_relaxed() {
            return Err(ElfError::UnrecognizedDynamicField);
        }
        Ok(())
    }

    /// Finds the unclaimed allocated section a dynamic pointer refers to
    /// and marks it as consumed by entry `ent`.
    fn claim_section(
        &mut self,
        addr: Elf64Addr,
        types: &[Elf64Word],
        ent: usize,
    ) -> Result<usize, ElfError> {
        let idx = self
            .shdrs
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, shdr)| {
                shdr.is_alloc() && shdr.sh_addr == addr && types.contains(&shdr.sh_type)
            })
            .map(|(i, _)| i)
            .ok_or(ElfError::DynamicSectionMismatch)?;
        let extra = &mut self.extras[idx];
        if extra.dyn_index.is_some() {
            return Err(ElfError::DynamicFieldConflict);
        }
        extra.dyn_index = Some(ent as u16);
        Ok(idx)
    }
}

/// Walks the parsed dynamic table, validating every recognized tag and
/// cross-checking pointers against the section headers.
///
/// The table must be terminated by a DT_NULL entry; in strict mode any
/// entry after the terminator must be DT_NULL padding too.
pub(crate) fn scan_dynamic(
    mut ctx: DynScanCtx<'_>,
    entries: &[Elf64Dyn],
) -> Result<DynInfo, ElfError> {
    let mut info = DynInfo::default();

    let terminator = entries
        .iter()
        .position(|d| d.d_tag == Elf64Dyn::DT_NULL)
        .ok_or(ElfError::UnterminatedDynamicSection)?;
    if ctx.strictness == StrictnessMode::Strict
        && entries[terminator..]
            .iter()
            .any(|d| d.d_tag != Elf64Dyn::DT_NULL)
    {
        return Err(ElfError::UnpaddedDynamicSection);
    }

    for (i, dyn_ent) in entries[..terminator].iter().enumerate() {
        let d_tag = dyn_ent.d_tag;
        let d_val = dyn_ent.d_val;
        match d_tag {
            Elf64Dyn::DT_NEEDED
            | Elf64Dyn::DT_SONAME
            | Elf64Dyn::DT_RPATH
            | Elf64Dyn::DT_RUNPATH => ctx.check_str_offset(d_val)?,

            Elf64Dyn::DT_PLTGOT | Elf64Dyn::DT_HASH => ctx.check_address(d_val)?,

            Elf64Dyn::DT_INIT
            | Elf64Dyn::DT_FINI
            | Elf64Dyn::DT_INIT_ARRAY
            | Elf64Dyn::DT_FINI_ARRAY => ctx.check_relaxed()?,

            Elf64Dyn::DT_INIT_ARRAYSZ
            | Elf64Dyn::DT_FINI_ARRAYSZ
            | Elf64Dyn::DT_PREINIT_ARRAYSZ => ctx.check_relaxed()?,

            Elf64Dyn::DT_SYMBOLIC | Elf64Dyn::DT_TEXTREL | Elf64Dyn::DT_BIND_NOW => (),

            Elf64Dyn::DT_DEBUG | Elf64Dyn::DT_FLAGS => (),

            Elf64Dyn::DT_STRTAB => {
                if d_val != ctx.shdrs[ctx.dyn_strtab].sh_addr {
                    return Err(ElfError::DynamicValueMismatch);
                }
                let strtab = ctx.dyn_strtab;
                let extra = &mut ctx.extras[strtab];
                if extra.dyn_index.is_some() {
                    return Err(ElfError::DynamicFieldConflict);
                }
                extra.dyn_index = Some(i as u16);
            }
            Elf64Dyn::DT_SYMTAB => {
                if d_val != ctx.shdrs[ctx.dyn_symtab].sh_addr {
                    return Err(ElfError::DynamicValueMismatch);
                }
                let symtab = ctx.dyn_symtab;
                let extra = &mut ctx.extras[symtab];
                if extra.dyn_index.is_some() {
                    return Err(ElfError::DynamicFieldConflict);
                }
                extra.dyn_index = Some(i as u16);
            }
            Elf64Dyn::DT_STRSZ => {
                if d_val != ctx.shdrs[ctx.dyn_strtab].sh_size {
                    return Err(ElfError::DynamicValueMismatch);
                }
            }
            Elf64Dyn::DT_SYMENT => {
                if d_val != ctx.class.sym_entsize() as Elf64Xword {
                    return Err(ElfError::DynamicValueMismatch);
                }
            }

            Elf64Dyn::DT_RELA | Elf64Dyn::DT_REL => {
                info.rel.set_tag(d_tag)?;
                ctx.check_address(d_val)?;
                let sh_type = if d_tag == Elf64Dyn::DT_RELA {
                    Elf64Shdr::SHT_RELA
                } else {
                    Elf64Shdr::SHT_REL
                };
                if info.rel.addr.is_some() {
                    return Err(ElfError::DynamicFieldConflict);
                }
                info.rel.addr = Some(d_val);
                info.rel.shdr = Some(ctx.claim_section(d_val, &[sh_type], i)?);
            }
            Elf64Dyn::DT_RELASZ => {
                info.rel.set_tag(Elf64Dyn::DT_RELA)?;
                DynRelocStream::set_field(&mut info.rel.size, d_val)?;
            }
            Elf64Dyn::DT_RELSZ => {
                info.rel.set_tag(Elf64Dyn::DT_REL)?;
                DynRelocStream::set_field(&mut info.rel.size, d_val)?;
            }
            Elf64Dyn::DT_RELAENT => {
                info.rel.set_tag(Elf64Dyn::DT_RELA)?;
                if d_val != ctx.class.rela_entsize() as Elf64Xword {
                    return Err(ElfError::DynamicValueMismatch);
                }
                DynRelocStream::set_field(&mut info.rel.entsize, d_val)?;
            }
            Elf64Dyn::DT_RELENT => {
                info.rel.set_tag(Elf64Dyn::DT_REL)?;
                if d_val != ctx.class.rel_entsize() as Elf64Xword {
                    return Err(ElfError::DynamicValueMismatch);
                }
                DynRelocStream::set_field(&mut info.rel.entsize, d_val)?;
            }

            Elf64Dyn::DT_JMPREL => {
                ctx.check_address(d_val)?;
                if info.jmp.addr.is_some() {
                    return Err(ElfError::DynamicFieldConflict);
                }
                info.jmp.addr = Some(d_val);
                info.jmp.shdr =
                    Some(ctx.claim_section(d_val, &[Elf64Shdr::SHT_REL, Elf64Shdr::SHT_RELA], i)?);
            }
            Elf64Dyn::DT_PLTRELSZ => {
                DynRelocStream::set_field(&mut info.jmp.size, d_val)?;
            }
            Elf64Dyn::DT_PLTREL => {
                let tag = d_val as Elf64Sxword;
                if tag != Elf64Dyn::DT_REL && tag != Elf64Dyn::DT_RELA {
                    return Err(ElfError::DynamicValueMismatch);
                }
                info.jmp.set_tag(tag)?;
            }

            _ => {
                // Unassigned even tags in the encoding range carry
                // addresses per the tag numbering convention; everything
                // else is opaque to us.
                if (Elf64Dyn::DT_ENCODING..Elf64Dyn::DT_LOOS).contains(&d_tag) && d_tag % 2 == 0 {
                    ctx.check_address(d_val)?;
                }
            }
        }
    }

    finalize_stream(&ctx, &info.rel, Some(ctx.machine.reloc_section_type()), true)?;
    finalize_stream(&ctx, &info.jmp, info.jmp.section_type(), false)?;

    // Every allocated relocation section must have been claimed by one
    // of the streams.
    for (idx, shdr) in ctx.shdrs.iter().enumerate().skip(1) {
        if shdr.is_alloc()
            && (shdr.sh_type == Elf64Shdr::SHT_REL || shdr.sh_type == Elf64Shdr::SHT_RELA)
            && ctx.extras[idx].dyn_index.is_none()
        {
            return Err(ElfError::OrphanRelocationSection);
        }
    }

    Ok(info)
}

/// A stream is either absent or completely described, with a backing
/// section of the announced type and size.
fn finalize_stream(
    ctx: &DynScanCtx<'_>,
    stream: &DynRelocStream,
    expect_type: Option<Elf64Word>,
    require_entsize: bool,
) -> Result<(), ElfError> {
    let Some(shdr_idx) = stream.shdr else {
        // Size-only announcements with no table pointer are broken.
        if stream.size.is_some() {
            return Err(ElfError::MissingDynamicField);
        }
        return Ok(());
    };
    let size = stream.size.ok_or(ElfError::MissingDynamicField)?;
    if stream.tag.is_none() || (require_entsize && stream.entsize.is_none()) {
        return Err(ElfError::MissingDynamicField);
    }
    let shdr = &ctx.shdrs[shdr_idx];
    if Some(shdr.sh_type) != expect_type || shdr.sh_size != size {
        return Err(ElfError::DynamicSectionMismatch);
    }
    Ok(())
}
