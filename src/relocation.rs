// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::bytes;
use super::header::{ElfClass, ElfMachine};
use super::types::*;
use super::ElfError;

/// One relocation entry, with the packed `r_info` word already split
/// into its symbol index and type halves. `r_addend` is `None` for
/// entries from addend-less SHT_REL streams.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Elf64Reloc {
    pub r_offset: Elf64Addr,
    pub r_sym: Elf64Word,
    pub r_type: Elf64Word,
    pub r_addend: Option<Elf64Sxword>,
}

impl Elf64Reloc {
    /// Reads one relocation entry at `offset` within the raw file. The
    /// symbol index occupies the upper 24 bits of the 32-bit info word
    /// but the upper 32 bits of the 64-bit one.
    pub fn read(
        class: ElfClass,
        with_addend: bool,
        buf: &[u8],
        offset: usize,
    ) -> Result<Self, ElfError> {
        let entsize = Self::entsize(class, with_addend);
        let entry = bytes::subslice(buf, offset, entsize)?;
        Ok(match class {
            ElfClass::Elf32 => {
                let info = bytes::le_u32(entry, 4)?;
                Self {
                    r_offset: bytes::le_u32(entry, 0)?.into(),
                    r_sym: info >> 8,
                    r_type: info & 0xff,
                    r_addend: if with_addend {
                        Some(bytes::le_i32(entry, 8)?.into())
                    } else {
                        None
                    },
                }
            }
            ElfClass::Elf64 => {
                let info = bytes::le_u64(entry, 8)?;
                Self {
                    r_offset: bytes::le_u64(entry, 0)?,
                    r_sym: (info >> 32) as Elf64Word,
                    r_type: info as Elf64Word,
                    r_addend: if with_addend {
                        Some(bytes::le_i64(entry, 16)?)
                    } else {
                        None
                    },
                }
            }
        })
    }

    pub const fn entsize(class: ElfClass, with_addend: bool) -> usize {
        if with_addend {
            class.rela_entsize()
        } else {
            class.rel_entsize()
        }
    }
}

/// What a relocated field is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelocKind {
    /// No-op entry.
    None,
    /// Base-relative fixup, no symbol involved.
    Relative,
    /// Absolute symbol address plus addend.
    Abs,
    /// Symbol address relative to the place being patched.
    PcRel,
    /// Bare symbol address written into a GOT or PLT slot.
    Slot,
}

/// How an 8-byte value must behave to fit a 4-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Truncation {
    /// Silently wrapped, the 32-bit targets never see wider values.
    None,
    /// Upper half must be zero.
    Zero,
    /// Must sign-extend back to the original value.
    Signed,
}

/// The computation and field width behind one relocation type.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RelocSpec {
    pub kind: RelocKind,
    pub len: usize,
    pub trunc: Truncation,
}

impl RelocSpec {
    const fn new(kind: RelocKind, len: usize, trunc: Truncation) -> Self {
        Self { kind, len, trunc }
    }
}

impl ElfMachine {
    /// Maps a relocation type number to its computation. Only the types
    /// compilers emit for statically linkable code are handled; anything
    /// else aborts the relocation pass.
    pub(crate) fn reloc_spec(self, r_type: Elf64Word) -> Result<RelocSpec, ElfError> {
        use {RelocKind as K, Truncation as T};
        let spec = match self {
            Self::X86 => match r_type {
                // R_386_NONE
                0 => RelocSpec::new(K::None, 0, T::None),
                // R_386_32
                1 => RelocSpec::new(K::Abs, 4, T::None),
                // R_386_PC32
                2 => RelocSpec::new(K::PcRel, 4, T::None),
                // R_386_GLOB_DAT / R_386_JMP_SLOT
                6 | 7 => RelocSpec::new(K::Slot, 4, T::None),
                // R_386_RELATIVE
                8 => RelocSpec::new(K::Relative, 4, T::None),
                _ => return Err(ElfError::UnrecognizedRelocationType),
            },
            Self::Amd64 => match r_type {
                // R_X86_64_NONE
                0 => RelocSpec::new(K::None, 0, T::None),
                // R_X86_64_64
                1 => RelocSpec::new(K::Abs, 8, T::None),
                // R_X86_64_PC32 / R_X86_64_PLT32
                2 | 4 => RelocSpec::new(K::PcRel, 4, T::Signed),
                // R_X86_64_GLOB_DAT / R_X86_64_JMP_SLOT
                6 | 7 => RelocSpec::new(K::Slot, 8, T::None),
                // R_X86_64_RELATIVE
                8 => RelocSpec::new(K::Relative, 8, T::None),
                // R_X86_64_32
                10 => RelocSpec::new(K::Abs, 4, T::Zero),
                // R_X86_64_32S
                11 => RelocSpec::new(K::Abs, 4, T::Signed),
                // R_X86_64_PC64
                24 => RelocSpec::new(K::PcRel, 8, T::None),
                _ => return Err(ElfError::UnrecognizedRelocationType),
            },
        };
        Ok(spec)
    }
}

/// Reads the implicit addend a SHT_REL entry leaves in the field to be
/// patched, sign-extended to 64 bits.
pub(crate) fn read_implicit_addend(
    buf: &[u8],
    offset: usize,
    len: usize,
) -> Result<Elf64Sxword, ElfError> {
    match len {
        4 => Ok(bytes::le_i32(buf, offset)?.into()),
        8 => bytes::le_i64(buf, offset),
        _ => Err(ElfError::UnrecognizedRelocationType),
    }
}

/// Computes one relocated field value and patches it into `bits`.
///
/// `place_addr` is the runtime address of the patched field, `sym_value`
/// the already rebased symbol address. Base-relative fixups ignore the
/// symbol and rebase the addend from the link address to `base`.
pub(crate) fn apply_reloc(
    spec: RelocSpec,
    bits: &mut [u8],
    place_off: usize,
    place_addr: Elf64Addr,
    base: Elf64Addr,
    link_address: Elf64Addr,
    sym_value: Elf64Addr,
    addend: Elf64Sxword,
) -> Result<(), ElfError> {
    let value = match spec.kind {
        RelocKind::None => return Ok(()),
        RelocKind::Relative => base
            .wrapping_add(addend as Elf64Addr)
            .wrapping_sub(link_address),
        RelocKind::Abs => sym_value.wrapping_add(addend as Elf64Addr),
        RelocKind::PcRel => sym_value
            .wrapping_add(addend as Elf64Addr)
            .wrapping_sub(place_addr),
        RelocKind::Slot => sym_value,
    };

    match spec.len {
        8 => bytes::put_u64(bits, place_off, value),
        4 => {
            let fits = match spec.trunc {
                Truncation::None => true,
                Truncation::Zero => value >> 32 == 0,
                Truncation::Signed => value as u32 as i32 as i64 == value as i64,
            };
            if !fits {
                return Err(ElfError::SymbolValueTooBig);
            }
            bytes::put_u32(bits, place_off, value as u32)
        }
        _ => Err(ElfError::UnrecognizedRelocationType),
    }
}
