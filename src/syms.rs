// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::bytes;
use super::header::ElfClass;
use super::types::*;
use super::ElfError;

/// An ELF symbol table entry, widened to the 64-bit field layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Elf64Sym {
    pub st_name: Elf64Word,
    pub st_info: Elf64char,
    pub st_other: Elf64char,
    pub st_shndx: Elf64Half,
    pub st_value: Elf64Addr,
    pub st_size: Elf64Xword,
}

impl Elf64Sym {
    pub const STB_GLOBAL: Elf64char = 1;
    pub const STB_WEAK: Elf64char = 2;

    pub const SHN_UNDEF: Elf64Half = 0;
    pub const SHN_ABS: Elf64Half = 0xfff1;

    /// Reads one symbol table entry at `offset` within the raw file.
    /// The 32-bit layout keeps the value and size words in the middle,
    /// the 64-bit one moves them past the index fields.
    pub fn read(class: ElfClass, buf: &[u8], offset: usize) -> Result<Self, ElfError> {
        let entry = bytes::subslice(buf, offset, class.sym_entsize())?;
        Ok(match class {
            ElfClass::Elf32 => Self {
                st_name: bytes::le_u32(entry, 0)?,
                st_value: bytes::le_u32(entry, 4)?.into(),
                st_size: bytes::le_u32(entry, 8)?.into(),
                st_info: entry[12],
                st_other: entry[13],
                st_shndx: bytes::le_u16(entry, 14)?,
            },
            ElfClass::Elf64 => Self {
                st_name: bytes::le_u32(entry, 0)?,
                st_info: entry[4],
                st_other: entry[5],
                st_shndx: bytes::le_u16(entry, 6)?,
                st_value: bytes::le_u64(entry, 8)?,
                st_size: bytes::le_u64(entry, 16)?,
            },
        })
    }

    pub fn bind(&self) -> Elf64char {
        self.st_info >> 4
    }

    pub fn is_undefined(&self) -> bool {
        self.st_shndx == Self::SHN_UNDEF
    }
}

/// How to look a symbol up in [`get_symbol`](super::ElfImage::get_symbol).
#[derive(Debug, Clone, Copy)]
pub enum SymbolRef<'a> {
    /// By name, searching global and weak defined symbols.
    Name(&'a str),
    /// By raw symbol table index.
    Ordinal(u32),
}

/// Which symbols [`enumerate_symbols`](super::ElfImage::enumerate_symbols)
/// visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolFilter {
    /// Every named, defined symbol.
    All,
    /// Only global defined symbols.
    Exported,
}

/// A resolved view of one symbol, handed to the enumeration callback.
#[derive(Debug, Clone, Copy)]
pub struct ElfSymbol<'a> {
    pub name: &'a str,
    /// Symbol table index.
    pub ordinal: u32,
    /// Address after rebasing to the caller's load address.
    pub value: Elf64Addr,
    pub size: Elf64Xword,
    pub bind: Elf64char,
}

/// Supplies addresses for symbols the image itself does not define.
///
/// Called back from the relocators for each undefined symbol reference.
/// Closures of the matching shape implement it directly.
pub trait ImportResolver {
    fn resolve(&mut self, name: &str, ordinal: u32) -> Result<Elf64Addr, ElfError>;
}

impl<F> ImportResolver for F
where
    F: FnMut(&str, u32) -> Result<Elf64Addr, ElfError>,
{
    fn resolve(&mut self, name: &str, ordinal: u32) -> Result<Elf64Addr, ElfError> {
        self(name, ordinal)
    }
}
