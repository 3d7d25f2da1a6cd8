// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

//! Loader for little-endian x86 and x86-64 ELF files.
//!
//! [`ElfImage::open`] validates a relocatable object, executable or
//! shared object up front and then offers symbol lookup, address
//! translation between the link, image and segment coordinate systems,
//! materialization of the loaded image for an arbitrary base address,
//! and access to debug information and module signatures.

#![no_std]

extern crate alloc;

mod addr_range;
mod bytes;
mod debug_info;
mod dynamic;
mod error;
mod file_range;
mod header;
mod image;
mod program_header;
mod relocation;
mod section_header;
mod signature;
mod source;
mod syms;
mod translate;
mod types;

#[cfg(test)]
mod tests;

pub use addr_range::Elf64AddrRange;
pub use debug_info::{DebugInfoKind, ElfDebugInfo};
pub use dynamic::Elf64Dyn;
pub use error::ElfError;
pub use file_range::Elf64FileRange;
pub use header::{Elf64Hdr, ElfClass, ElfMachine};
pub use image::{ElfImage, ElfOpenOptions, ElfSegment, StrictnessMode};
pub use program_header::{Elf64Phdr, Elf64PhdrFlags};
pub use relocation::Elf64Reloc;
pub use section_header::{Elf64Shdr, Elf64ShdrFlags};
pub use signature::DigestKind;
pub use source::ImageSource;
pub use syms::{Elf64Sym, ElfSymbol, ImportResolver, SymbolFilter, SymbolRef};
pub use types::*;
