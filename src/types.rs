// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

//! Scalar type aliases following the ELF64 naming convention.
//!
//! The loader keeps a single 64-bit wide internal representation; ELF32
//! inputs are widened to these types at the parsing boundary.

pub type Elf64Addr = u64;
pub type Elf64Off = u64;
pub type Elf64Half = u16;
pub type Elf64Word = u32;
pub type Elf64Xword = u64;
pub type Elf64Sxword = i64;
pub type Elf64char = u8;
