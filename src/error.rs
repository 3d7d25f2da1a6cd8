// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use core::fmt;

/// Errors raised while opening or working with an ELF image: malformed
/// structures, out-of-range references, resolution failures and so on.
/// Implements [`fmt::Display`] so instances can be formatted directly.
///
/// # Examples
///
/// ```rust
/// use elfldr::ElfError;
///
/// let error = ElfError::UnrecognizedMagic;
/// assert_eq!(error.to_string(), "unrecognized ELF magic");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    FileTooShort,
    ImageTooBig,

    InvalidAddressRange,
    InvalidAddressAlignment,
    InvalidFileRange,
    UnmappedVaddrRange,

    UnrecognizedMagic,
    UnsupportedClass,
    UnsupportedEndianess,
    UnsupportedVersion,
    UnsupportedType,
    UnsupportedMachine,
    MachineMismatch,
    InvalidHdrSize,
    InvalidPhdrSize,
    InvalidShdrSize,

    InvalidSectionIndex,
    IncompatibleSectionType,
    MultipleSymtabs,
    MultipleDynamicSections,
    SectionsOutOfOrder,
    SectionWithoutSegment,

    InvalidStrtabString,
    UnterminatedStrtab,

    InvalidSymbolEntrySize,
    InvalidSymbolIndex,
    SymbolNotFound,
    SymbolValueTooBig,

    InvalidDynamicEntrySize,
    UnterminatedDynamicSection,
    UnpaddedDynamicSection,
    DynamicFieldConflict,
    UnrecognizedDynamicField,
    MissingDynamicField,
    MissingDynamicSection,
    MissingDynamicTable,
    DynamicValueMismatch,
    DynamicAddressOutOfRange,
    DynamicStringOutOfRange,
    DynamicSectionMismatch,
    OrphanRelocationSection,

    InvalidPhdrCount,
    InvalidSegmentSize,
    InvalidSegmentFlags,
    UnalignedSegmentAddress,
    LoadSegmentConflict,
    DynamicPhdrConflict,
    DynamicPhdrMismatch,
    MissingLoadSegments,

    InvalidRelocationEntrySize,
    UnrecognizedRelocationType,
    InvalidRelocationOffset,
    UnsupportedExecImage,

    InvalidNoteSection,
    InvalidDebugLink,
    DebugInfoNotFound,
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileTooShort => {
                write!(f, "ELF file too short")
            }
            Self::ImageTooBig => {
                write!(f, "ELF image too big for the address width")
            }

            Self::InvalidAddressRange => {
                write!(f, "invalid ELF address range")
            }
            Self::InvalidAddressAlignment => {
                write!(f, "invalid ELF address alignment")
            }
            Self::InvalidFileRange => {
                write!(f, "invalid ELF file range")
            }
            Self::UnmappedVaddrRange => {
                write!(f, "reference to unmapped ELF address range")
            }

            Self::UnrecognizedMagic => {
                write!(f, "unrecognized ELF magic")
            }
            Self::UnsupportedClass => {
                write!(f, "unsupported ELF class")
            }
            Self::UnsupportedEndianess => {
                write!(f, "unsupported ELF endianess")
            }
            Self::UnsupportedVersion => {
                write!(f, "unsupported ELF version")
            }
            Self::UnsupportedType => {
                write!(f, "unsupported ELF file type")
            }
            Self::UnsupportedMachine => {
                write!(f, "unsupported ELF machine")
            }
            Self::MachineMismatch => {
                write!(f, "ELF machine does not match the requested architecture")
            }
            Self::InvalidHdrSize => {
                write!(f, "invalid ELF header size")
            }
            Self::InvalidPhdrSize => {
                write!(f, "invalid ELF program header size")
            }
            Self::InvalidShdrSize => {
                write!(f, "invalid ELF section header size")
            }

            Self::InvalidSectionIndex => {
                write!(f, "invalid ELF section index")
            }
            Self::IncompatibleSectionType => {
                write!(f, "unexpected ELF section type")
            }
            Self::MultipleSymtabs => {
                write!(f, "multiple ELF symbol tables")
            }
            Self::MultipleDynamicSections => {
                write!(f, "multiple ELF dynamic sections")
            }
            Self::SectionsOutOfOrder => {
                write!(f, "allocated ELF sections not ordered by address")
            }
            Self::SectionWithoutSegment => {
                write!(f, "allocated ELF section not covered by any PT_LOAD segment")
            }

            Self::InvalidStrtabString => {
                write!(f, "invalid ELF strtab string")
            }
            Self::UnterminatedStrtab => {
                write!(f, "unterminated ELF string table")
            }

            Self::InvalidSymbolEntrySize => {
                write!(f, "invalid ELF symbol entry size")
            }
            Self::InvalidSymbolIndex => {
                write!(f, "invalid ELF symbol index")
            }
            Self::SymbolNotFound => {
                write!(f, "ELF symbol not found")
            }
            Self::SymbolValueTooBig => {
                write!(f, "ELF symbol value does not fit the relocation field")
            }

            Self::InvalidDynamicEntrySize => {
                write!(f, "invalid ELF dynamic entry size")
            }
            Self::UnterminatedDynamicSection => {
                write!(f, "unterminated ELF dynamic section")
            }
            Self::UnpaddedDynamicSection => {
                write!(f, "ELF dynamic section not zero padded after DT_NULL")
            }
            Self::DynamicFieldConflict => {
                write!(f, "conflicting fields in ELF dynamic section")
            }
            Self::UnrecognizedDynamicField => {
                write!(f, "unrecognized field in ELF dynamic section")
            }
            Self::MissingDynamicField => {
                write!(f, "missing field in ELF dynamic section")
            }
            Self::MissingDynamicSection => {
                write!(f, "missing ELF dynamic section")
            }
            Self::MissingDynamicTable => {
                write!(f, "missing ELF dynamic symbol or string table")
            }
            Self::DynamicValueMismatch => {
                write!(f, "ELF dynamic entry value does not match the expected constant")
            }
            Self::DynamicAddressOutOfRange => {
                write!(f, "ELF dynamic entry address outside the image")
            }
            Self::DynamicStringOutOfRange => {
                write!(f, "ELF dynamic entry string offset out of range")
            }
            Self::DynamicSectionMismatch => {
                write!(f, "ELF dynamic entry does not match its section")
            }
            Self::OrphanRelocationSection => {
                write!(f, "ELF relocation section not referenced by the dynamic section")
            }

            Self::InvalidPhdrCount => {
                write!(f, "invalid ELF program header count")
            }
            Self::InvalidSegmentSize => {
                write!(f, "invalid ELF segment size")
            }
            Self::InvalidSegmentFlags => {
                write!(f, "invalid ELF segment flags")
            }
            Self::UnalignedSegmentAddress => {
                write!(f, "unaligned ELF segment address")
            }
            Self::LoadSegmentConflict => {
                write!(f, "ELF PT_LOAD segment does not match the section run")
            }
            Self::DynamicPhdrConflict => {
                write!(f, "expected exactly one ELF PT_DYNAMIC program header")
            }
            Self::DynamicPhdrMismatch => {
                write!(f, "ELF PT_DYNAMIC does not match the dynamic section")
            }
            Self::MissingLoadSegments => {
                write!(f, "no ELF PT_LOAD program headers")
            }

            Self::InvalidRelocationEntrySize => {
                write!(f, "invalid ELF relocation entry size")
            }
            Self::UnrecognizedRelocationType => {
                write!(f, "unrecognized ELF relocation type")
            }
            Self::InvalidRelocationOffset => {
                write!(f, "ELF relocation offset out of bounds")
            }
            Self::UnsupportedExecImage => {
                write!(f, "ELF executables have a fixed load address")
            }

            Self::InvalidNoteSection => {
                write!(f, "invalid ELF note section")
            }
            Self::InvalidDebugLink => {
                write!(f, "invalid .gnu_debuglink section")
            }
            Self::DebugInfoNotFound => {
                write!(f, "no such ELF debug info entry")
            }
        }
    }
}
