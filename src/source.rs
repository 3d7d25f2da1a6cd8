// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::ElfError;
use alloc::vec::Vec;
use core::fmt;

/// Byte access to a raw ELF image.
///
/// Implementors provide random-access reads and, optionally, a zero-copy
/// mapping of the whole file. When [`ImageSource::map`] returns a buffer,
/// the loader borrows it for the lifetime of the opened image and calls
/// [`ImageSource::unmap`] once on close; otherwise the image is read into
/// an owned buffer via [`ImageSource::read_at`].
pub trait ImageSource {
    /// Total size of the image in bytes.
    fn size(&self) -> u64;

    /// Reads exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ElfError>;

    /// Returns the whole image as a borrowed buffer, if mapping is
    /// supported.
    fn map(&self) -> Option<&[u8]> {
        None
    }

    /// Releases the mapping handed out by [`ImageSource::map`].
    fn unmap(&self) {}

    /// A name identifying the image in log output.
    fn log_name(&self) -> &str {
        "elf-image"
    }
}

// `&[u8]` rather than `[u8]`: only sized implementors coerce to
// `&dyn ImageSource`.
impl ImageSource for &[u8] {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ElfError> {
        let offset = usize::try_from(offset).map_err(|_| ElfError::FileTooShort)?;
        let end = offset
            .checked_add(buf.len())
            .ok_or(ElfError::FileTooShort)?;
        let src = self.get(offset..end).ok_or(ElfError::FileTooShort)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn map(&self) -> Option<&[u8]> {
        Some(*self)
    }
}

impl ImageSource for Vec<u8> {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ElfError> {
        self.as_slice().read_at(offset, buf)
    }

    fn map(&self) -> Option<&[u8]> {
        Some(self.as_slice())
    }
}

/// The image bytes backing an opened [`crate::ElfImage`], either borrowed
/// from the source's mapping or buffered through reads.
pub(crate) enum ImageBytes<'a> {
    Mapped(&'a [u8]),
    Buffered(Vec<u8>),
}

impl ImageBytes<'_> {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Mapped(buf) => buf,
            Self::Buffered(buf) => buf,
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}

impl fmt::Debug for ImageBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapped(buf) => write!(f, "ImageBytes::Mapped({} bytes)", buf.len()),
            Self::Buffered(buf) => write!(f, "ImageBytes::Buffered({} bytes)", buf.len()),
        }
    }
}
