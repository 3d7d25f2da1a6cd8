// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::types::*;
use super::ElfError;

/// A byte range `[offset_begin, offset_end)` within the raw image file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Elf64FileRange {
    pub offset_begin: usize,
    pub offset_end: usize,
}

impl Elf64FileRange {
    pub fn len(&self) -> usize {
        self.offset_end - self.offset_begin
    }

    pub fn is_empty(&self) -> bool {
        self.offset_begin == self.offset_end
    }

    /// Returns the range's bytes out of `buf`, which must cover it fully.
    pub fn slice<'a>(&self, buf: &'a [u8]) -> Result<&'a [u8], ElfError> {
        buf.get(self.offset_begin..self.offset_end)
            .ok_or(ElfError::FileTooShort)
    }
}

/// Builds a range from an `(offset, size)` pair, failing with
/// [`ElfError::InvalidFileRange`] on wrap-around or when either bound does
/// not fit a `usize`.
impl TryFrom<(Elf64Off, Elf64Xword)> for Elf64FileRange {
    type Error = ElfError;

    fn try_from(value: (Elf64Off, Elf64Xword)) -> Result<Self, Self::Error> {
        let offset_begin = usize::try_from(value.0).map_err(|_| ElfError::InvalidFileRange)?;
        let size = usize::try_from(value.1).map_err(|_| ElfError::InvalidFileRange)?;
        let offset_end = offset_begin
            .checked_add(size)
            .ok_or(ElfError::InvalidFileRange)?;
        Ok(Self {
            offset_begin,
            offset_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_from_pair() {
        let range = Elf64FileRange::try_from((0x40u64, 0x10u64)).unwrap();
        assert_eq!(range.len(), 0x10);

        let buf = [0u8; 0x50];
        assert_eq!(range.slice(&buf).unwrap().len(), 0x10);
        assert_eq!(range.slice(&buf[..0x45]), Err(ElfError::FileTooShort));

        assert_eq!(
            Elf64FileRange::try_from((u64::MAX, 2u64)),
            Err(ElfError::InvalidFileRange)
        );
    }
}
