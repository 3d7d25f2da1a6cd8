// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::types::*;
use super::ElfError;

/// A virtual address range `[vaddr_begin, vaddr_end)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Elf64AddrRange {
    pub vaddr_begin: Elf64Addr,
    pub vaddr_end: Elf64Addr,
}

impl Elf64AddrRange {
    pub fn len(&self) -> Elf64Xword {
        self.vaddr_end - self.vaddr_begin
    }

    pub fn is_empty(&self) -> bool {
        self.vaddr_begin == self.vaddr_end
    }

    pub fn contains(&self, vaddr: Elf64Addr) -> bool {
        self.vaddr_begin <= vaddr && vaddr < self.vaddr_end
    }
}

/// Builds a range from a `(base, size)` pair, failing with
/// [`ElfError::InvalidAddressRange`] when the end would wrap around.
impl TryFrom<(Elf64Addr, Elf64Xword)> for Elf64AddrRange {
    type Error = ElfError;

    fn try_from(value: (Elf64Addr, Elf64Xword)) -> Result<Self, Self::Error> {
        let vaddr_begin = value.0;
        let vaddr_end = vaddr_begin
            .checked_add(value.1)
            .ok_or(ElfError::InvalidAddressRange)?;
        Ok(Self {
            vaddr_begin,
            vaddr_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_from_pair() {
        let range = Elf64AddrRange::try_from((0x1000u64, 0x200u64)).unwrap();
        assert_eq!(range.len(), 0x200);
        assert!(range.contains(0x1000));
        assert!(range.contains(0x11ff));
        assert!(!range.contains(0x1200));

        assert_eq!(
            Elf64AddrRange::try_from((u64::MAX, 1u64)),
            Err(ElfError::InvalidAddressRange)
        );
    }
}
