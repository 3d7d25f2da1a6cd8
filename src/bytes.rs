// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

//! Bounds-checked little-endian accessors over raw image bytes.
//!
//! All reads from the input file and all stores into caller supplied
//! buffers go through these helpers; nothing in the crate does unchecked
//! offset arithmetic on byte pointers.

use super::ElfError;

pub(crate) fn subslice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8], ElfError> {
    let end = offset.checked_add(len).ok_or(ElfError::FileTooShort)?;
    buf.get(offset..end).ok_or(ElfError::FileTooShort)
}

pub(crate) fn le_u16(buf: &[u8], offset: usize) -> Result<u16, ElfError> {
    Ok(u16::from_le_bytes(subslice(buf, offset, 2)?.try_into().unwrap()))
}

pub(crate) fn le_u32(buf: &[u8], offset: usize) -> Result<u32, ElfError> {
    Ok(u32::from_le_bytes(subslice(buf, offset, 4)?.try_into().unwrap()))
}

pub(crate) fn le_u64(buf: &[u8], offset: usize) -> Result<u64, ElfError> {
    Ok(u64::from_le_bytes(subslice(buf, offset, 8)?.try_into().unwrap()))
}

pub(crate) fn le_i32(buf: &[u8], offset: usize) -> Result<i32, ElfError> {
    Ok(i32::from_le_bytes(subslice(buf, offset, 4)?.try_into().unwrap()))
}

pub(crate) fn le_i64(buf: &[u8], offset: usize) -> Result<i64, ElfError> {
    Ok(i64::from_le_bytes(subslice(buf, offset, 8)?.try_into().unwrap()))
}

pub(crate) fn put_u32(buf: &mut [u8], offset: usize, value: u32) -> Result<(), ElfError> {
    let end = offset.checked_add(4).ok_or(ElfError::InvalidRelocationOffset)?;
    let dst = buf
        .get_mut(offset..end)
        .ok_or(ElfError::InvalidRelocationOffset)?;
    dst.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

pub(crate) fn put_u64(buf: &mut [u8], offset: usize, value: u64) -> Result<(), ElfError> {
    let end = offset.checked_add(8).ok_or(ElfError::InvalidRelocationOffset)?;
    let dst = buf
        .get_mut(offset..end)
        .ok_or(ElfError::InvalidRelocationOffset)?;
    dst.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_reads() {
        let buf = [0x11u8, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
        assert_eq!(le_u16(&buf, 0).unwrap(), 0x2211);
        assert_eq!(le_u32(&buf, 2).unwrap(), 0x66554433);
        assert_eq!(le_u64(&buf, 0).unwrap(), 0x8877665544332211);
        assert_eq!(le_u32(&buf, 5), Err(ElfError::FileTooShort));
        assert_eq!(le_u16(&buf, usize::MAX), Err(ElfError::FileTooShort));
    }

    #[test]
    fn test_checked_writes() {
        let mut buf = [0u8; 8];
        put_u32(&mut buf, 2, 0xa1b2c3d4).unwrap();
        assert_eq!(buf, [0, 0, 0xd4, 0xc3, 0xb2, 0xa1, 0, 0]);
        assert_eq!(
            put_u64(&mut buf, 1, 0),
            Err(ElfError::InvalidRelocationOffset)
        );
    }
}
