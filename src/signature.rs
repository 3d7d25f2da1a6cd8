// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::image::ElfImage;
use alloc::vec::Vec;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Hash algorithms [`ElfImage::hash_image`] can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestKind {
    Sha256,
    Sha384,
    Sha512,
}

/// The fixed trailer kernel-style module signing appends to the file:
/// a 12-byte descriptor followed by a 28-byte magic string, both after
/// the PKCS#7 blob itself.
const SIG_MAGIC: &[u8; 28] = b"~Module signature appended~\n";
const SIG_TRAILER_LEN: usize = 12 + SIG_MAGIC.len();

/// PKCS#7 detached signature, the only identifier type accepted.
const PKEY_ID_PKCS7: u8 = 2;

struct SignatureFooter {
    sig_len: usize,
}

impl ElfImage<'_> {
    /// Parses the signing trailer, if the file carries a valid one. The
    /// descriptor's in-band signer and key id variants are not used with
    /// PKCS#7 and must be zero.
    fn signature_footer(&self) -> Option<SignatureFooter> {
        let buf = self.file_bytes();
        if buf.len() < SIG_TRAILER_LEN {
            return None;
        }
        let magic = &buf[buf.len() - SIG_MAGIC.len()..];
        if magic != SIG_MAGIC {
            return None;
        }
        let desc = &buf[buf.len() - SIG_TRAILER_LEN..buf.len() - SIG_MAGIC.len()];
        let algo = desc[0];
        let hash = desc[1];
        let id_type = desc[2];
        let signer_len = desc[3];
        let key_id_len = desc[4];
        let pad = &desc[5..8];
        let sig_len = u32::from_be_bytes(desc[8..12].try_into().unwrap()) as usize;
        if algo != 0
            || hash != 0
            || id_type != PKEY_ID_PKCS7
            || signer_len != 0
            || key_id_len != 0
            || pad != [0; 3]
            || sig_len == 0
            || sig_len + SIG_TRAILER_LEN > buf.len()
        {
            return None;
        }
        Some(SignatureFooter { sig_len })
    }

    /// Whether the file ends in a well-formed module signature.
    pub fn is_signed(&self) -> bool {
        self.signature_footer().is_some()
    }

    /// The appended PKCS#7 blob, for signed files.
    pub fn pkcs7_signature(&self) -> Option<&[u8]> {
        let footer = self.signature_footer()?;
        let buf = self.file_bytes();
        let end = buf.len() - SIG_TRAILER_LEN;
        Some(&buf[end - footer.sig_len..end])
    }

    /// Hashes the file content the signature covers: everything before
    /// the signature blob, or the whole file when unsigned.
    pub fn hash_image(&self, kind: DigestKind) -> Vec<u8> {
        let buf = self.file_bytes();
        let end = match self.signature_footer() {
            Some(footer) => buf.len() - SIG_TRAILER_LEN - footer.sig_len,
            None => buf.len(),
        };
        let covered = &buf[..end];
        match kind {
            DigestKind::Sha256 => Sha256::digest(covered).to_vec(),
            DigestKind::Sha384 => Sha384::digest(covered).to_vec(),
            DigestKind::Sha512 => Sha512::digest(covered).to_vec(),
        }
    }
}
