// SPDX-License-Identifier: (GPL-2.0-or-later OR MIT)
//
// Copyright (c) 2025-2026 SUSE LLC
//
// vim: ts=4 sw=4 et

use super::*;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use sha2::{Digest, Sha256};

const EM_386: u16 = 3;
const EM_X86_64: u16 = 62;

const VBASE: u64 = 0x10000;

fn w16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn w32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn w64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

fn align16(v: u64) -> u64 {
    (v + 15) & !15
}

struct SecSpec {
    name: &'static str,
    sh_type: u32,
    flags: u64,
    addr: u64,
    size: u64,
    link: u32,
    info: u32,
    align: u64,
    entsize: u64,
    data: Vec<u8>,
}

/// Assembles a syntactically valid ELF file from a section list. Data
/// is laid out from offset 0x100 in 16-byte steps, followed by the
/// section name table, the program headers and the section headers.
struct ImgBuilder {
    class: ElfClass,
    e_machine: u16,
    e_type: u16,
    e_entry: u64,
    secs: Vec<SecSpec>,
    offsets: Vec<u64>,
    cursor: u64,
    phdrs: Vec<Elf64Phdr>,
}

impl ImgBuilder {
    fn new(class: ElfClass, e_machine: u16, e_type: u16) -> Self {
        Self {
            class,
            e_machine,
            e_type,
            e_entry: 0,
            secs: vec![SecSpec {
                name: "",
                sh_type: 0,
                flags: 0,
                addr: 0,
                size: 0,
                link: 0,
                info: 0,
                align: 0,
                entsize: 0,
                data: Vec::new(),
            }],
            offsets: vec![0],
            cursor: 0x100,
            phdrs: Vec::new(),
        }
    }

    fn next_offset(&self) -> u64 {
        align16(self.cursor)
    }

    #[allow(clippy::too_many_arguments)]
    fn add(
        &mut self,
        name: &'static str,
        sh_type: u32,
        flags: u64,
        addr: u64,
        data: &[u8],
        link: u32,
        info: u32,
        align: u64,
        entsize: u64,
    ) -> usize {
        let offset = self.next_offset();
        self.offsets.push(offset);
        self.cursor = offset + data.len() as u64;
        self.secs.push(SecSpec {
            name,
            sh_type,
            flags,
            addr,
            size: data.len() as u64,
            link,
            info,
            align,
            entsize,
            data: data.to_vec(),
        });
        self.secs.len() - 1
    }

    fn offset_of(&self, idx: usize) -> u64 {
        self.offsets[idx]
    }

    fn phdr(&mut self, phdr: Elf64Phdr) {
        self.phdrs.push(phdr);
    }

    fn build(mut self) -> Vec<u8> {
        // Section name table, itself the last section.
        let mut names = vec![0u8];
        let mut name_offs = Vec::with_capacity(self.secs.len() + 1);
        for sec in self.secs.iter() {
            if sec.name.is_empty() {
                name_offs.push(0u32);
            } else {
                name_offs.push(names.len() as u32);
                names.extend_from_slice(sec.name.as_bytes());
                names.push(0);
            }
        }
        name_offs.push(names.len() as u32);
        names.extend_from_slice(b".shstrtab\0");
        let shstrndx = self.secs.len();
        let shstr_len = names.len() as u64;
        self.add(".shstrtab", Elf64Shdr::SHT_STRTAB, 0, 0, &names, 0, 0, 1, 0);
        let shstr_off = self.offset_of(shstrndx);
        // The builder appended a spec for the name table; its own name
        // offset was precomputed above.
        let shnum = self.secs.len();

        let (phdr_entsize, shdr_entsize) = match self.class {
            ElfClass::Elf32 => (32usize, 40usize),
            ElfClass::Elf64 => (56usize, 64usize),
        };
        let phoff = if self.phdrs.is_empty() {
            0
        } else {
            align16(shstr_off + shstr_len)
        };
        let shoff = align16(if phoff != 0 {
            phoff + (self.phdrs.len() * phdr_entsize) as u64
        } else {
            shstr_off + shstr_len
        });
        let total = shoff as usize + shnum * shdr_entsize;
        let mut buf = vec![0u8; total];

        buf[..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
        buf[4] = match self.class {
            ElfClass::Elf32 => 1,
            ElfClass::Elf64 => 2,
        };
        buf[5] = 1; // little endian
        buf[6] = 1; // EV_CURRENT
        w16(&mut buf, 16, self.e_type);
        w16(&mut buf, 18, self.e_machine);
        w32(&mut buf, 20, 1);
        match self.class {
            ElfClass::Elf32 => {
                w32(&mut buf, 24, self.e_entry as u32);
                w32(&mut buf, 28, phoff as u32);
                w32(&mut buf, 32, shoff as u32);
                w16(&mut buf, 40, 52);
                w16(&mut buf, 42, if self.phdrs.is_empty() { 0 } else { 32 });
                w16(&mut buf, 44, self.phdrs.len() as u16);
                w16(&mut buf, 46, 40);
                w16(&mut buf, 48, shnum as u16);
                w16(&mut buf, 50, shstrndx as u16);
            }
            ElfClass::Elf64 => {
                w64(&mut buf, 24, self.e_entry);
                w64(&mut buf, 32, phoff);
                w64(&mut buf, 40, shoff);
                w16(&mut buf, 52, 64);
                w16(&mut buf, 54, if self.phdrs.is_empty() { 0 } else { 56 });
                w16(&mut buf, 56, self.phdrs.len() as u16);
                w16(&mut buf, 58, 64);
                w16(&mut buf, 60, shnum as u16);
                w16(&mut buf, 62, shstrndx as u16);
            }
        }

        for (idx, sec) in self.secs.iter().enumerate() {
            let off = self.offsets[idx] as usize;
            buf[off..off + sec.data.len()].copy_from_slice(&sec.data);
        }

        for (i, phdr) in self.phdrs.iter().enumerate() {
            let off = phoff as usize + i * phdr_entsize;
            match self.class {
                ElfClass::Elf32 => {
                    w32(&mut buf, off, phdr.p_type);
                    w32(&mut buf, off + 4, phdr.p_offset as u32);
                    w32(&mut buf, off + 8, phdr.p_vaddr as u32);
                    w32(&mut buf, off + 12, phdr.p_paddr as u32);
                    w32(&mut buf, off + 16, phdr.p_filesz as u32);
                    w32(&mut buf, off + 20, phdr.p_memsz as u32);
                    w32(&mut buf, off + 24, phdr.p_flags);
                    w32(&mut buf, off + 28, phdr.p_align as u32);
                }
                ElfClass::Elf64 => {
                    w32(&mut buf, off, phdr.p_type);
                    w32(&mut buf, off + 4, phdr.p_flags);
                    w64(&mut buf, off + 8, phdr.p_offset);
                    w64(&mut buf, off + 16, phdr.p_vaddr);
                    w64(&mut buf, off + 24, phdr.p_paddr);
                    w64(&mut buf, off + 32, phdr.p_filesz);
                    w64(&mut buf, off + 40, phdr.p_memsz);
                    w64(&mut buf, off + 48, phdr.p_align);
                }
            }
        }

        for (idx, sec) in self.secs.iter().enumerate() {
            let off = shoff as usize + idx * shdr_entsize;
            if idx == 0 {
                continue;
            }
            match self.class {
                ElfClass::Elf32 => {
                    w32(&mut buf, off, name_offs[idx]);
                    w32(&mut buf, off + 4, sec.sh_type);
                    w32(&mut buf, off + 8, sec.flags as u32);
                    w32(&mut buf, off + 12, sec.addr as u32);
                    w32(&mut buf, off + 16, self.offsets[idx] as u32);
                    w32(&mut buf, off + 20, sec.size as u32);
                    w32(&mut buf, off + 24, sec.link);
                    w32(&mut buf, off + 28, sec.info);
                    w32(&mut buf, off + 32, sec.align as u32);
                    w32(&mut buf, off + 36, sec.entsize as u32);
                }
                ElfClass::Elf64 => {
                    w32(&mut buf, off, name_offs[idx]);
                    w32(&mut buf, off + 4, sec.sh_type);
                    w64(&mut buf, off + 8, sec.flags);
                    w64(&mut buf, off + 16, sec.addr);
                    w64(&mut buf, off + 24, self.offsets[idx]);
                    w64(&mut buf, off + 32, sec.size);
                    w32(&mut buf, off + 40, sec.link);
                    w32(&mut buf, off + 44, sec.info);
                    w64(&mut buf, off + 48, sec.align);
                    w64(&mut buf, off + 56, sec.entsize);
                }
            }
        }
        buf
    }
}

struct StrBlob {
    data: Vec<u8>,
}

impl StrBlob {
    fn new() -> Self {
        Self { data: vec![0] }
    }

    fn add(&mut self, s: &str) -> u32 {
        let off = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        off
    }
}

fn sym64(name: u32, info: u8, shndx: u16, value: u64, size: u64) -> [u8; 24] {
    let mut buf = [0u8; 24];
    w32(&mut buf, 0, name);
    buf[4] = info;
    w16(&mut buf, 6, shndx);
    w64(&mut buf, 8, value);
    w64(&mut buf, 16, size);
    buf
}

fn sym32(name: u32, info: u8, shndx: u16, value: u32, size: u32) -> [u8; 16] {
    let mut buf = [0u8; 16];
    w32(&mut buf, 0, name);
    w32(&mut buf, 4, value);
    w32(&mut buf, 8, size);
    buf[12] = info;
    w16(&mut buf, 14, shndx);
    buf
}

fn rela64(offset: u64, sym: u32, r_type: u32, addend: i64) -> [u8; 24] {
    let mut buf = [0u8; 24];
    w64(&mut buf, 0, offset);
    w64(&mut buf, 8, (u64::from(sym) << 32) | u64::from(r_type));
    w64(&mut buf, 16, addend as u64);
    buf
}

fn rel32(offset: u32, sym: u32, r_type: u32) -> [u8; 8] {
    let mut buf = [0u8; 8];
    w32(&mut buf, 0, offset);
    w32(&mut buf, 4, (sym << 8) | (r_type & 0xff));
    buf
}

fn dyn64(tag: i64, val: u64) -> [u8; 16] {
    let mut buf = [0u8; 16];
    w64(&mut buf, 0, tag as u64);
    w64(&mut buf, 8, val);
    buf
}

fn open<S: ImageSource>(buf: &S) -> Result<ElfImage<'_>, ElfError> {
    ElfImage::open(buf, &ElfOpenOptions::default())
}

fn no_imports(_: &str, _: u32) -> Result<Elf64Addr, ElfError> {
    Err(ElfError::SymbolNotFound)
}

/// A relocatable x86-64 object: .text and .data with relocations
/// against one defined, one undefined and two non-global symbols.
fn build_rel_object(relocs: &[[u8; 24]]) -> Vec<u8> {
    let mut b = ImgBuilder::new(ElfClass::Elf64, EM_X86_64, Elf64Hdr::ET_REL);
    let text = b.add(
        ".text",
        Elf64Shdr::SHT_PROGBITS,
        0x6, // ALLOC | EXECINSTR
        0,
        &[0u8; 16],
        0,
        0,
        16,
        0,
    ) as u16;
    let data = b.add(
        ".data",
        Elf64Shdr::SHT_PROGBITS,
        0x3, // WRITE | ALLOC
        0,
        &[0xaau8; 8],
        0,
        0,
        16,
        0,
    ) as u16;

    let mut strtab = StrBlob::new();
    let n_answer = strtab.add("answer");
    let n_external = strtab.add("external");
    let n_local = strtab.add("local_helper");
    let n_weak = strtab.add("weak_sym");
    let mut syms = Vec::new();
    syms.extend_from_slice(&sym64(0, 0, 0, 0, 0));
    syms.extend_from_slice(&sym64(n_answer, 0x10, data, 4, 4)); // global
    syms.extend_from_slice(&sym64(n_external, 0x10, 0, 0, 0)); // undefined
    syms.extend_from_slice(&sym64(n_local, 0x00, text, 0, 0)); // local
    syms.extend_from_slice(&sym64(n_weak, 0x20, text, 8, 0)); // weak

    let reloc_data: Vec<u8> = relocs.iter().flatten().copied().collect();
    let rela = b.add(
        ".rela.text",
        Elf64Shdr::SHT_RELA,
        0,
        0,
        &reloc_data,
        0,
        text.into(),
        8,
        24,
    );
    let symtab = b.add(
        ".symtab",
        Elf64Shdr::SHT_SYMTAB,
        0,
        0,
        &syms,
        0,
        0,
        8,
        24,
    );
    let strtab_idx = b.add(".strtab", Elf64Shdr::SHT_STRTAB, 0, 0, &strtab.data, 0, 0, 1, 0);
    // Patch the symtab's string table link.
    b.secs[symtab].link = strtab_idx as u32;
    b.secs[rela].link = symtab as u32;
    b.build()
}

/// A shared object with a dynamic table, one relative fixup and one
/// exported symbol. `mutate` may rewrite the dynamic entries.
fn build_shared_object(mutate: impl FnOnce(&mut Vec<(i64, u64)>)) -> Vec<u8> {
    build_shared_object_with(mutate, |_| ())
}

fn build_shared_object_with(
    mutate: impl FnOnce(&mut Vec<(i64, u64)>),
    mutate_phdrs: impl FnOnce(&mut Vec<Elf64Phdr>),
) -> Vec<u8> {
    let mut b = ImgBuilder::new(ElfClass::Elf64, EM_X86_64, Elf64Hdr::ET_DYN);
    let first_off = b.next_offset();
    let addr_of = |off: u64| VBASE + (off - first_off);

    let mut dynstr = StrBlob::new();
    let n_answer = dynstr.add("answer");

    // Section data sizes are fixed up front so addresses can be
    // computed as sections are added.
    let dynsym_off = b.next_offset();
    let mut syms = Vec::new();
    syms.extend_from_slice(&sym64(0, 0, 0, 0, 0));
    // Patched once the .data address is known.
    let answer_sym_slot = syms.len();
    syms.extend_from_slice(&sym64(n_answer, 0x10, 0, 0, 8));
    let dynsym = b.add(
        ".dynsym",
        Elf64Shdr::SHT_DYNSYM,
        0x2,
        addr_of(dynsym_off),
        &syms,
        0,
        0,
        8,
        24,
    );

    let dynstr_off = b.next_offset();
    let dynstr_idx = b.add(
        ".dynstr",
        Elf64Shdr::SHT_STRTAB,
        0x2,
        addr_of(dynstr_off),
        &dynstr.data,
        0,
        0,
        1,
        0,
    );
    b.secs[dynsym].link = dynstr_idx as u32;

    // One base-relative fixup in .data, which lands two sections later.
    let rela_off = b.next_offset();
    let rela_addr = addr_of(rela_off);

    let mut entries = vec![
        (Elf64Dyn::DT_STRTAB, addr_of(dynstr_off)),
        (Elf64Dyn::DT_SYMTAB, addr_of(dynsym_off)),
        (Elf64Dyn::DT_STRSZ, dynstr.data.len() as u64),
        (Elf64Dyn::DT_SYMENT, 24),
        (Elf64Dyn::DT_RELA, rela_addr),
        (Elf64Dyn::DT_RELASZ, 24),
        (Elf64Dyn::DT_RELAENT, 24),
        (Elf64Dyn::DT_NULL, 0),
    ];
    mutate(&mut entries);

    let dynamic_off = align16(rela_off + 24);
    let dynamic_addr = addr_of(dynamic_off);
    let data_off = align16(dynamic_off + entries.len() as u64 * 16);
    let data_addr = addr_of(data_off);

    let reloc = rela64(data_addr, 0, 8, (data_addr + 0x20) as i64); // R_X86_64_RELATIVE
    let rela = b.add(
        ".rela.dyn",
        Elf64Shdr::SHT_RELA,
        0x2,
        rela_addr,
        &reloc,
        dynsym as u32,
        0,
        8,
        24,
    );
    assert_eq!(b.offset_of(rela), rela_off);

    let dyn_data: Vec<u8> = entries
        .iter()
        .flat_map(|&(tag, val)| dyn64(tag, val))
        .collect();
    let dynamic = b.add(
        ".dynamic",
        Elf64Shdr::SHT_DYNAMIC,
        0x3,
        dynamic_addr,
        &dyn_data,
        dynstr_idx as u32,
        0,
        8,
        16,
    );
    assert_eq!(b.offset_of(dynamic), dynamic_off);

    let data = b.add(
        ".data",
        Elf64Shdr::SHT_PROGBITS,
        0x3,
        data_addr,
        &[0u8; 0x30],
        0,
        0,
        16,
        0,
    );
    assert_eq!(b.offset_of(data), data_off);

    // Now that .data has its section index, fix the exported symbol up.
    let sym = sym64(n_answer, 0x10, data as u16, data_addr + 8, 8);
    b.secs[dynsym].data[answer_sym_slot..answer_sym_slot + 24].copy_from_slice(&sym);

    let file_end = b.cursor;
    b.e_entry = VBASE + 0x10;
    b.phdr(Elf64Phdr {
        p_type: Elf64Phdr::PT_LOAD,
        p_flags: 0x5, // R | X
        p_offset: first_off,
        p_vaddr: VBASE,
        p_paddr: VBASE,
        p_filesz: file_end - first_off,
        p_memsz: file_end - first_off,
        p_align: 1,
    });
    b.phdr(Elf64Phdr {
        p_type: Elf64Phdr::PT_DYNAMIC,
        p_flags: 0x4, // R
        p_offset: dynamic_off,
        p_vaddr: dynamic_addr,
        p_paddr: dynamic_addr,
        p_filesz: dyn_data.len() as u64,
        p_memsz: dyn_data.len() as u64,
        p_align: 1,
    });
    mutate_phdrs(&mut b.phdrs);
    b.build()
}

#[test]
fn test_reject_bad_ident() {
    let good = build_rel_object(&[]);

    let mut bad = good.clone();
    bad[0] = 0x7e;
    assert_eq!(open(&bad).unwrap_err(), ElfError::UnrecognizedMagic);

    let mut bad = good.clone();
    bad[4] = 3;
    assert_eq!(open(&bad).unwrap_err(), ElfError::UnsupportedClass);

    let mut bad = good.clone();
    bad[5] = 2;
    assert_eq!(open(&bad).unwrap_err(), ElfError::UnsupportedEndianess);

    let mut bad = good;
    bad[6] = 0;
    assert_eq!(open(&bad).unwrap_err(), ElfError::UnsupportedVersion);
}

#[test]
fn test_reject_bad_header_fields() {
    let good = build_rel_object(&[]);

    let mut bad = good.clone();
    w16(&mut bad, 18, 40); // EM_ARM
    assert_eq!(open(&bad).unwrap_err(), ElfError::UnsupportedMachine);

    let mut bad = good.clone();
    w16(&mut bad, 18, EM_386); // 32-bit machine in a 64-bit file
    assert_eq!(open(&bad).unwrap_err(), ElfError::MachineMismatch);

    let mut bad = good.clone();
    w16(&mut bad, 16, 4); // ET_CORE
    assert_eq!(open(&bad).unwrap_err(), ElfError::UnsupportedType);

    let mut bad = good.clone();
    w16(&mut bad, 52, 52);
    assert_eq!(open(&bad).unwrap_err(), ElfError::InvalidHdrSize);

    let mut bad = good.clone();
    w16(&mut bad, 58, 40);
    assert_eq!(open(&bad).unwrap_err(), ElfError::InvalidShdrSize);

    let mut bad = good;
    w16(&mut bad, 62, 0);
    assert_eq!(open(&bad).unwrap_err(), ElfError::InvalidSectionIndex);
}

#[test]
fn test_arch_constraint() {
    let buf = build_rel_object(&[]);
    let opts = ElfOpenOptions {
        arch: Some(ElfMachine::X86),
        ..Default::default()
    };
    assert_eq!(
        ElfImage::open(&buf, &opts).unwrap_err(),
        ElfError::MachineMismatch
    );
    let opts = ElfOpenOptions {
        arch: Some(ElfMachine::Amd64),
        ..Default::default()
    };
    assert!(ElfImage::open(&buf, &opts).is_ok());
}

#[test]
fn test_byte_slice_source() {
    // Borrowed slices and owned vectors both work as image sources.
    let buf = build_rel_object(&[]);
    let slice: &[u8] = &buf;
    let image = ElfImage::open(&slice, &ElfOpenOptions::default()).unwrap();
    assert_eq!(image.image_size(), 24);
    let image = open(&buf).unwrap();
    assert_eq!(image.image_size(), 24);
}

#[test]
fn test_rel_layout() {
    let buf = build_rel_object(&[]);
    let image = open(&buf).unwrap();
    // .text at 0, .data aligned up to 16.
    assert_eq!(image.image_size(), 24);
    assert_eq!(image.entry_point(0x1000), None);
}

#[test]
fn test_rel_get_bits_abs64() {
    // R_X86_64_64 against the defined "answer" symbol (.data + 4).
    let buf = build_rel_object(&[rela64(8, 1, 1, 2)]);
    let image = open(&buf).unwrap();
    let mut bits = vec![0u8; image.image_size() as usize];
    image.get_bits(0x1000, &mut bits, &mut no_imports).unwrap();
    // .data contents copied to offset 16.
    assert_eq!(&bits[16..24], &[0xaa; 8]);
    // S = base + 16 + 4, A = 2.
    let field = u64::from_le_bytes(bits[8..16].try_into().unwrap());
    assert_eq!(field, 0x1000 + 16 + 4 + 2);
}

#[test]
fn test_rel_pc32_via_resolver() {
    // R_X86_64_PC32 against the undefined "external" symbol.
    let buf = build_rel_object(&[rela64(4, 2, 2, -4)]);
    let image = open(&buf).unwrap();
    let mut bits = vec![0u8; image.image_size() as usize];
    let mut seen = Vec::new();
    let mut resolver = |name: &str, ordinal: u32| {
        seen.push((String::from(name), ordinal));
        Ok(0x2000u64)
    };
    image.get_bits(0x1000, &mut bits, &mut resolver).unwrap();
    assert_eq!(seen, [(String::from("external"), 2)]);
    let field = u32::from_le_bytes(bits[4..8].try_into().unwrap());
    // S + A - P = 0x2000 - 4 - (0x1000 + 4).
    assert_eq!(field, 0x2000 - 4 - (0x1000 + 4));
}

#[test]
fn test_rel_truncation_checked() {
    // R_X86_64_32 with a value that does not fit 32 bits.
    let buf = build_rel_object(&[rela64(0, 2, 10, 0)]);
    let image = open(&buf).unwrap();
    let mut bits = vec![0u8; image.image_size() as usize];
    let mut resolver = |_: &str, _: u32| Ok(0x1_0000_0000u64);
    assert_eq!(
        image.get_bits(0, &mut bits, &mut resolver).unwrap_err(),
        ElfError::SymbolValueTooBig
    );
    // The same value is fine for the sign-checked 32S only when
    // negative values round-trip; this one does not.
    let buf = build_rel_object(&[rela64(0, 2, 11, 0)]);
    let image = open(&buf).unwrap();
    assert_eq!(
        image.get_bits(0, &mut bits, &mut resolver).unwrap_err(),
        ElfError::SymbolValueTooBig
    );
}

#[test]
fn test_rel_unknown_reloc_type() {
    let buf = build_rel_object(&[rela64(0, 1, 99, 0)]);
    let image = open(&buf).unwrap();
    let mut bits = vec![0u8; image.image_size() as usize];
    assert_eq!(
        image.get_bits(0, &mut bits, &mut no_imports).unwrap_err(),
        ElfError::UnrecognizedRelocationType
    );
}

#[test]
fn test_rel_reloc_past_target_end() {
    // R_X86_64_32 at offset 16 of the 16 byte .text: the fixup would
    // spill into the adjacent .data bytes of the image.
    let buf = build_rel_object(&[rela64(16, 1, 10, 0)]);
    let image = open(&buf).unwrap();
    let mut bits = vec![0u8; image.image_size() as usize];
    assert_eq!(
        image.get_bits(0, &mut bits, &mut no_imports).unwrap_err(),
        ElfError::InvalidRelocationOffset
    );
    // Nothing outside .text was written before the error.
    assert_eq!(&bits[16..24], &[0xaa; 8]);

    // Straddling the section end by a single byte is rejected too.
    let buf = build_rel_object(&[rela64(13, 1, 10, 0)]);
    let image = open(&buf).unwrap();
    assert_eq!(
        image.get_bits(0, &mut bits, &mut no_imports).unwrap_err(),
        ElfError::InvalidRelocationOffset
    );
}

#[test]
fn test_rel_symbols() {
    let buf = build_rel_object(&[]);
    let image = open(&buf).unwrap();

    // "answer" lives at .data (offset 16) + 4.
    assert_eq!(
        image.get_symbol(SymbolRef::Name("answer"), 0x1000).unwrap(),
        0x1000 + 16 + 4
    );
    assert_eq!(
        image.get_symbol(SymbolRef::Ordinal(1), 0).unwrap(),
        16 + 4
    );
    assert_eq!(
        image.get_symbol(SymbolRef::Name("nonexistent"), 0).unwrap_err(),
        ElfError::SymbolNotFound
    );
    // Undefined and local symbols are not addressable.
    assert_eq!(
        image.get_symbol(SymbolRef::Name("external"), 0).unwrap_err(),
        ElfError::SymbolNotFound
    );
    assert_eq!(
        image.get_symbol(SymbolRef::Ordinal(3), 0).unwrap_err(),
        ElfError::SymbolNotFound
    );
    assert_eq!(
        image.get_symbol(SymbolRef::Ordinal(1000), 0).unwrap_err(),
        ElfError::InvalidSymbolIndex
    );
    // Weak symbols are addressable by name.
    assert_eq!(
        image.get_symbol(SymbolRef::Name("weak_sym"), 0).unwrap(),
        8
    );
}

#[test]
fn test_rel_symbol_enumeration() {
    let buf = build_rel_object(&[]);
    let image = open(&buf).unwrap();

    let mut all = Vec::new();
    image
        .enumerate_symbols(SymbolFilter::All, 0, &mut |sym| {
            all.push((String::from(sym.name), sym.value));
            Ok(())
        })
        .unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.contains(&(String::from("answer"), 20)));
    assert!(all.contains(&(String::from("local_helper"), 0)));
    assert!(all.contains(&(String::from("weak_sym"), 8)));

    let mut exported = Vec::new();
    image
        .enumerate_symbols(SymbolFilter::Exported, 0, &mut |sym| {
            exported.push(String::from(sym.name));
            Ok(())
        })
        .unwrap();
    assert_eq!(exported, ["answer"]);
}

#[test]
fn test_rel_rva_roundtrip() {
    let buf = build_rel_object(&[]);
    let image = open(&buf).unwrap();

    // .data occupies image offsets 16..24 as segment 1.
    assert_eq!(image.rva_to_seg_offset(20).unwrap(), (1, 4));
    assert_eq!(image.seg_offset_to_rva(1, 4).unwrap(), 20);
    assert_eq!(
        image.seg_offset_to_rva(1000, 0).unwrap_err(),
        ElfError::InvalidSectionIndex
    );
}

#[test]
fn test_shared_object_translation() {
    let buf = build_shared_object(|_| ());
    let image = open(&buf).unwrap();

    // Link addresses map straight to image offsets shifted by the base.
    for rva in [0u64, 4, 0x20, 0x40] {
        assert_eq!(image.link_address_to_rva(VBASE + rva).unwrap(), rva);
        let (seg, off) = image.link_address_to_seg_offset(VBASE + rva).unwrap();
        assert_eq!(image.seg_offset_to_rva(seg, off).unwrap(), rva);
        assert_eq!(image.rva_to_seg_offset(rva).unwrap(), (seg, off));
    }
    assert_eq!(
        image.link_address_to_rva(VBASE - 1).unwrap_err(),
        ElfError::UnmappedVaddrRange
    );
    assert_eq!(
        image.link_address_to_rva(VBASE + 0x100000).unwrap_err(),
        ElfError::UnmappedVaddrRange
    );
}

#[test]
fn test_rel_segment_enumeration() {
    let buf = build_rel_object(&[]);
    let image = open(&buf).unwrap();
    let mut segs = Vec::new();
    image
        .for_each_segment(&mut |seg| {
            segs.push((String::from(seg.name.as_ref()), seg.rva, seg.mapped_size));
            Ok(())
        })
        .unwrap();
    assert!(segs.contains(&(String::from(".text"), Some(0), Some(16))));
    assert!(segs.contains(&(String::from(".data"), Some(16), Some(8))));
    // Unallocated sections report no mapping.
    assert!(segs
        .iter()
        .any(|(name, rva, _)| name == ".symtab" && rva.is_none()));
}

#[test]
fn test_elf32_implicit_addend() {
    let mut b = ImgBuilder::new(ElfClass::Elf32, EM_386, Elf64Hdr::ET_REL);
    let mut text = vec![0u8; 8];
    w32(&mut text, 0, 0x10); // implicit addend
    let text_idx = b.add(".text", Elf64Shdr::SHT_PROGBITS, 0x6, 0, &text, 0, 0, 4, 0);

    let mut strtab = StrBlob::new();
    let n_target = strtab.add("target");
    let mut syms = Vec::new();
    syms.extend_from_slice(&sym32(0, 0, 0, 0, 0));
    syms.extend_from_slice(&sym32(n_target, 0x10, text_idx as u16, 0, 0));

    let reloc = rel32(0, 1, 1); // R_386_32
    let rel_idx = b.add(
        ".rel.text",
        Elf64Shdr::SHT_REL,
        0,
        0,
        &reloc,
        0,
        text_idx as u32,
        4,
        8,
    );
    let symtab = b.add(".symtab", Elf64Shdr::SHT_SYMTAB, 0, 0, &syms, 0, 0, 4, 16);
    let strtab_idx = b.add(".strtab", Elf64Shdr::SHT_STRTAB, 0, 0, &strtab.data, 0, 0, 1, 0);
    b.secs[symtab].link = strtab_idx as u32;
    b.secs[rel_idx].link = symtab as u32;
    let buf = b.build();

    let image = open(&buf).unwrap();
    assert_eq!(image.class(), ElfClass::Elf32);
    assert_eq!(image.machine(), ElfMachine::X86);
    let mut bits = vec![0u8; image.image_size() as usize];
    image.get_bits(0x4000, &mut bits, &mut no_imports).unwrap();
    // S + A with the addend taken from the patched field itself.
    let field = u32::from_le_bytes(bits[0..4].try_into().unwrap());
    assert_eq!(field, 0x4000 + 0x10);
}

#[test]
fn test_shared_object_open() {
    let buf = build_shared_object(|_| ());
    let image = open(&buf).unwrap();
    assert_eq!(image.entry_point(0x200000), Some(0x200010));
    // Exported symbol sits at .data + 8.
    let value = image
        .get_symbol(SymbolRef::Name("answer"), 0x200000)
        .unwrap();
    let (_, off) = image.rva_to_seg_offset(value - 0x200000).unwrap();
    assert_eq!(off, 8);
}

#[test]
fn test_shared_object_relative_fixup() {
    let buf = build_shared_object(|_| ());
    let image = open(&buf).unwrap();
    let size = image.image_size() as usize;
    let mut bits = vec![0u8; size];
    let base = 0x7f00_0000u64;
    image.get_bits(base, &mut bits, &mut no_imports).unwrap();

    // The fixup targets the first qword of .data; its addend pointed
    // 0x20 past the section start in the link domain.
    assert_eq!(image.link_address_to_rva(VBASE).unwrap(), 0);
    let mut patched = None;
    image
        .for_each_segment(&mut |seg| {
            if seg.name == ".data" {
                patched = seg.rva;
            }
            Ok(())
        })
        .unwrap();
    let rva = patched.unwrap() as usize;
    let field = u64::from_le_bytes(bits[rva..rva + 8].try_into().unwrap());
    assert_eq!(field, base + patched.unwrap() + 0x20);
}

#[test]
fn test_shared_object_relocate_idempotent() {
    let buf = build_shared_object(|_| ());
    let image = open(&buf).unwrap();
    let size = image.image_size() as usize;
    let mut first = vec![0u8; size];
    image.get_bits(0x1000, &mut first, &mut no_imports).unwrap();
    let mut second = first.clone();
    // Rebasing twice must land on the same result as a fresh pass.
    image
        .relocate(&mut second, 0x9000, 0x1000, &mut no_imports)
        .unwrap();
    let mut fresh = vec![0u8; size];
    image.get_bits(0x9000, &mut fresh, &mut no_imports).unwrap();
    assert_eq!(second, fresh);
}

#[test]
fn test_relocate_rejects_exec_image() {
    let mut buf = build_shared_object(|_| ());
    w16(&mut buf, 16, Elf64Hdr::ET_EXEC);
    let image = open(&buf).unwrap();
    let mut bits = vec![0u8; image.image_size() as usize];
    assert_eq!(
        image.get_bits(0x9000, &mut bits, &mut no_imports).unwrap_err(),
        ElfError::UnsupportedExecImage
    );
    // Rebasing an already materialized executable is just as impossible.
    assert_eq!(
        image
            .relocate(&mut bits, 0x9000, 0, &mut no_imports)
            .unwrap_err(),
        ElfError::UnsupportedExecImage
    );
}

#[test]
fn test_trailing_load_keeps_image_size() {
    // A second PT_LOAD revisiting the base address must not shrink the
    // computed image below the sections already placed.
    let buf = build_shared_object_with(
        |_| (),
        |phdrs| {
            let mut extra = phdrs[0];
            extra.p_filesz = 0x10;
            extra.p_memsz = 0x10;
            phdrs.push(extra);
        },
    );
    let image = open(&buf).unwrap();
    assert_eq!(image.image_size(), 0x110);
    let mut bits = vec![0u8; image.image_size() as usize];
    image.get_bits(0, &mut bits, &mut no_imports).unwrap();
    // The .data fixup still lands inside the buffer.
    let field = u64::from_le_bytes(bits[0xe0..0xe8].try_into().unwrap());
    assert_eq!(field, 0x100);
}

#[test]
fn test_misordered_section_repair() {
    // Zero out the stored address of .data (section 5) the way some
    // linkers emit late sections.
    let mut buf = build_shared_object(|_| ());
    let shoff = u64::from_le_bytes(buf[40..48].try_into().unwrap()) as usize;
    w64(&mut buf, shoff + 5 * 64 + 16, 0);

    assert_eq!(open(&buf).unwrap_err(), ElfError::SectionsOutOfOrder);

    let opts = ElfOpenOptions {
        repair_misordered_sections: true,
        ..Default::default()
    };
    let image = ElfImage::open(&buf, &opts).unwrap();
    // The running cursor puts .data right back where it was linked.
    let mut repaired = None;
    image
        .for_each_segment(&mut |seg| {
            if seg.name == ".data" {
                repaired = seg.rva;
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(repaired, Some(0xe0));
}

#[test]
fn test_dynamic_table_validation() {
    let buf = build_shared_object(|entries| {
        for e in entries.iter_mut() {
            if e.0 == Elf64Dyn::DT_STRSZ {
                e.1 += 1;
            }
        }
    });
    assert_eq!(open(&buf).unwrap_err(), ElfError::DynamicValueMismatch);

    let buf = build_shared_object(|entries| {
        for e in entries.iter_mut() {
            if e.0 == Elf64Dyn::DT_RELASZ {
                e.1 = 48;
            }
        }
    });
    assert_eq!(open(&buf).unwrap_err(), ElfError::DynamicSectionMismatch);

    let buf = build_shared_object(|entries| {
        entries.retain(|e| e.0 != Elf64Dyn::DT_RELASZ);
    });
    assert_eq!(open(&buf).unwrap_err(), ElfError::MissingDynamicField);

    let buf = build_shared_object(|entries| {
        for e in entries.iter_mut() {
            if e.0 == Elf64Dyn::DT_NULL {
                *e = (Elf64Dyn::DT_DEBUG, 0);
            }
        }
    });
    assert_eq!(
        open(&buf).unwrap_err(),
        ElfError::UnterminatedDynamicSection
    );
}

#[test]
fn test_dynamic_strictness() {
    let buf = build_shared_object(|entries| {
        entries.insert(0, (Elf64Dyn::DT_INIT, VBASE));
    });
    assert_eq!(open(&buf).unwrap_err(), ElfError::UnrecognizedDynamicField);

    let opts = ElfOpenOptions {
        strictness: StrictnessMode::ForDebug,
        ..Default::default()
    };
    assert!(ElfImage::open(&buf, &opts).is_ok());
}

#[test]
fn test_signature_footer() {
    let unsigned = build_rel_object(&[]);
    {
        let image = open(&unsigned).unwrap();
        assert!(!image.is_signed());
        assert_eq!(image.pkcs7_signature(), None);
        assert_eq!(
            image.hash_image(DigestKind::Sha256),
            Sha256::digest(&unsigned).to_vec()
        );
    }

    let blob = b"not really pkcs7 data";
    let mut signed = unsigned.clone();
    signed.extend_from_slice(blob);
    let mut desc = [0u8; 12];
    desc[2] = 2; // PKEY_ID_PKCS7
    desc[8..12].copy_from_slice(&(blob.len() as u32).to_be_bytes());
    signed.extend_from_slice(&desc);
    signed.extend_from_slice(b"~Module signature appended~\n");

    {
        let image = open(&signed).unwrap();
        assert!(image.is_signed());
        assert_eq!(image.pkcs7_signature(), Some(blob.as_slice()));
        // The hash covers the file up to the signature.
        assert_eq!(
            image.hash_image(DigestKind::Sha256),
            Sha256::digest(&unsigned).to_vec()
        );
    }

    // A nonzero descriptor field invalidates the whole trailer.
    let mut bad = signed;
    let len = bad.len();
    bad[len - 40 + 1] = 1;
    let image = open(&bad).unwrap();
    assert!(!image.is_signed());
}

#[test]
fn test_debug_info_enumeration() {
    let mut b = ImgBuilder::new(ElfClass::Elf64, EM_X86_64, Elf64Hdr::ET_REL);
    b.add(".text", Elf64Shdr::SHT_PROGBITS, 0x6, 0, &[0u8; 4], 0, 0, 4, 0);
    let dwarf_payload = [0x11u8; 12];
    let dbg = b.add(
        ".debug_info",
        Elf64Shdr::SHT_PROGBITS,
        0,
        0,
        &dwarf_payload,
        0,
        0,
        1,
        0,
    );
    let mut link = Vec::new();
    link.extend_from_slice(b"mod.dbg\0");
    link.extend_from_slice(&0xdeadbeefu32.to_le_bytes());
    b.add(
        ".gnu_debuglink",
        Elf64Shdr::SHT_PROGBITS,
        0,
        0,
        &link,
        0,
        0,
        1,
        0,
    );
    let buf = b.build();
    let image = open(&buf).unwrap();

    let mut found = Vec::new();
    image
        .enumerate_debug_info(&mut |info| {
            found.push((info.id, info.file_offset, info.size));
            match info.kind {
                DebugInfoKind::Dwarf { section_name } => {
                    assert_eq!(section_name, ".debug_info");
                }
                DebugInfoKind::DebugLink { filename, crc } => {
                    assert_eq!(filename, "mod.dbg");
                    assert_eq!(crc, 0xdeadbeef);
                }
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].0, dbg as u32 - 1);

    let (id, off, size) = found[0];
    assert_eq!(image.read_debug_info(id, off, size).unwrap(), dwarf_payload);
    assert_eq!(
        image.read_debug_info(id, off + 1, size).unwrap_err(),
        ElfError::DebugInfoNotFound
    );
}

#[test]
fn test_build_id() {
    let mut b = ImgBuilder::new(ElfClass::Elf64, EM_X86_64, Elf64Hdr::ET_REL);
    b.add(".text", Elf64Shdr::SHT_PROGBITS, 0x6, 0, &[0u8; 4], 0, 0, 4, 0);
    let mut note = Vec::new();
    note.extend_from_slice(&4u32.to_le_bytes()); // namesz
    note.extend_from_slice(&8u32.to_le_bytes()); // descsz
    note.extend_from_slice(&3u32.to_le_bytes()); // NT_GNU_BUILD_ID
    note.extend_from_slice(b"GNU\0");
    note.extend_from_slice(&[0xab; 8]);
    b.add(
        ".note.gnu.build-id",
        Elf64Shdr::SHT_NOTE,
        0,
        0,
        &note,
        0,
        0,
        4,
        0,
    );
    let buf = b.build();
    let image = open(&buf).unwrap();
    assert_eq!(image.query_build_id().unwrap(), Some([0xab; 8].as_slice()));

    // No note section at all.
    let plain = build_rel_object(&[]);
    let image = open(&plain).unwrap();
    assert_eq!(image.query_build_id().unwrap(), None);
}

#[test]
fn test_eh_frame_lookup() {
    let mut b = ImgBuilder::new(ElfClass::Elf64, EM_X86_64, Elf64Hdr::ET_REL);
    b.add(".text", Elf64Shdr::SHT_PROGBITS, 0x6, 0, &[0u8; 4], 0, 0, 4, 0);
    let hdr = b.add(
        ".eh_frame_hdr",
        Elf64Shdr::SHT_PROGBITS,
        0x2,
        0,
        &[0u8; 8],
        0,
        0,
        4,
        0,
    );
    let frame = b.add(
        ".eh_frame",
        Elf64Shdr::SHT_PROGBITS,
        0x2,
        0,
        &[0u8; 16],
        0,
        0,
        8,
        0,
    );
    let buf = b.build();
    let image = open(&buf).unwrap();
    assert_eq!(
        image.eh_frame_sections(),
        (Some(frame as u32), Some(hdr as u32))
    );
}

#[test]
fn test_two_images_independent() {
    let rel = build_rel_object(&[]);
    let dynimg = build_shared_object(|_| ());
    let a = open(&rel).unwrap();
    let b = open(&dynimg).unwrap();
    assert_eq!(a.image_size(), 24);
    assert!(b.image_size() > a.image_size());
    assert!(a.entry_point(0).is_none());
    assert!(b.entry_point(0).is_some());
}
