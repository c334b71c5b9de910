//! Builds ZIP archives byte by byte so tests control every field.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use flate2::Compression;
use flate2::write::DeflateEncoder;
use rangezip::{MemorySource, ZipArchive};

/// 2020-06-15 12:30:00 in MS-DOS encoding.
pub const DOS_DATE: u16 = (40 << 9) | (6 << 5) | 15;
pub const DOS_TIME: u16 = (12 << 11) | (30 << 5);

const SENTINEL_32: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone)]
pub struct EntrySpec {
    pub name: Vec<u8>,
    /// Bytes written after the local header.
    pub body: Vec<u8>,
    pub method: u16,
    pub crc32: u32,
    pub uncompressed_size: u64,
    pub central_extra: Vec<u8>,
    pub local_extra: Vec<u8>,
    pub comment: Vec<u8>,
    pub flags: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub external_attrs: u32,
    /// Store sizes and offset as sentinels with a zip64 extra record.
    pub zip64: bool,
    /// Name length written into the local header, when it should lie.
    pub local_name_len: Option<u16>,
}

impl EntrySpec {
    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            body: data.to_vec(),
            method: 0,
            crc32: crc32fast::hash(data),
            uncompressed_size: data.len() as u64,
            central_extra: Vec::new(),
            local_extra: Vec::new(),
            comment: Vec::new(),
            flags: 0,
            dos_time: DOS_TIME,
            dos_date: DOS_DATE,
            external_attrs: 0o100644 << 16,
            zip64: false,
            local_name_len: None,
        }
    }

    pub fn deflated(name: &str, data: &[u8]) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Self {
            body: encoder.finish().unwrap(),
            method: 8,
            ..Self::stored(name, data)
        }
    }

    pub fn dir(name: &str) -> Self {
        Self {
            external_attrs: 0o040755 << 16,
            ..Self::stored(name, b"")
        }
    }

    pub fn with_crc(mut self, crc32: u32) -> Self {
        self.crc32 = crc32;
        self
    }

    pub fn with_method(mut self, method: u16) -> Self {
        self.method = method;
        self
    }

    pub fn with_uncompressed_size(mut self, size: u64) -> Self {
        self.uncompressed_size = size;
        self
    }

    pub fn with_central_extra(mut self, extra: Vec<u8>) -> Self {
        self.central_extra = extra;
        self
    }

    pub fn with_local_extra(mut self, extra: Vec<u8>) -> Self {
        self.local_extra = extra;
        self
    }

    pub fn with_zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    pub fn with_local_name_len(mut self, len: u16) -> Self {
        self.local_name_len = Some(len);
        self
    }
}

#[derive(Debug, Default)]
pub struct ZipBuilder {
    entries: Vec<EntrySpec>,
    comment: Vec<u8>,
    prefix: Vec<u8>,
    suffix: Vec<u8>,
    declared_count: Option<u16>,
    zip64_end: bool,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: EntrySpec) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(EntrySpec::stored(name, data))
    }

    pub fn deflated(self, name: &str, data: &[u8]) -> Self {
        self.entry(EntrySpec::deflated(name, data))
    }

    pub fn dir(self, name: &str) -> Self {
        self.entry(EntrySpec::dir(name))
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// Bytes placed before the first local header.
    pub fn prefix(mut self, bytes: &[u8]) -> Self {
        self.prefix = bytes.to_vec();
        self
    }

    /// Bytes appended after the end record.
    pub fn suffix(mut self, bytes: &[u8]) -> Self {
        self.suffix = bytes.to_vec();
        self
    }

    /// Entry count written into the end record instead of the real one.
    pub fn declared_count(mut self, count: u16) -> Self {
        self.declared_count = Some(count);
        self
    }

    /// Write a zip64 end record and locator, saturating the 32-bit record.
    pub fn zip64_end(mut self) -> Self {
        self.zip64_end = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = self.prefix.clone();
        let mut central = Vec::new();

        for entry in &self.entries {
            let offset = out.len() as u64;
            let compressed = entry.body.len() as u64;
            let (csize, usize_, offset32) = if entry.zip64 {
                (SENTINEL_32, SENTINEL_32, SENTINEL_32)
            } else {
                (compressed as u32, entry.uncompressed_size as u32, offset as u32)
            };

            out.extend_from_slice(b"PK\x03\x04");
            put16(&mut out, 20);
            put16(&mut out, entry.flags);
            put16(&mut out, entry.method);
            put16(&mut out, entry.dos_time);
            put16(&mut out, entry.dos_date);
            put32(&mut out, entry.crc32);
            put32(&mut out, csize);
            put32(&mut out, usize_);
            put16(&mut out, entry.local_name_len.unwrap_or(entry.name.len() as u16));
            put16(&mut out, entry.local_extra.len() as u16);
            out.extend_from_slice(&entry.name);
            out.extend_from_slice(&entry.local_extra);
            out.extend_from_slice(&entry.body);

            let mut extra = entry.central_extra.clone();
            if entry.zip64 {
                put16(&mut extra, 0x0001);
                put16(&mut extra, 24);
                put64(&mut extra, entry.uncompressed_size);
                put64(&mut extra, compressed);
                put64(&mut extra, offset);
            }

            central.extend_from_slice(b"PK\x01\x02");
            put16(&mut central, (3 << 8) | 20);
            put16(&mut central, 20);
            put16(&mut central, entry.flags);
            put16(&mut central, entry.method);
            put16(&mut central, entry.dos_time);
            put16(&mut central, entry.dos_date);
            put32(&mut central, entry.crc32);
            put32(&mut central, csize);
            put32(&mut central, usize_);
            put16(&mut central, entry.name.len() as u16);
            put16(&mut central, extra.len() as u16);
            put16(&mut central, entry.comment.len() as u16);
            put16(&mut central, 0);
            put16(&mut central, 0);
            put32(&mut central, entry.external_attrs);
            put32(&mut central, offset32);
            central.extend_from_slice(&entry.name);
            central.extend_from_slice(&extra);
            central.extend_from_slice(&entry.comment);
        }

        let cd_offset = out.len() as u64;
        let cd_size = central.len() as u64;
        out.extend_from_slice(&central);

        let count = self.entries.len() as u64;
        let declared = self
            .declared_count
            .unwrap_or(count.min(0xFFFF) as u16);

        if self.zip64_end {
            let eocd64_offset = out.len() as u64;
            out.extend_from_slice(b"PK\x06\x06");
            put64(&mut out, 44);
            put16(&mut out, 45);
            put16(&mut out, 45);
            put32(&mut out, 0);
            put32(&mut out, 0);
            put64(&mut out, count);
            put64(&mut out, count);
            put64(&mut out, cd_size);
            put64(&mut out, cd_offset);

            out.extend_from_slice(b"PK\x06\x07");
            put32(&mut out, 0);
            put64(&mut out, eocd64_offset);
            put32(&mut out, 1);

            out.extend_from_slice(b"PK\x05\x06");
            put16(&mut out, 0);
            put16(&mut out, 0);
            put16(&mut out, 0xFFFF);
            put16(&mut out, 0xFFFF);
            put32(&mut out, SENTINEL_32);
            put32(&mut out, SENTINEL_32);
        } else {
            out.extend_from_slice(b"PK\x05\x06");
            put16(&mut out, 0);
            put16(&mut out, 0);
            put16(&mut out, declared);
            put16(&mut out, declared);
            put32(&mut out, cd_size as u32);
            put32(&mut out, cd_offset as u32);
        }
        put16(&mut out, self.comment.len() as u16);
        out.extend_from_slice(&self.comment);
        out.extend_from_slice(&self.suffix);
        out
    }

    pub fn source(&self) -> Arc<MemorySource> {
        Arc::new(MemorySource::new(self.build()))
    }

    pub async fn open(&self) -> (ZipArchive<MemorySource>, Arc<MemorySource>) {
        let source = self.source();
        let archive = ZipArchive::new(Arc::clone(&source))
            .await
            .expect("archive should open");
        (archive, source)
    }
}

/// An extra-field record with the given tag.
pub fn extra_record(tag: u16, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    put16(&mut out, tag);
    put16(&mut out, data.len() as u16);
    out.extend_from_slice(data);
    out
}

fn put16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}
