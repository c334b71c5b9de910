use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::error::{Result, ZipError};

use super::buf::ReadBuf;

/// Value a 16-bit count holds when the real one lives in a zip64 record.
pub const SENTINEL_16: u16 = 0xFFFF;
/// Value a 32-bit size or offset holds when the real one lives in a zip64 record.
pub const SENTINEL_32: u32 = 0xFFFF_FFFF;

/// General purpose flag bit: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub const STORE: u16 = 0;
    pub const DEFLATE: u16 = 8;

    pub fn from_u16(value: u16) -> Self {
        match value {
            Self::STORE => CompressionMethod::Stored,
            Self::DEFLATE => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => Self::STORE,
            CompressionMethod::Deflate => Self::DEFLATE,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::Stored => f.write_str("Stored"),
            CompressionMethod::Deflate => f.write_str("Defl:N"),
            CompressionMethod::Unknown(v) => write!(f, "Unk:{v:03}"),
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes plus comment
///
/// Counts, size and offset are widened so a zip64 end record can
/// overwrite them in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEnd {
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    pub comment: String,
}

impl DirectoryEnd {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Parse a record starting at its signature; `data` must also hold the comment.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut b = ReadBuf::new(data);
        if b.sub(4)?.as_slice() != Self::SIGNATURE {
            return Err(ZipError::format("invalid end of central directory signature"));
        }

        let disk_number = u32::from(b.u16()?);
        let disk_with_cd = u32::from(b.u16()?);
        let disk_entries = u64::from(b.u16()?);
        let total_entries = u64::from(b.u16()?);
        let cd_size = u64::from(b.u32()?);
        let cd_offset = u64::from(b.u32()?);
        let comment_len = usize::from(b.u16()?);
        if comment_len > b.len() {
            return Err(ZipError::format("invalid comment length"));
        }
        let comment = String::from_utf8_lossy(&b.as_slice()[..comment_len]).into_owned();

        Ok(Self {
            disk_number,
            disk_with_cd,
            disk_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment,
        })
    }

    /// Whether any field is saturated and the archive may carry a zip64 end record.
    pub fn is_zip64(&self) -> bool {
        self.total_entries == u64::from(SENTINEL_16)
            || self.cd_size == u64::from(SENTINEL_16)
            || self.cd_size == u64::from(SENTINEL_32)
            || self.cd_offset == u64::from(SENTINEL_32)
    }

    /// Replace the 32-bit fields with the values of a zip64 end record.
    pub fn apply_zip64(&mut self, eocd64: &Zip64EOCD) {
        self.disk_number = eocd64.disk_number;
        self.disk_with_cd = eocd64.disk_with_cd;
        self.disk_entries = eocd64.disk_entries;
        self.total_entries = eocd64.total_entries;
        self.cd_size = eocd64.cd_size;
        self.cd_offset = eocd64.cd_offset;
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone, Copy)]
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut b = ReadBuf::new(data);
        if b.sub(4)?.as_slice() != Self::SIGNATURE {
            return Err(ZipError::format("invalid zip64 locator signature"));
        }

        Ok(Self {
            disk_with_eocd64: b.u32()?,
            eocd64_offset: b.u64()?,
            total_disks: b.u32()?,
        })
    }

    /// Multi-disk archives are not supported; only this shape is trusted.
    pub fn is_single_disk(&self) -> bool {
        self.disk_with_eocd64 == 0 && self.total_disks == 1
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone, Copy)]
pub struct Zip64EOCD {
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut b = ReadBuf::new(data);
        if b.sub(4)?.as_slice() != Self::SIGNATURE {
            return Err(ZipError::format("invalid zip64 end of central directory signature"));
        }

        // record size, version made by, version needed
        b.skip(8 + 2 + 2)?;

        Ok(Self {
            disk_number: b.u32()?,
            disk_with_cd: b.u32()?,
            disk_entries: b.u64()?,
            total_entries: b.u64()?,
            cd_size: b.u64()?,
            cd_offset: b.u64()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

const CREATOR_FAT: u16 = 0;
const CREATOR_UNIX: u16 = 3;
const CREATOR_NTFS: u16 = 11;
const CREATOR_VFAT: u16 = 14;
const CREATOR_MACOSX: u16 = 19;

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFREG: u32 = 0o100_000;

const MSDOS_READ_ONLY: u32 = 0x01;
const MSDOS_DIR: u32 = 0x10;

/// Metadata for one archive entry, decoded from its central directory header.
///
/// Sizes and the header offset are already resolved through any zip64
/// extra field; they never hold the 32-bit sentinel.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Name exactly as stored in the archive.
    pub raw_name: Vec<u8>,
    pub comment: String,
    pub creator_version: u16,
    pub reader_version: u16,
    pub flags: u16,
    pub method: u16,
    /// Legacy MS-DOS time field.
    pub modified_time: u16,
    /// Legacy MS-DOS date field.
    pub modified_date: u16,
    /// Modification instant. The offset is estimated from the legacy fields
    /// when a high-precision timestamp was found; otherwise the legacy time
    /// is reported as UTC.
    pub modified: DateTime<FixedOffset>,
    pub(crate) precise_modified: bool,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub extra: Vec<u8>,
    pub external_attrs: u32,
    pub header_offset: u64,
    /// Name and comment are not known to be UTF-8.
    pub non_utf8: bool,
}

impl FileHeader {
    /// Entry name, lossily decoded as UTF-8.
    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw_name)
    }

    /// Directory entries end with '/'
    pub fn is_dir(&self) -> bool {
        self.raw_name.last() == Some(&b'/')
    }

    pub fn compression(&self) -> CompressionMethod {
        CompressionMethod::from_u16(self.method)
    }

    /// Whether `modified` came from a high-precision extra field rather
    /// than the MS-DOS date/time pair.
    pub fn has_precise_modified(&self) -> bool {
        self.precise_modified
    }

    /// Unix-style mode bits (file type and permissions) derived from the
    /// external attributes of the creating system.
    pub fn mode(&self) -> u32 {
        let mut mode = match self.creator_version >> 8 {
            CREATOR_UNIX | CREATOR_MACOSX => self.external_attrs >> 16,
            CREATOR_FAT | CREATOR_NTFS | CREATOR_VFAT => {
                let attrs = self.external_attrs;
                let mut mode = if attrs & MSDOS_DIR != 0 {
                    S_IFDIR | 0o777
                } else {
                    S_IFREG | 0o666
                };
                if attrs & MSDOS_READ_ONLY != 0 {
                    mode &= !0o222;
                }
                mode
            }
            _ => 0,
        };
        if self.is_dir() {
            mode = (mode & !S_IFMT) | S_IFDIR;
        }
        mode
    }
}
