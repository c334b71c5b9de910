//! Low-level ZIP archive parser.
//!
//! This module handles the binary parsing of ZIP file structures,
//! reading from any source that implements the [`RangeSource`] trait.
//!
//! ## Parsing Strategy
//!
//! ZIP files are designed to be read from the end:
//! 1. Find the End of Central Directory (EOCD) in the file's tail
//! 2. If ZIP64, follow the locator to the ZIP64 EOCD for 64-bit values
//! 3. Stream the Central Directory once, decoding every entry header
//!
//! Opening an archive therefore costs at most five range requests: two
//! tail windows, the zip64 locator and end record, and the directory.

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use crate::error::{Result, ZipError, combine};
use crate::io::RangeSource;

use super::buf::ReadBuf;
use super::extra::{self, RawSizes};
use super::structures::*;

/// Tail windows searched for the EOCD: a small one that covers archives
/// with short comments, then one covering the largest possible comment.
const EOCD_SEARCH_WINDOWS: [u64; 2] = [1024, 65 * 1024];

/// Low-level ZIP parser over a range source.
///
/// Typically used through [`ZipArchive`](super::ZipArchive)
/// rather than directly.
pub(crate) struct ZipParser<'a, S: ?Sized> {
    /// The underlying data source
    source: &'a S,
}

impl<'a, S: RangeSource + ?Sized> ZipParser<'a, S> {
    pub(crate) fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Searches the last 1 KiB first and falls back to the last 65 KiB.
    /// A signature only counts if the comment length it declares fits in
    /// the fetched window, which skips signature bytes inside a comment.
    ///
    /// # Returns
    ///
    /// A tuple of (EOCD record, offset of EOCD in file, file size).
    pub(crate) async fn find_eocd(&self) -> Result<(DirectoryEnd, u64, u64)> {
        for (pass, window) in EOCD_SEARCH_WINDOWS.into_iter().enumerate() {
            let (buf, size) = self.read_tail(window).await?;

            if let Some(pos) = find_signature_in_block(&buf) {
                let eocd = DirectoryEnd::from_bytes(&buf[pos..])?;
                let offset = size - buf.len() as u64 + pos as u64;
                tracing::debug!(offset, window, "found end of central directory");
                return Ok((eocd, offset, size));
            }

            if pass == EOCD_SEARCH_WINDOWS.len() - 1 || buf.len() as u64 == size {
                break;
            }
        }

        Err(ZipError::format("end of central directory record not found"))
    }

    /// Read the ZIP64 End of Central Directory record, if the archive has one.
    ///
    /// The locator sits immediately before the regular EOCD. A missing or
    /// multi-disk locator means the archive is not zip64 after all and the
    /// 32-bit values stand.
    pub(crate) async fn read_zip64_eocd(
        &self,
        eocd_offset: u64,
        size: u64,
    ) -> Result<Option<Zip64EOCD>> {
        let Some(locator_offset) = eocd_offset.checked_sub(Zip64EOCDLocator::SIZE as u64) else {
            return Ok(None);
        };
        let locator_buf = self
            .read_exact_at(locator_offset, Zip64EOCDLocator::SIZE, size)
            .await?;

        let locator = match Zip64EOCDLocator::from_bytes(&locator_buf) {
            Ok(locator) if locator.is_single_disk() => locator,
            Ok(locator) => {
                tracing::warn!(
                    disk = locator.disk_with_eocd64,
                    disks = locator.total_disks,
                    "ignoring zip64 locator for a multi-disk archive"
                );
                return Ok(None);
            }
            Err(_) => return Ok(None),
        };

        let eocd64_buf = self
            .read_exact_at(locator.eocd64_offset, Zip64EOCD::MIN_SIZE, size)
            .await?;
        Zip64EOCD::from_bytes(&eocd64_buf).map(Some)
    }

    /// Locate the directory end, resolving zip64 values when present.
    ///
    /// # Returns
    ///
    /// The resolved record together with the archive size.
    pub(crate) async fn read_directory_end(&self) -> Result<(DirectoryEnd, u64)> {
        let (mut eocd, eocd_offset, size) = self.find_eocd().await?;

        if eocd.is_zip64() {
            if let Some(eocd64) = self.read_zip64_eocd(eocd_offset, size).await? {
                tracing::debug!(
                    entries = eocd64.total_entries,
                    cd_offset = eocd64.cd_offset,
                    "resolved zip64 end of central directory"
                );
                eocd.apply_zip64(&eocd64);
            }
        }

        // Make sure the directory offset points somewhere in the file.
        if eocd.cd_offset >= size {
            return Err(ZipError::format(format!(
                "central directory offset {} outside archive of {size} bytes",
                eocd.cd_offset
            )));
        }

        Ok((eocd, size))
    }

    /// Decode every Central Directory File Header.
    ///
    /// The whole directory is streamed with a single range request running
    /// from its offset to the end of the archive.
    pub(crate) async fn read_directory(
        &self,
        eocd: &DirectoryEnd,
        size: u64,
    ) -> Result<Vec<FileHeader>> {
        let length = size - eocd.cd_offset;
        let stream = self.source.range(eocd.cd_offset, length).await?;
        let mut reader = BufReader::new(stream);

        let capacity = eocd.total_entries.min(length / CDFH_MIN_SIZE as u64) as usize;
        let result = read_entries(&mut reader, eocd.total_entries, capacity).await;
        let released = reader.get_mut().close().await;
        combine(result, released)
    }

    async fn read_tail(&self, window: u64) -> Result<(Vec<u8>, u64)> {
        let (mut stream, size) = self.source.range_from_end(window).await?;
        let mut buf = Vec::with_capacity(window.min(size) as usize);
        let result = (&mut stream)
            .take(window)
            .read_to_end(&mut buf)
            .await
            .map_err(ZipError::from);
        let released = stream.close().await;
        combine(result, released).map(|_| (buf, size))
    }

    async fn read_exact_at(&self, offset: u64, len: usize, size: u64) -> Result<Vec<u8>> {
        if offset.checked_add(len as u64).is_none_or(|end| end > size) {
            return Err(ZipError::format(format!(
                "record at {offset} extends past the end of the archive"
            )));
        }
        let mut stream = self.source.range(offset, len as u64).await?;
        let mut buf = vec![0u8; len];
        let result = stream.read_exact(&mut buf).await.map_err(ZipError::from);
        let released = stream.close().await;
        combine(result, released).map(|_| buf)
    }
}

/// Read headers until one is bad or the stream runs short.
///
/// The stored entry count is truncated to 16 bits by older writers, so
/// the real count may exceed it by multiples of 65536. Only the low 16
/// bits are compared; on mismatch the error that stopped the walk is the
/// open failure, with a short directory reported as a format error.
async fn read_entries<R: AsyncRead + Unpin>(
    reader: &mut R,
    declared: u64,
    capacity: usize,
) -> Result<Vec<FileHeader>> {
    let mut files = Vec::with_capacity(capacity);
    loop {
        match parse_cdfh(reader).await {
            Ok(file) => files.push(file),
            Err(err) if matches!(err, ZipError::Format(_)) || err.is_unexpected_eof() => {
                if files.len() as u16 != declared as u16 {
                    if err.is_unexpected_eof() {
                        return Err(ZipError::format(format!(
                            "central directory ends after {} of {declared} entries",
                            files.len()
                        )));
                    }
                    return Err(err);
                }
                if files.len() as u64 != declared {
                    tracing::warn!(
                        declared,
                        parsed = files.len(),
                        "entry count exceeds the declared 16-bit count"
                    );
                }
                tracing::debug!(entries = files.len(), "parsed central directory");
                return Ok(files);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Parse one Central Directory File Header and its variable-length fields.
async fn parse_cdfh<R: AsyncRead + Unpin>(reader: &mut R) -> Result<FileHeader> {
    let mut fixed = [0u8; CDFH_MIN_SIZE];
    reader.read_exact(&mut fixed).await?;

    let mut b = ReadBuf::new(&fixed);
    if b.sub(4)?.as_slice() != CDFH_SIGNATURE {
        return Err(ZipError::format("invalid central directory file header"));
    }

    let creator_version = b.u16()?;
    let reader_version = b.u16()?;
    let flags = b.u16()?;
    let method = b.u16()?;
    let modified_time = b.u16()?;
    let modified_date = b.u16()?;
    let crc32 = b.u32()?;
    let compressed_size = b.u32()?;
    let uncompressed_size = b.u32()?;
    let name_len = usize::from(b.u16()?);
    let extra_len = usize::from(b.u16()?);
    let comment_len = usize::from(b.u16()?);
    b.skip(4)?; // disk number start, internal attributes
    let external_attrs = b.u32()?;
    let header_offset = b.u32()?;

    let mut variable = vec![0u8; name_len + extra_len + comment_len];
    reader.read_exact(&mut variable).await?;
    let comment_bytes = variable.split_off(name_len + extra_len);
    let extra = variable.split_off(name_len);
    let raw_name = variable;

    let non_utf8 = is_non_utf8(&raw_name, &comment_bytes, flags);

    let resolved = extra::resolve(
        &extra,
        RawSizes {
            compressed: compressed_size,
            uncompressed: uncompressed_size,
            header_offset,
        },
    )?;
    let modified = extra::modified_instant(modified_date, modified_time, resolved.modified);

    Ok(FileHeader {
        raw_name,
        comment: String::from_utf8_lossy(&comment_bytes).into_owned(),
        creator_version,
        reader_version,
        flags,
        method,
        modified_time,
        modified_date,
        modified,
        precise_modified: resolved.modified.is_some(),
        crc32,
        compressed_size: resolved.compressed,
        uncompressed_size: resolved.uncompressed,
        extra,
        external_attrs,
        header_offset: resolved.header_offset,
        non_utf8,
    })
}

/// Decide whether name and comment should be treated as non-UTF-8.
///
/// Invalid UTF-8 settles it. Text made only of ASCII-like characters is
/// UTF-8 regardless of the flag. Anything else could be UTF-8 or a legacy
/// code page, so the flag decides.
fn is_non_utf8(name: &[u8], comment: &[u8], flags: u16) -> bool {
    let (name_valid, name_requires) = detect_utf8(name);
    let (comment_valid, comment_requires) = detect_utf8(comment);
    if !name_valid || !comment_valid {
        true
    } else if !name_requires && !comment_requires {
        false
    } else {
        flags & FLAG_UTF8 == 0
    }
}

/// Returns (valid UTF-8, needs UTF-8 to be read correctly).
///
/// 0x5c and 0x7e are excluded from the shared range because Shift-JIS and
/// EUC-KR map them to other characters.
fn detect_utf8(bytes: &[u8]) -> (bool, bool) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (
            true,
            text.chars().any(|c| c < '\x20' || c > '\x7d' || c == '\\'),
        ),
        Err(_) => (false, false),
    }
}

/// Position of the last EOCD signature whose declared comment fits in `block`.
fn find_signature_in_block(block: &[u8]) -> Option<usize> {
    let last = block.len().checked_sub(DirectoryEnd::SIZE)?;
    (0..=last).rev().find(|&i| {
        if &block[i..i + 4] != DirectoryEnd::SIGNATURE {
            return false;
        }
        let comment_len =
            usize::from(u16::from_le_bytes([block[i + 20], block[i + 21]]));
        i + DirectoryEnd::SIZE + comment_len <= block.len()
    })
}
