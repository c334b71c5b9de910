//! Entry body access.
//!
//! The local header's extra field may differ in length from the central
//! directory's copy, so its size is unknown until the header is read. A
//! single range request therefore covers the local header, the name, the
//! compressed bytes and `slack` extra bytes for the local extra field.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, BufReader, Chain, ReadBuf, Take};

use crate::error::{Result, ZipError};
use crate::io::{RangeRead, RangeSource, RangeStream};

use super::structures::{CompressionMethod, FileHeader, LFH_SIGNATURE, LFH_SIZE};

/// Exactly `compressed_size` bytes of an entry, positioned after its local
/// header. Closing it releases the range stream it was cut from.
pub struct EntryBody {
    inner: Take<BufReader<RangeStream>>,
    eof: bool,
}

impl EntryBody {
    /// Compressed bytes not yet read.
    pub fn remaining(&self) -> u64 {
        self.inner.limit()
    }

    /// Whether every available compressed byte has been handed out, either
    /// because the declared size was reached or the range stream ran dry.
    pub fn is_exhausted(&self) -> bool {
        self.eof || self.remaining() == 0
    }
}

impl fmt::Debug for EntryBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryBody")
            .field("remaining", &self.remaining())
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for EntryBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let wanted = buf.remaining() > 0;
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        if wanted && buf.filled().len() == before {
            this.eof = true;
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncBufRead for EntryBody {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        let this = self.get_mut();
        let chunk = ready!(Pin::new(&mut this.inner).poll_fill_buf(cx))?;
        if chunk.is_empty() {
            this.eof = true;
        }
        Poll::Ready(Ok(chunk))
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        Pin::new(&mut self.get_mut().inner).consume(amt)
    }
}

#[async_trait]
impl RangeRead for EntryBody {
    async fn close(&mut self) -> io::Result<()> {
        self.inner.get_mut().get_mut().close().await
    }
}

/// Open the compressed body of `header`.
///
/// `size` is the archive size; the request never runs past it.
pub(crate) async fn open_body<S: RangeSource + ?Sized>(
    source: &S,
    size: u64,
    header: &FileHeader,
    slack: u64,
) -> Result<EntryBody> {
    let offset = header.header_offset;
    if offset >= size {
        return Err(ZipError::format(format!(
            "local header offset {offset} outside archive of {size} bytes"
        )));
    }

    let length = header
        .compressed_size
        .saturating_add(LFH_SIZE as u64)
        .saturating_add(header.raw_name.len() as u64)
        .saturating_add(slack)
        .min(size - offset);
    tracing::trace!(name = %header.name(), offset, length, "requesting entry body");

    let stream = source.range(offset, length).await?;
    let mut reader = BufReader::new(stream);
    if let Err(err) = skip_local_header(&mut reader, header).await {
        let released = reader.get_mut().close().await;
        return Err(err.with_release(released));
    }

    Ok(EntryBody {
        inner: reader.take(header.compressed_size),
        eof: false,
    })
}

/// Validate the local header and advance past its name and extra field.
async fn skip_local_header<R: AsyncRead + Unpin>(
    reader: &mut R,
    header: &FileHeader,
) -> Result<()> {
    let mut fixed = [0u8; LFH_SIZE];
    reader.read_exact(&mut fixed).await?;
    if &fixed[..4] != LFH_SIGNATURE {
        return Err(ZipError::format("invalid local file header"));
    }

    let name_len = usize::from(u16::from_le_bytes([fixed[26], fixed[27]]));
    let extra_len = usize::from(u16::from_le_bytes([fixed[28], fixed[29]]));
    if name_len != header.raw_name.len() {
        return Err(ZipError::format(format!(
            "local header name length {name_len} does not match central directory ({})",
            header.raw_name.len()
        )));
    }

    let mut variable = vec![0u8; name_len + extra_len];
    reader.read_exact(&mut variable).await?;
    Ok(())
}

const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 8, 0, 0, 0, 0, 0, 2, 255];

type GzipChain = Chain<Chain<io::Cursor<[u8; 10]>, EntryBody>, io::Cursor<[u8; 8]>>;

/// A deflate entry's raw bytes framed as a gzip member.
///
/// The content is not decompressed or verified here; the trailer carries
/// the CRC-32 and size declared in the central directory.
pub struct GzipReader {
    inner: GzipChain,
}

impl GzipReader {
    pub(crate) fn new(body: EntryBody, header: &FileHeader) -> Result<Self> {
        if header.method != CompressionMethod::DEFLATE {
            return Err(ZipError::Algorithm(header.method));
        }
        let mut trailer = [0u8; 8];
        trailer[..4].copy_from_slice(&header.crc32.to_le_bytes());
        // gzip stores the size modulo 2^32
        trailer[4..].copy_from_slice(&(header.uncompressed_size as u32).to_le_bytes());

        let inner = io::Cursor::new(GZIP_HEADER)
            .chain(body)
            .chain(io::Cursor::new(trailer));
        Ok(Self { inner })
    }
}

impl fmt::Debug for GzipReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipReader").finish_non_exhaustive()
    }
}

impl AsyncRead for GzipReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

#[async_trait]
impl RangeRead for GzipReader {
    async fn close(&mut self) -> io::Result<()> {
        let (framed, _) = self.inner.get_mut();
        let (_, body) = framed.get_mut();
        body.close().await
    }
}
