//! Checksum-verifying entry stream.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use async_trait::async_trait;
use crc32fast::Hasher;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::{Result, ZipError};
use crate::io::RangeRead;

use super::structures::FileHeader;

#[derive(Debug)]
enum StreamState {
    Open,
    Done,
    Failed(ZipError),
    Closed,
}

/// Decoded content of one entry.
///
/// Counts the bytes and CRC-32 of everything read. Reaching the end with a
/// size different from the declared one is [`ZipError::Truncated`]; a
/// non-zero declared CRC that does not match is [`ZipError::Checksum`].
/// Once an error is returned, every later read returns it again.
pub struct FileReader {
    inner: Box<dyn RangeRead>,
    hasher: Hasher,
    read: u64,
    expected_size: u64,
    expected_crc: u32,
    state: StreamState,
}

impl FileReader {
    pub(crate) fn new(inner: Box<dyn RangeRead>, header: &FileHeader) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            read: 0,
            expected_size: header.uncompressed_size,
            expected_crc: header.crc32,
            state: StreamState::Open,
        }
    }

    /// Bytes delivered so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// Release the range stream behind this entry.
    ///
    /// Reads after close fail with [`ZipError::Closed`]. Closing twice is a
    /// no-op.
    pub async fn close(&mut self) -> Result<()> {
        if matches!(self.state, StreamState::Closed) {
            return Ok(());
        }
        self.state = StreamState::Closed;
        self.inner.close().await.map_err(ZipError::from)
    }

    fn fail(&mut self, err: ZipError) -> Poll<io::Result<()>> {
        self.state = StreamState::Failed(err.clone());
        Poll::Ready(Err(err.into()))
    }

    fn finish(&mut self) -> Poll<io::Result<()>> {
        if self.read != self.expected_size {
            return self.fail(ZipError::Truncated {
                expected: self.expected_size,
                actual: self.read,
            });
        }
        let computed = self.hasher.clone().finalize();
        if self.expected_crc != 0 && computed != self.expected_crc {
            return self.fail(ZipError::Checksum {
                expected: self.expected_crc,
                computed,
            });
        }
        self.state = StreamState::Done;
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for FileReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match &this.state {
            StreamState::Open => {}
            StreamState::Done => return Poll::Ready(Ok(())),
            StreamState::Failed(err) => return Poll::Ready(Err(err.clone().into())),
            StreamState::Closed => return Poll::Ready(Err(ZipError::Closed.into())),
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        if let Err(err) = ready!(Pin::new(&mut this.inner).poll_read(cx, buf)) {
            let err = match ZipError::from(err) {
                ZipError::Io(inner) if inner.kind() == io::ErrorKind::UnexpectedEof => {
                    ZipError::Truncated {
                        expected: this.expected_size,
                        actual: this.read,
                    }
                }
                other => other,
            };
            return this.fail(err);
        }
        let chunk = &buf.filled()[before..];
        if chunk.is_empty() {
            return this.finish();
        }

        this.hasher.update(chunk);
        this.read += chunk.len() as u64;
        if this.read > this.expected_size {
            return this.fail(ZipError::Truncated {
                expected: this.expected_size,
                actual: this.read,
            });
        }
        Poll::Ready(Ok(()))
    }
}

impl fmt::Debug for FileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileReader")
            .field("read", &self.read)
            .field("expected_size", &self.expected_size)
            .field("expected_crc", &self.expected_crc)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RangeRead for FileReader {
    async fn close(&mut self) -> io::Result<()> {
        FileReader::close(self).await.map_err(io::Error::from)
    }
}
