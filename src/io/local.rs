use async_trait::async_trait;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, ReadBuf, Take};

use super::{RangeRead, RangeSource, RangeStream};

/// Local file source with random access support
///
/// Every range request opens its own handle, so concurrent entry reads
/// never share a file cursor.
pub struct LocalFileSource {
    path: PathBuf,
    size: u64,
}

impl LocalFileSource {
    pub async fn new(path: &Path) -> io::Result<Self> {
        let size = tokio::fs::metadata(path).await?.len();
        Ok(Self {
            path: path.to_path_buf(),
            size,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    async fn open_at(&self, offset: u64, length: u64) -> io::Result<RangeStream> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(Box::new(FileRange {
            inner: file.take(length),
        }))
    }
}

#[async_trait]
impl RangeSource for LocalFileSource {
    async fn range(&self, offset: u64, length: u64) -> io::Result<RangeStream> {
        if offset.checked_add(length).is_none_or(|end| end > self.size) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "range {offset}+{length} exceeds file size {}",
                    self.size
                ),
            ));
        }
        self.open_at(offset, length).await
    }

    async fn range_from_end(&self, length: u64) -> io::Result<(RangeStream, u64)> {
        let length = length.min(self.size);
        let stream = self.open_at(self.size - length, length).await?;
        Ok((stream, self.size))
    }
}

struct FileRange {
    inner: Take<File>,
}

impl AsyncRead for FileRange {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl RangeRead for FileRange {}
