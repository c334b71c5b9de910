use async_trait::async_trait;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use super::{RangeRead, RangeSource, RangeStream};

/// Range source over bytes already held in memory
///
/// Keeps count of the requests it served, which makes it useful for
/// checking how many round trips an operation would cost remotely.
pub struct MemorySource {
    data: Arc<[u8]>,
    requests: AtomicUsize,
    transferred_bytes: AtomicU64,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            requests: AtomicUsize::new(0),
            transferred_bytes: AtomicU64::new(0),
        }
    }

    /// Number of range requests served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    /// Total bytes handed out across all requests
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn stream(&self, start: u64, end: u64) -> RangeStream {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.transferred_bytes
            .fetch_add(end - start, Ordering::Relaxed);
        Box::new(MemoryRange {
            data: Arc::clone(&self.data),
            pos: start as usize,
            end: end as usize,
        })
    }
}

#[async_trait]
impl RangeSource for MemorySource {
    async fn range(&self, offset: u64, length: u64) -> io::Result<RangeStream> {
        let size = self.size();
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= size)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("range {offset}+{length} exceeds source size {size}"),
                )
            })?;
        Ok(self.stream(offset, end))
    }

    async fn range_from_end(&self, length: u64) -> io::Result<(RangeStream, u64)> {
        let size = self.size();
        let start = size.saturating_sub(length);
        Ok((self.stream(start, size), size))
    }
}

struct MemoryRange {
    data: Arc<[u8]>,
    pos: usize,
    end: usize,
}

impl AsyncRead for MemoryRange {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let n = buf.remaining().min(self.end - self.pos);
        let start = self.pos;
        buf.put_slice(&self.data[start..start + n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

impl RangeRead for MemoryRange {}
