mod http;
mod local;
mod memory;

pub use http::HttpRangeSource;
pub use local::LocalFileSource;
pub use memory::MemorySource;

use async_trait::async_trait;
use std::io;
use tokio::io::AsyncRead;

/// A byte stream over one requested range that must be released when done.
///
/// Dropping the stream releases it too, but only [`close`](RangeRead::close)
/// reports a failure to do so.
#[async_trait]
pub trait RangeRead: AsyncRead + Send + Unpin {
    /// Release the underlying resource.
    async fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Owned range stream handed out by a [`RangeSource`].
pub type RangeStream = Box<dyn RangeRead>;

/// Trait for byte-range access to a remote or otherwise non-local archive
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Open a stream over `length` bytes starting at `offset`.
    ///
    /// Callers keep `offset + length` within the source size.
    async fn range(&self, offset: u64, length: u64) -> io::Result<RangeStream>;

    /// Open a stream over the last `length` bytes (fewer if the source is
    /// shorter), returning it together with the total source size.
    async fn range_from_end(&self, length: u64) -> io::Result<(RangeStream, u64)>;
}
