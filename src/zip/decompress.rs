//! Per-archive decompressor lookup with built-in fallbacks.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use async_compression::tokio::bufread::DeflateDecoder;
use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use crate::io::RangeRead;

use super::body::EntryBody;
use super::structures::CompressionMethod;

/// Turns an entry's still-compressed bytes into its decoded content.
///
/// The returned stream owns `body`; closing it must release the body too.
pub trait Decompressor: Send + Sync {
    fn decompress(&self, body: EntryBody) -> Box<dyn RangeRead>;
}

impl<F> Decompressor for F
where
    F: Fn(EntryBody) -> Box<dyn RangeRead> + Send + Sync,
{
    fn decompress(&self, body: EntryBody) -> Box<dyn RangeRead> {
        self(body)
    }
}

struct Stored;

impl Decompressor for Stored {
    fn decompress(&self, body: EntryBody) -> Box<dyn RangeRead> {
        Box::new(body)
    }
}

struct Deflate;

impl Decompressor for Deflate {
    fn decompress(&self, body: EntryBody) -> Box<dyn RangeRead> {
        Box::new(Inflate {
            decoder: DeflateDecoder::new(body),
        })
    }
}

/// Inflates an entry body.
///
/// A decoder failure once the body has run out of compressed bytes means
/// the deflate stream was cut short; it is reported as
/// [`io::ErrorKind::UnexpectedEof`].
struct Inflate {
    decoder: DeflateDecoder<EntryBody>,
}

impl AsyncRead for Inflate {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.decoder).poll_read(cx, buf)) {
            Err(err)
                if err.kind() != io::ErrorKind::UnexpectedEof
                    && this.decoder.get_ref().is_exhausted() =>
            {
                Poll::Ready(Err(io::Error::new(io::ErrorKind::UnexpectedEof, err)))
            }
            other => Poll::Ready(other),
        }
    }
}

#[async_trait]
impl RangeRead for Inflate {
    async fn close(&mut self) -> io::Result<()> {
        self.decoder.get_mut().close().await
    }
}

/// Decompressors registered for one archive.
///
/// Overrides are consulted first; the built-in table covers Stored and
/// Deflate.
#[derive(Default, Clone)]
pub struct Decompressors {
    overrides: HashMap<u16, Arc<dyn Decompressor>>,
}

impl Decompressors {
    pub fn register(&mut self, method: u16, decompressor: Arc<dyn Decompressor>) {
        self.overrides.insert(method, decompressor);
    }

    pub fn get(&self, method: u16) -> Option<Arc<dyn Decompressor>> {
        self.overrides
            .get(&method)
            .cloned()
            .or_else(|| builtin(method))
    }
}

impl fmt::Debug for Decompressors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.overrides.keys().collect();
        methods.sort();
        f.debug_struct("Decompressors")
            .field("overrides", &methods)
            .finish()
    }
}

fn builtin(method: u16) -> Option<Arc<dyn Decompressor>> {
    match CompressionMethod::from_u16(method) {
        CompressionMethod::Stored => Some(Arc::new(Stored)),
        CompressionMethod::Deflate => Some(Arc::new(Deflate)),
        CompressionMethod::Unknown(_) => None,
    }
}
