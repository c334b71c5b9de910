use async_trait::async_trait;
use bytes::{Buf, Bytes};
use reqwest::{Client, Response, StatusCode};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

use super::{RangeRead, RangeSource, RangeStream};

/// HTTP Range source for remote ZIP files
pub struct HttpRangeSource {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: Arc<AtomicU64>,
    max_retry: u32,
}

impl HttpRangeSource {
    /// Create a new HTTP Range source
    ///
    /// This will send a HEAD request to verify Range support and get file size
    pub async fn new(url: String) -> io::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(io::Error::other)?;

        // Send HEAD request to check capabilities
        let resp = client.head(&url).send().await.map_err(io::Error::other)?;

        if !resp.status().is_success() {
            return Err(io::Error::other(format!(
                "HTTP request failed with status: {}",
                resp.status()
            )));
        }

        // Check if server supports Range requests
        let accept_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");

        if !accept_ranges.contains("bytes") {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "Remote server does not support Range requests",
            ));
        }

        // Get file size from Content-Length
        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| io::Error::other("Remote server did not return Content-Length"))?;

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: Arc::new(AtomicU64::new(0)),
            max_retry: 10,
        })
    }

    /// Set how many times a failed connection attempt is retried
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry.max(1);
        self
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    async fn fetch(&self, offset: u64, length: u64) -> io::Result<RangeStream> {
        if length == 0 {
            return Ok(Box::new(HttpRange::empty(Arc::clone(
                &self.transferred_bytes,
            ))));
        }

        let range = format!("bytes={}-{}", offset, offset + length - 1);
        let mut retry_count = 0;

        loop {
            let result = self
                .client
                .get(&self.url)
                .header("Range", &range)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    if resp.status() != StatusCode::PARTIAL_CONTENT {
                        return Err(io::Error::other(format!(
                            "HTTP request failed with status: {}",
                            resp.status()
                        )));
                    }
                    tracing::trace!(url = %self.url, %range, "range request");
                    return Ok(Box::new(HttpRange::new(
                        resp,
                        Arc::clone(&self.transferred_bytes),
                    )));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("Max retries exceeded: {e}"),
                        ));
                    }
                    tracing::warn!(
                        retry = retry_count,
                        max_retry = self.max_retry,
                        error = %e,
                        "connection error, retrying range request"
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(io::Error::other(e)),
            }
        }
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    async fn range(&self, offset: u64, length: u64) -> io::Result<RangeStream> {
        if offset.checked_add(length).is_none_or(|end| end > self.size) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("range {offset}+{length} exceeds remote size {}", self.size),
            ));
        }
        self.fetch(offset, length).await
    }

    async fn range_from_end(&self, length: u64) -> io::Result<(RangeStream, u64)> {
        let length = length.min(self.size);
        let stream = self.fetch(self.size - length, length).await?;
        Ok((stream, self.size))
    }
}

type ChunkFuture = Pin<Box<dyn Future<Output = (Response, reqwest::Result<Option<Bytes>>)> + Send>>;

enum BodyState {
    Idle(Option<Response>),
    Fetching(ChunkFuture),
}

/// Response body streamed chunk by chunk as it arrives.
struct HttpRange {
    state: BodyState,
    chunk: Bytes,
    transferred_bytes: Arc<AtomicU64>,
}

impl HttpRange {
    fn new(resp: Response, transferred_bytes: Arc<AtomicU64>) -> Self {
        Self {
            state: BodyState::Idle(Some(resp)),
            chunk: Bytes::new(),
            transferred_bytes,
        }
    }

    fn empty(transferred_bytes: Arc<AtomicU64>) -> Self {
        Self {
            state: BodyState::Idle(None),
            chunk: Bytes::new(),
            transferred_bytes,
        }
    }
}

impl AsyncRead for HttpRange {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        loop {
            if !this.chunk.is_empty() {
                let n = buf.remaining().min(this.chunk.len());
                buf.put_slice(&this.chunk[..n]);
                this.chunk.advance(n);
                return Poll::Ready(Ok(()));
            }

            match &mut this.state {
                BodyState::Idle(resp) => match resp.take() {
                    Some(mut resp) => {
                        this.state = BodyState::Fetching(Box::pin(async move {
                            let chunk = resp.chunk().await;
                            (resp, chunk)
                        }));
                    }
                    None => return Poll::Ready(Ok(())),
                },
                BodyState::Fetching(fut) => {
                    let (resp, chunk) = ready!(fut.as_mut().poll(cx));
                    match chunk {
                        Ok(Some(chunk)) => {
                            this.transferred_bytes
                                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                            this.chunk = chunk;
                            this.state = BodyState::Idle(Some(resp));
                        }
                        Ok(None) => this.state = BodyState::Idle(None),
                        Err(e) => {
                            this.state = BodyState::Idle(None);
                            return Poll::Ready(Err(io::Error::other(e)));
                        }
                    }
                }
            }
        }
    }
}

impl RangeRead for HttpRange {}
