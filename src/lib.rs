//! # rangezip
//!
//! Read-only access to ZIP archives through byte-range requests.
//!
//! An archive is opened from any [`RangeSource`]: an HTTP server honoring
//! `Range` headers, a local file, or bytes in memory. Only the directory
//! end and the central directory are fetched when the archive is opened;
//! each entry body costs one more request when it is read. Entries are
//! exposed as a hierarchical namespace and every read is checked against
//! the declared size and CRC-32.
//!
//! ## Features
//!
//! - ZIP64 archives and the truncated 16-bit entry counts some writers emit
//! - STORED and DEFLATE built in, other methods via [`Decompressor`]
//! - NTFS, Unix and extended timestamps, with the timezone offset
//!   estimated from the legacy MS-DOS time
//! - Raw deflate entries re-framed as gzip without decompressing
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rangezip::{HttpRangeSource, Opened, ZipArchive};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = HttpRangeSource::new("https://example.com/archive.zip".to_string()).await?;
//!     let archive = ZipArchive::new(Arc::new(source)).await?;
//!
//!     for entry in archive.read_dir(".")? {
//!         println!("{}{}", entry.name(), if entry.is_dir() { "/" } else { "" });
//!     }
//!
//!     if let Opened::File { header, mut reader } = archive.open("docs/readme.txt").await? {
//!         let mut stdout = tokio::io::stdout();
//!         tokio::io::copy(&mut reader, &mut stdout).await?;
//!         reader.close().await?;
//!         eprintln!("{} bytes", header.uncompressed_size);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{Result, ZipError};
pub use io::{HttpRangeSource, LocalFileSource, MemorySource, RangeRead, RangeSource, RangeStream};
pub use zip::{
    ArchiveOptions, CompressionMethod, Decompressor, Entry, EntryBody, FileHeader, FileReader,
    GzipReader, Opened, ReadDir, ZipArchive,
};
