//! ZIP archive reading over range requests.
//!
//! ## Architecture
//!
//! - [`structures`]: wire records (EOCD, zip64 locator and end record,
//!   file headers) and constants
//! - `parser`: locates the directory end and decodes the central directory
//! - `extra`: resolves zip64 sizes and high-precision timestamps from the
//!   extra field
//! - `body`, `checksum`: open an entry's bytes and verify what is read
//! - `decompress`: per-method decompressor registry
//! - `tree`: hierarchical namespace over the entry list
//! - [`ZipArchive`]: the handle tying these together
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! Reading starts from the EOCD and then the Central Directory, so
//! listing an archive never touches entry data. Each entry body is one
//! more range request.
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - Only STORED and DEFLATE are built in; other methods need a registered
//!   [`Decompressor`]

mod archive;
mod body;
mod buf;
mod checksum;
mod decompress;
mod extra;
mod parser;
pub mod structures;
mod tree;

pub use archive::{ArchiveOptions, Opened, ZipArchive};
pub use body::{EntryBody, GzipReader};
pub use checksum::FileReader;
pub use decompress::{Decompressor, Decompressors};
pub use structures::{CompressionMethod, FileHeader};
pub use tree::{Entry, ROOT, ReadDir, normalize, valid_path};
