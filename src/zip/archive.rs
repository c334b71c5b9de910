//! Archive handle and path-based access.

use std::sync::{Arc, OnceLock};

use crate::error::{Result, ZipError};
use crate::io::RangeSource;

use super::body::{self, GzipReader};
use super::checksum::FileReader;
use super::decompress::{Decompressor, Decompressors};
use super::parser::ZipParser;
use super::structures::{CompressionMethod, FileHeader};
use super::tree::{Entry, ROOT, ReadDir, Tree};

/// Tunables for one archive handle.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Extra bytes fetched past an entry's name to cover a local extra
    /// field whose length the central directory does not record.
    pub body_slack: u64,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            body_slack: u64::from(u16::MAX),
        }
    }
}

impl ArchiveOptions {
    pub fn with_body_slack(mut self, body_slack: u64) -> Self {
        self.body_slack = body_slack;
        self
    }
}

/// What [`ZipArchive::open`] found at a path.
#[derive(Debug)]
pub enum Opened<'a> {
    File {
        header: &'a FileHeader,
        reader: FileReader,
    },
    Dir(ReadDir<'a>),
}

/// A ZIP archive read through range requests.
///
/// The central directory is parsed once when the handle is created. The
/// directory tree is built on the first path query and shared by every
/// later one. Entry bodies are fetched independently on each open, so one
/// handle can serve any number of concurrent readers.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use rangezip::{LocalFileSource, ZipArchive};
/// use tokio::io::AsyncReadExt;
///
/// # async fn run() -> rangezip::Result<()> {
/// let source = LocalFileSource::new("archive.zip".as_ref()).await?;
/// let archive = ZipArchive::new(Arc::new(source)).await?;
///
/// let mut reader = archive.open_file("docs/readme.txt").await?;
/// let mut text = String::new();
/// reader.read_to_string(&mut text).await?;
/// reader.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct ZipArchive<S: ?Sized = dyn RangeSource> {
    source: Arc<S>,
    size: u64,
    comment: String,
    files: Vec<FileHeader>,
    decompressors: Decompressors,
    tree: OnceLock<Tree>,
    options: ArchiveOptions,
}

impl<S: RangeSource + ?Sized> ZipArchive<S> {
    /// Parse the directory of the archive behind `source`.
    pub async fn new(source: Arc<S>) -> Result<Self> {
        Self::with_options(source, ArchiveOptions::default()).await
    }

    pub async fn with_options(source: Arc<S>, options: ArchiveOptions) -> Result<Self> {
        let parser = ZipParser::new(source.as_ref());
        let (eocd, size) = parser.read_directory_end().await?;
        let files = parser.read_directory(&eocd, size).await?;

        Ok(Self {
            source,
            size,
            comment: eocd.comment,
            files,
            decompressors: Decompressors::default(),
            tree: OnceLock::new(),
            options,
        })
    }

    /// Entries in central directory order.
    pub fn files(&self) -> &[FileHeader] {
        &self.files
    }

    /// The archive comment from the end of central directory record.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Total archive size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Use `decompressor` for entries stored with `method`, replacing any
    /// built-in one.
    pub fn register_decompressor(&mut self, method: u16, decompressor: Arc<dyn Decompressor>) {
        self.decompressors.register(method, decompressor);
    }

    fn tree(&self) -> &Tree {
        self.tree.get_or_init(|| {
            let tree = Tree::build(&self.files);
            tracing::debug!(entries = tree.len(), "built directory tree");
            tree
        })
    }

    /// The file or directory at `path`.
    pub fn stat(&self, path: &str) -> Result<Entry<'_>> {
        self.tree()
            .lookup(path, &self.files)
            .ok_or_else(|| ZipError::NotFound(path.to_owned()))
    }

    /// Metadata of the file at `path`.
    pub fn lookup(&self, path: &str) -> Result<&FileHeader> {
        let entry = self.stat(path)?;
        match entry.header() {
            Some(header) if !entry.is_dir() => Ok(header),
            _ => Err(ZipError::NotAFile(path.to_owned())),
        }
    }

    /// Children of the directory at `path`.
    pub fn read_dir(&self, path: &str) -> Result<ReadDir<'_>> {
        let entry = self.stat(path)?;
        if !entry.is_dir() {
            return Err(ZipError::NotADirectory(path.to_owned()));
        }
        Ok(self.tree().list(entry.path(), &self.files))
    }

    /// Open whatever is at `path`: a verified stream for a file, a listing
    /// for a directory.
    pub async fn open(&self, path: &str) -> Result<Opened<'_>> {
        let entry = self.stat(path)?;
        match entry.header() {
            Some(header) if !entry.is_dir() => Ok(Opened::File {
                header,
                reader: self.open_entry(header).await?,
            }),
            _ => Ok(Opened::Dir(self.tree().list(entry.path(), &self.files))),
        }
    }

    /// Open the file at `path` for reading.
    pub async fn open_file(&self, path: &str) -> Result<FileReader> {
        let entry = self.stat(path)?;
        match entry.header() {
            Some(header) if !entry.is_dir() => self.open_entry(header).await,
            _ => Err(ZipError::IsADirectory(path.to_owned())),
        }
    }

    /// Open the decoded, checksum-verified content of `header`.
    pub async fn open_entry(&self, header: &FileHeader) -> Result<FileReader> {
        let decompressor = self
            .decompressors
            .get(header.method)
            .ok_or(ZipError::Algorithm(header.method))?;
        let body = self.open_body(header).await?;
        Ok(FileReader::new(decompressor.decompress(body), header))
    }

    /// Open a deflate entry's raw bytes framed as a gzip stream.
    pub async fn open_entry_as_gzip(&self, header: &FileHeader) -> Result<GzipReader> {
        if header.method != CompressionMethod::DEFLATE {
            return Err(ZipError::Algorithm(header.method));
        }
        let body = self.open_body(header).await?;
        GzipReader::new(body, header)
    }

    async fn open_body(&self, header: &FileHeader) -> Result<body::EntryBody> {
        body::open_body(
            self.source.as_ref(),
            self.size,
            header,
            self.options.body_slack,
        )
        .await
    }

    /// The root directory listing.
    pub fn root(&self) -> ReadDir<'_> {
        self.tree().list(ROOT, &self.files)
    }
}

impl<S: ?Sized> std::fmt::Debug for ZipArchive<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchive")
            .field("size", &self.size)
            .field("entries", &self.files.len())
            .field("decompressors", &self.decompressors)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
