//! Error type shared by every archive operation.

use std::borrow::Cow;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ZipError>;

/// Errors surfaced while opening an archive or reading its entries.
///
/// The type is `Clone` so a failed entry stream can hand the same error
/// back on every subsequent read.
#[derive(Debug, Clone, Error)]
pub enum ZipError {
    /// Bad signature, inconsistent lengths, unresolved zip64 sentinel or a
    /// malformed extra-field chain.
    #[error("zip: not a valid zip file: {0}")]
    Format(Cow<'static, str>),

    /// The entry body produced a different number of bytes than declared.
    #[error("zip: entry body has {actual} bytes, expected {expected}")]
    Truncated { expected: u64, actual: u64 },

    /// No decompressor is registered for the compression method.
    #[error("zip: unsupported compression algorithm {0}")]
    Algorithm(u16),

    /// The decompressed content does not match the declared CRC-32.
    #[error("zip: checksum error: expected {expected:#010x}, computed {computed:#010x}")]
    Checksum { expected: u32, computed: u32 },

    #[error("open {0}: file does not exist")]
    NotFound(String),

    #[error("open {0}: not a file")]
    NotAFile(String),

    #[error("read {0}: is a directory")]
    IsADirectory(String),

    #[error("readdir {0}: not a directory")]
    NotADirectory(String),

    /// A read was issued on an entry stream that was already closed.
    #[error("zip: read after close")]
    Closed,

    /// Failure reported by the range source.
    #[error("zip: transport error: {0}")]
    Io(Arc<io::Error>),

    /// An error that occurred together with a failure to release the
    /// range stream it was read from.
    #[error("{error} (releasing range stream also failed: {release})")]
    Release {
        error: Box<ZipError>,
        release: Arc<io::Error>,
    },
}

impl ZipError {
    pub(crate) fn format<M: Into<Cow<'static, str>>>(message: M) -> Self {
        ZipError::Format(message.into())
    }

    /// Attaches the outcome of releasing a range stream to this error.
    pub(crate) fn with_release(self, released: io::Result<()>) -> Self {
        match released {
            Ok(()) => self,
            Err(release) => ZipError::Release {
                error: Box::new(self),
                release: Arc::new(release),
            },
        }
    }

    /// The primary error, looking through any release failure attached to it.
    pub fn primary(&self) -> &ZipError {
        match self {
            ZipError::Release { error, .. } => error.primary(),
            other => other,
        }
    }

    pub(crate) fn is_unexpected_eof(&self) -> bool {
        matches!(self.primary(), ZipError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Folds the result of releasing a range stream into an operation result.
pub(crate) fn combine<T>(result: Result<T>, released: io::Result<()>) -> Result<T> {
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release)) => Err(release.into()),
        (Err(err), released) => Err(err.with_release(released)),
    }
}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<ZipError>()) {
            if let Some(inner) = err.into_inner() {
                return match inner.downcast::<ZipError>() {
                    Ok(zip) => *zip,
                    Err(other) => ZipError::Io(Arc::new(io::Error::other(other))),
                };
            }
            return ZipError::format("empty io error");
        }
        ZipError::Io(Arc::new(err))
    }
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> io::Error {
        let kind = match err.primary() {
            ZipError::Io(inner) => inner.kind(),
            ZipError::Format(_) | ZipError::Checksum { .. } => io::ErrorKind::InvalidData,
            ZipError::Truncated { .. } => io::ErrorKind::UnexpectedEof,
            ZipError::Algorithm(_) => io::ErrorKind::Unsupported,
            ZipError::NotFound(_) => io::ErrorKind::NotFound,
            ZipError::NotAFile(_) | ZipError::Closed => io::ErrorKind::InvalidInput,
            ZipError::IsADirectory(_) => io::ErrorKind::IsADirectory,
            ZipError::NotADirectory(_) => io::ErrorKind::NotADirectory,
            ZipError::Release { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_error_survives_io_round_trip() {
        let err = ZipError::Checksum {
            expected: 1,
            computed: 2,
        };
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);

        let back = ZipError::from(io_err);
        assert!(matches!(
            back,
            ZipError::Checksum {
                expected: 1,
                computed: 2
            }
        ));
    }

    #[test]
    fn plain_io_error_becomes_transport() {
        let err = ZipError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "short"));
        assert!(err.is_unexpected_eof());
    }

    #[test]
    fn release_failure_is_kept() {
        let err = ZipError::format("bad signature")
            .with_release(Err(io::Error::other("connection reset")));
        assert!(matches!(err.primary(), ZipError::Format(_)));
        let text = err.to_string();
        assert!(text.contains("bad signature"));
        assert!(text.contains("connection reset"));
    }

    #[test]
    fn release_success_keeps_error_untouched() {
        let err = ZipError::Algorithm(99).with_release(Ok(()));
        assert!(matches!(err, ZipError::Algorithm(99)));
    }
}
