//! VFS error types.

use std::io;
use std::path::Path;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// No such virtual path or archive entry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The container could not be parsed as an archive.
    #[error("corrupt archive {path}: {reason}")]
    ArchiveCorrupt { path: String, reason: String },

    /// Image bytes are not valid for the claimed source format.
    #[error("failed to decode .{ext} image: {reason}")]
    Decode { ext: String, reason: String },

    /// The decoded image could not be written in the destination format.
    #[error("failed to encode .{ext} image: {reason}")]
    Encode { ext: String, reason: String },

    /// No decoder/encoder pair is registered for the extensions.
    #[error("unsupported conversion: .{from} -> .{to}")]
    UnsupportedConversion { from: String, to: String },

    /// Unknown or already released file handle.
    #[error("bad file handle: {0}")]
    BadHandle(u64),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create an ArchiveCorrupt error for the container at `path`.
    pub fn archive_corrupt(path: &Path, reason: impl ToString) -> Self {
        Self::ArchiveCorrupt {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Classify a failed `stat` of a real path.
    ///
    /// A missing path becomes `NotFound`; everything else stays an I/O error.
    pub fn from_stat(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.display().to_string())
        } else {
            Self::Io(err)
        }
    }

    /// Raw errno a host binding should reply with.
    #[cfg(unix)]
    pub fn errno(&self) -> i32 {
        use rustix::io::Errno;

        let errno = match self {
            VfsError::NotFound(_) => Errno::NOENT,
            VfsError::NotADirectory(_) => Errno::NOTDIR,
            VfsError::IsADirectory(_) => Errno::ISDIR,
            VfsError::BadHandle(_) => Errno::BADF,
            VfsError::InvalidPath(_) => Errno::INVAL,
            VfsError::UnsupportedConversion { .. } => Errno::NOENT,
            VfsError::Io(e) => match e.raw_os_error() {
                Some(raw) => return raw,
                None => Errno::IO,
            },
            VfsError::ArchiveCorrupt { .. }
            | VfsError::Decode { .. }
            | VfsError::Encode { .. }
            | VfsError::Other(_) => Errno::IO,
        };
        errno.raw_os_error()
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::BadHandle(fh) => {
                io::Error::new(io::ErrorKind::InvalidInput, format!("bad file handle: {fh}"))
            }
            e @ VfsError::ArchiveCorrupt { .. } => {
                io::Error::new(io::ErrorKind::InvalidData, e.to_string())
            }
            e @ (VfsError::Decode { .. } | VfsError::Encode { .. }) => {
                io::Error::new(io::ErrorKind::InvalidData, e.to_string())
            }
            e @ VfsError::UnsupportedConversion { .. } => {
                io::Error::new(io::ErrorKind::Unsupported, e.to_string())
            }
            VfsError::Io(e) => e,
            VfsError::Other(msg) => io::Error::other(msg),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_stat_classifies_missing_paths() {
        let missing = io::Error::from(io::ErrorKind::NotFound);
        let err = VfsError::from_stat(Path::new("/comics/gone.cbz"), missing);
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "/comics/gone.cbz"));

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        let err = VfsError::from_stat(Path::new("/comics"), denied);
        assert!(matches!(err, VfsError::Io(_)));
    }

    #[test]
    fn test_io_error_kinds() {
        let io: io::Error = VfsError::not_found("x").into();
        assert_eq!(io.kind(), io::ErrorKind::NotFound);

        let io: io::Error = VfsError::archive_corrupt(Path::new("a.cbz"), "bad magic").into();
        assert_eq!(io.kind(), io::ErrorKind::InvalidData);
        assert!(io.to_string().contains("a.cbz"));
    }

    #[cfg(unix)]
    #[test]
    fn test_errno_mapping() {
        use rustix::io::Errno;

        assert_eq!(VfsError::not_found("x").errno(), Errno::NOENT.raw_os_error());
        assert_eq!(VfsError::BadHandle(7).errno(), Errno::BADF.raw_os_error());
        assert_eq!(
            VfsError::Decode { ext: "webp".into(), reason: "truncated".into() }.errno(),
            Errno::IO.raw_os_error()
        );
    }
}
