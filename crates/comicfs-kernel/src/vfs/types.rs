//! Core VFS types.
//!
//! Attributes carry an inode number and a cache validity so a host binding
//! can answer `getattr`/`lookup` without asking again until the TTL expires.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// File type bits of a directory (`S_IFDIR`).
pub const S_IFDIR: u32 = 0o040000;
/// File type bits of a regular file (`S_IFREG`).
pub const S_IFREG: u32 = 0o100000;
/// Mask selecting the file type bits of a mode.
pub const S_IFMT: u32 = 0o170000;

/// How long hosts may cache directory and real-file attributes.
pub const DIR_TTL: Duration = Duration::from_secs(60 * 60);
/// How long hosts may cache archive member attributes.
///
/// Shorter because a converted member's size is only known after conversion.
pub const MEMBER_TTL: Duration = Duration::from_secs(2 * 60);

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Type bits for this kind.
    pub fn mode_bits(&self) -> u32 {
        match self {
            FileType::File => S_IFREG,
            FileType::Directory => S_IFDIR,
        }
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttr {
    /// Inode number from the process-wide inode table.
    pub ino: u64,
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Full mode: type bits plus permissions.
    pub mode: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Number of hard links.
    pub nlink: u32,
    /// User ID (only known for real paths).
    pub uid: Option<u32>,
    /// Group ID (only known for real paths).
    pub gid: Option<u32>,
    /// How long the host may cache these attributes.
    pub ttl: Duration,
}

impl FileAttr {
    /// Attributes for a regular file.
    ///
    /// `perm` may carry type bits already; they are replaced.
    pub fn file(ino: u64, size: u64, perm: u32, mtime: SystemTime) -> Self {
        Self {
            ino,
            size,
            kind: FileType::File,
            mode: FileType::File.mode_bits() | (perm & !S_IFMT),
            mtime,
            nlink: 1,
            uid: None,
            gid: None,
            ttl: DIR_TTL,
        }
    }

    /// Attributes for a directory.
    pub fn directory(ino: u64, size: u64, perm: u32, mtime: SystemTime) -> Self {
        Self {
            ino,
            size,
            kind: FileType::Directory,
            mode: FileType::Directory.mode_bits() | (perm & !S_IFMT),
            mtime,
            nlink: 2, // . and ..
            uid: None,
            gid: None,
            ttl: DIR_TTL,
        }
    }

    /// Override the cache validity.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Permission bits only.
    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, FileType::File)
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory)
    }
}

/// Filesystem statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatFs {
    /// Total blocks.
    pub blocks: u64,
    /// Free blocks.
    pub bfree: u64,
    /// Available blocks (to non-root).
    pub bavail: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub ffree: u64,
    /// Block size.
    pub bsize: u32,
    /// Maximum name length.
    pub namelen: u32,
    /// Fragment size.
    pub frsize: u32,
}

impl Default for StatFs {
    fn default() -> Self {
        Self {
            blocks: 0,
            bfree: 0,
            bavail: 0,
            files: 0,
            ffree: 0,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
        assert_eq!(FileType::Directory.mode_bits(), S_IFDIR);
    }

    #[test]
    fn test_file_attr_constructors() {
        let now = SystemTime::now();
        let file = FileAttr::file(3, 1024, 0o644, now);
        assert!(file.is_file());
        assert_eq!(file.size, 1024);
        assert_eq!(file.perm(), 0o644);
        assert_eq!(file.mode & S_IFMT, S_IFREG);
        assert_eq!(file.ttl, DIR_TTL);

        let dir = FileAttr::directory(4, 0, S_IFREG | 0o755, now);
        assert!(dir.is_dir());
        assert_eq!(dir.mode & S_IFMT, S_IFDIR);
        assert_eq!(dir.perm(), 0o755);
        assert_eq!(dir.nlink, 2);
    }

    #[test]
    fn test_member_ttl_is_shorter() {
        let attr = FileAttr::file(1, 10, 0o444, SystemTime::UNIX_EPOCH).with_ttl(MEMBER_TTL);
        assert!(attr.ttl < DIR_TTL);
    }

    #[test]
    fn test_dir_entry() {
        let file = DirEntry::file("page1.webp");
        assert_eq!(file.name, "page1.webp");
        assert!(file.kind.is_file());

        let dir = DirEntry::directory("sub");
        assert!(dir.kind.is_dir());
    }
}
