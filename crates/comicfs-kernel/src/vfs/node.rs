//! Virtual nodes and open file handles.
//!
//! A [`VirtualNode`] is the resolver's unit: every lookup yields one, and the
//! variant decides which operations make sense. Nodes are cheap to clone and
//! carry everything they need to answer further lookups.

use std::fmt;

use super::backends::{
    ArchiveDirectory, ArchiveMember, MemberHandle, RealDirectory, RealFile, RealFileHandle,
};
use super::error::{VfsError, VfsResult};
use super::types::{DirEntry, FileAttr, FileType};

/// Reject anything that is not a single path component.
pub(crate) fn check_segment(name: &str) -> VfsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(VfsError::invalid_path(name));
    }
    Ok(())
}

/// One resolved virtual path.
#[derive(Debug, Clone)]
pub enum VirtualNode {
    RealDirectory(RealDirectory),
    RealFile(RealFile),
    ArchiveDirectory(ArchiveDirectory),
    ArchiveMember(ArchiveMember),
}

impl VirtualNode {
    pub fn kind(&self) -> FileType {
        match self {
            Self::RealDirectory(_) | Self::ArchiveDirectory(_) => FileType::Directory,
            Self::RealFile(_) | Self::ArchiveMember(_) => FileType::File,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind().is_dir()
    }

    pub async fn attributes(&self) -> VfsResult<FileAttr> {
        match self {
            Self::RealDirectory(dir) => dir.attributes().await,
            Self::RealFile(file) => file.attributes().await,
            Self::ArchiveDirectory(dir) => dir.attributes().await,
            Self::ArchiveMember(member) => member.attributes().await,
        }
    }

    pub async fn list_children(&self) -> VfsResult<Vec<DirEntry>> {
        match self {
            Self::RealDirectory(dir) => dir.list_children().await,
            Self::ArchiveDirectory(dir) => dir.list_children().await,
            Self::RealFile(_) | Self::ArchiveMember(_) => {
                Err(VfsError::not_a_directory(self.to_string()))
            }
        }
    }

    /// Resolve one path component below this node.
    pub async fn lookup(&self, name: &str) -> VfsResult<VirtualNode> {
        match self {
            Self::RealDirectory(dir) => dir.lookup(name).await,
            Self::ArchiveDirectory(dir) => dir.lookup(name).await,
            Self::RealFile(_) | Self::ArchiveMember(_) => {
                Err(VfsError::not_a_directory(self.to_string()))
            }
        }
    }

    pub async fn open(&self) -> VfsResult<FileHandle> {
        match self {
            Self::RealFile(file) => file.open().await,
            Self::ArchiveMember(member) => member.open().await,
            Self::RealDirectory(_) | Self::ArchiveDirectory(_) => {
                Err(VfsError::is_a_directory(self.to_string()))
            }
        }
    }
}

impl fmt::Display for VirtualNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RealDirectory(dir) => fmt::Display::fmt(dir, f),
            Self::RealFile(file) => fmt::Display::fmt(file, f),
            Self::ArchiveDirectory(dir) => fmt::Display::fmt(dir, f),
            Self::ArchiveMember(member) => fmt::Display::fmt(member, f),
        }
    }
}

impl From<RealDirectory> for VirtualNode {
    fn from(dir: RealDirectory) -> Self {
        Self::RealDirectory(dir)
    }
}

impl From<RealFile> for VirtualNode {
    fn from(file: RealFile) -> Self {
        Self::RealFile(file)
    }
}

impl From<ArchiveDirectory> for VirtualNode {
    fn from(dir: ArchiveDirectory) -> Self {
        Self::ArchiveDirectory(dir)
    }
}

impl From<ArchiveMember> for VirtualNode {
    fn from(member: ArchiveMember) -> Self {
        Self::ArchiveMember(member)
    }
}

/// An open file. Releasing consumes the handle.
#[derive(Debug)]
pub enum FileHandle {
    Real(RealFileHandle),
    Member(MemberHandle),
}

impl FileHandle {
    /// Up to `size` bytes at `offset`. Fewer bytes only at end of content.
    pub async fn read(&self, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        match self {
            Self::Real(handle) => handle.read(offset, size).await,
            Self::Member(handle) => Ok(handle.read(offset, size)),
        }
    }

    pub fn release(self) -> VfsResult<()> {
        match self {
            Self::Real(handle) => handle.release(),
            Self::Member(handle) => handle.release(),
        }
    }
}
