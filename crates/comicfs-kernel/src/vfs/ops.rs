//! Host-facing VFS operations.
//!
//! Path-based and read-only. A host binding (FUSE or otherwise) maps its own
//! requests onto these calls and turns failures into errno values with
//! [`VfsError::errno`](super::VfsError::errno).

use async_trait::async_trait;
use std::path::Path;

use super::types::{DirEntry, FileAttr, StatFs};
use super::VfsResult;

#[async_trait]
pub trait VfsOps: Send + Sync {
    /// Get file attributes.
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr>;

    /// Read directory entries, in the backing store's order.
    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Open a file for reading and return its handle id.
    async fn open(&self, path: &Path) -> VfsResult<u64>;

    /// Read up to `size` bytes at `offset` from an open handle.
    ///
    /// Returns fewer bytes at end of content; an offset past the end returns
    /// no bytes.
    async fn read(&self, fh: u64, offset: u64, size: u32) -> VfsResult<Vec<u8>>;

    /// Release an open handle. Unknown or already released ids are rejected
    /// with `BadHandle`.
    async fn release(&self, fh: u64) -> VfsResult<()>;

    /// Returns true if this filesystem is read-only.
    fn read_only(&self) -> bool;

    /// Get filesystem statistics.
    async fn statfs(&self) -> VfsResult<StatFs>;

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool {
        self.getattr(path).await.is_ok()
    }

    /// Read entire file contents.
    async fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let fh = self.open(path).await?;
        let mut data = Vec::new();
        let result = loop {
            match self.read(fh, data.len() as u64, 1 << 20).await {
                Ok(chunk) if chunk.is_empty() => break Ok(()),
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(e) => break Err(e),
            }
        };
        self.release(fh).await?;
        result.map(|()| data)
    }
}
