//! Path-based facade over a [`FilesystemRegistry`].
//!
//! Resolves slash-separated paths by walking single-segment lookups from the
//! root and keeps a table of open handles keyed by numeric id, which is the
//! shape a kernel filesystem binding wants.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Component, Path};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::{VfsError, VfsResult};
use super::node::{FileHandle, VirtualNode};
use super::ops::VfsOps;
use super::registry::FilesystemRegistry;
use super::types::{DirEntry, FileAttr, StatFs};

/// Read-only [`VfsOps`] over a registry.
pub struct ComicMount {
    registry: Arc<FilesystemRegistry>,
    handles: DashMap<u64, Arc<FileHandle>>,
    next_fh: AtomicU64,
}

impl std::fmt::Debug for ComicMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComicMount")
            .field("base_dir", &self.registry.base_dir())
            .field("open_handles", &self.handles.len())
            .finish()
    }
}

impl ComicMount {
    pub fn new(registry: Arc<FilesystemRegistry>) -> Self {
        Self {
            registry,
            handles: DashMap::new(),
            next_fh: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<FilesystemRegistry> {
        &self.registry
    }

    /// Number of handles opened and not yet released.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Walk `path` from the root. `/`, `""` and `.` all name the root.
    pub async fn resolve(&self, path: &Path) -> VfsResult<VirtualNode> {
        let mut node = self.registry.root();
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(name) => {
                    let name = name
                        .to_str()
                        .ok_or_else(|| VfsError::invalid_path(path.display().to_string()))?;
                    node = node.lookup(name).await?;
                }
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(VfsError::invalid_path(path.display().to_string()));
                }
            }
        }
        Ok(node)
    }
}

#[async_trait]
impl VfsOps for ComicMount {
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        self.resolve(path).await?.attributes().await
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        self.resolve(path).await?.list_children().await
    }

    async fn open(&self, path: &Path) -> VfsResult<u64> {
        let handle = self.resolve(path).await?.open().await?;
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(fh, Arc::new(handle));
        tracing::debug!(path = %path.display(), fh, "opened");
        Ok(fh)
    }

    async fn read(&self, fh: u64, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        // Clone out so the map shard is not locked across the await.
        let handle = self
            .handles
            .get(&fh)
            .map(|h| Arc::clone(h.value()))
            .ok_or(VfsError::BadHandle(fh))?;
        handle.read(offset, size).await
    }

    async fn release(&self, fh: u64) -> VfsResult<()> {
        let Some((_, handle)) = self.handles.remove(&fh) else {
            tracing::warn!(fh, "release of unknown file handle");
            return Err(VfsError::BadHandle(fh));
        };
        // A read still in flight holds the last reference and closes it.
        match Arc::try_unwrap(handle) {
            Ok(handle) => handle.release().inspect_err(|e| {
                tracing::warn!(fh, error = %e, "failed to release file handle");
            }),
            Err(_) => Ok(()),
        }
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn statfs(&self) -> VfsResult<StatFs> {
        #[cfg(unix)]
        {
            let stat = rustix::fs::statvfs(self.registry.base_dir())
                .map_err(|e| VfsError::Io(e.into()))?;

            Ok(StatFs {
                blocks: stat.f_blocks,
                bfree: 0,
                bavail: 0,
                files: stat.f_files,
                ffree: 0,
                bsize: stat.f_bsize as u32,
                namelen: stat.f_namemax as u32,
                frsize: stat.f_frsize as u32,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(StatFs::default())
        }
    }
}
