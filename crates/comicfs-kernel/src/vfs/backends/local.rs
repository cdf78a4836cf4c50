//! Real filesystem nodes.
//!
//! Mirrors the directory tree under the base directory. A regular file whose
//! extension is a registered container type is handed to that type's archive
//! factory and appears as a directory.

use std::fmt;
use std::fs::{File, Metadata};
use std::io;
use std::os::unix::fs::{FileExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;

use super::run_blocking;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::inode::path_key;
use crate::vfs::node::{FileHandle, VirtualNode, check_segment};
use crate::vfs::registry::NodeContext;
use crate::vfs::types::{DIR_TTL, DirEntry, FileAttr, FileType};

async fn stat(path: &Path) -> VfsResult<Metadata> {
    fs::metadata(path)
        .await
        .map_err(|e| VfsError::from_stat(path, e))
}

/// Convert std::fs::Metadata to FileAttr.
fn metadata_to_attr(ctx: &NodeContext, path: &Path, meta: &Metadata) -> FileAttr {
    let kind = if meta.is_dir() {
        FileType::Directory
    } else {
        FileType::File
    };

    FileAttr {
        ino: ctx.inodes().inode_for(&path_key(path)),
        size: meta.len(),
        kind,
        mode: meta.mode(),
        mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        nlink: meta.nlink() as u32,
        uid: Some(meta.uid()),
        gid: Some(meta.gid()),
        ttl: DIR_TTL,
    }
}

/// A directory on disk.
#[derive(Debug, Clone)]
pub struct RealDirectory {
    path: PathBuf,
    ctx: Arc<NodeContext>,
}

impl RealDirectory {
    pub fn new(path: impl Into<PathBuf>, ctx: Arc<NodeContext>) -> Self {
        Self {
            path: path.into(),
            ctx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn attributes(&self) -> VfsResult<FileAttr> {
        let meta = stat(&self.path).await.inspect_err(|e| {
            if !matches!(e, VfsError::NotFound(_)) {
                tracing::error!(dir = %self, error = %e, "failed to stat directory");
            }
        })?;
        Ok(metadata_to_attr(&self.ctx, &self.path, &meta))
    }

    /// Entries in the host's native order.
    ///
    /// Container files are reported as directories even though they are
    /// regular files on disk.
    pub async fn list_children(&self) -> VfsResult<Vec<DirEntry>> {
        let mut dir = fs::read_dir(&self.path)
            .await
            .map_err(|e| VfsError::from_stat(&self.path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name();
            // Lookups take `&str`, so a lossy name could never be resolved.
            let Some(name) = file_name.to_str().map(str::to_owned) else {
                tracing::warn!(
                    dir = %self,
                    entry = ?file_name,
                    "skipping entry with non-UTF-8 name"
                );
                continue;
            };
            let file_type = entry.file_type().await?;
            let is_dir = if file_type.is_symlink() {
                // Lookups follow links, so listings do too.
                fs::metadata(entry.path())
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false)
            } else {
                file_type.is_dir()
            };

            let kind = if is_dir || self.ctx.containers().is_container(&name) {
                FileType::Directory
            } else {
                FileType::File
            };
            entries.push(DirEntry::new(name, kind));
        }

        Ok(entries)
    }

    pub async fn lookup(&self, name: &str) -> VfsResult<VirtualNode> {
        check_segment(name)?;
        let path = self.path.join(name);
        let meta = stat(&path).await?;

        if meta.is_dir() {
            return Ok(RealDirectory::new(path, Arc::clone(&self.ctx)).into());
        }

        if let Some(factory) = self.ctx.containers().factory_for(&path) {
            return match factory.open_root(&path, &self.ctx).await {
                Ok(root) => Ok(root.into()),
                Err(e) => {
                    tracing::error!(
                        dir = %self,
                        path = %path.display(),
                        error = %e,
                        "failed to open container"
                    );
                    Err(e)
                }
            };
        }

        Ok(RealFile::new(path, Arc::clone(&self.ctx)).into())
    }
}

impl fmt::Display for RealDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/", self.path.display())
    }
}

/// A plain file on disk, read through unchanged.
#[derive(Debug, Clone)]
pub struct RealFile {
    path: PathBuf,
    ctx: Arc<NodeContext>,
}

impl RealFile {
    pub fn new(path: impl Into<PathBuf>, ctx: Arc<NodeContext>) -> Self {
        Self {
            path: path.into(),
            ctx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn attributes(&self) -> VfsResult<FileAttr> {
        let meta = stat(&self.path).await.inspect_err(|e| {
            tracing::error!(file = %self, error = %e, "failed to stat file");
        })?;
        Ok(metadata_to_attr(&self.ctx, &self.path, &meta))
    }

    pub async fn open(&self) -> VfsResult<FileHandle> {
        let file = fs::File::open(&self.path).await.map_err(|e| {
            tracing::error!(file = %self, error = %e, "failed to open file");
            VfsError::Io(e)
        })?;

        Ok(FileHandle::Real(RealFileHandle {
            path: self.path.clone(),
            file: Arc::new(file.into_std().await),
        }))
    }
}

impl fmt::Display for RealFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Open handle on a [`RealFile`].
#[derive(Debug)]
pub struct RealFileHandle {
    path: PathBuf,
    file: Arc<File>,
}

impl RealFileHandle {
    /// Positioned read. A short result at end of file is not an error.
    pub async fn read(&self, offset: u64, size: u32) -> VfsResult<Vec<u8>> {
        tracing::trace!(file = %self.path.display(), offset, size, "read");
        let file = Arc::clone(&self.file);
        run_blocking(move || Ok(read_at_most(&file, offset, size as usize)?))
            .await
            .inspect_err(|e| {
                tracing::error!(file = %self.path.display(), error = %e, "failed to read file");
            })
    }

    /// Close the file.
    pub fn release(self) -> VfsResult<()> {
        drop(self.file);
        Ok(())
    }
}

/// Read up to `size` bytes at `offset`, stopping early only at end of file.
fn read_at_most(file: &File, offset: u64, size: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imgconv::ConversionRegistry;
    use crate::vfs::backends::ZipFactory;
    use crate::vfs::registry::FilesystemRegistry;
    use tempfile::TempDir;

    fn setup() -> (FilesystemRegistry, TempDir) {
        let dir = TempDir::new().unwrap();
        let registry = FilesystemRegistry::new(dir.path(), ConversionRegistry::with_defaults());
        let zip = Arc::new(ZipFactory::new());
        registry.register_container_type(".cbz", zip.clone());
        registry.register_container_type(".zip", zip);
        (registry, dir)
    }

    #[tokio::test]
    async fn test_list_substitutes_containers() {
        let (registry, dir) = setup();
        std::fs::write(dir.path().join("a.cbz"), b"not opened by listing").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("series")).unwrap();

        let mut entries = registry.root().list_children().await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            vec![
                DirEntry::directory("a.cbz"),
                DirEntry::file("notes.txt"),
                DirEntry::directory("series"),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_skips_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (registry, dir) = setup();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"caf\xe9.txt")), b"x").unwrap();
        std::fs::write(dir.path().join("cafe.txt"), b"y").unwrap();

        let root = registry.root();
        let entries = root.list_children().await.unwrap();
        assert_eq!(entries, vec![DirEntry::file("cafe.txt")]);

        // Everything listed resolves.
        for entry in entries {
            root.lookup(&entry.name).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_lookup_kinds() {
        let (registry, dir) = setup();
        std::fs::write(dir.path().join("a.CBZ"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("series.zip")).unwrap();

        let root = registry.root();
        assert!(matches!(
            root.lookup("a.CBZ").await.unwrap(),
            VirtualNode::ArchiveDirectory(_)
        ));
        assert!(matches!(
            root.lookup("notes.txt").await.unwrap(),
            VirtualNode::RealFile(_)
        ));
        // A real directory wins over the container extension.
        assert!(matches!(
            root.lookup("series.zip").await.unwrap(),
            VirtualNode::RealDirectory(_)
        ));
    }

    #[tokio::test]
    async fn test_lookup_missing_and_invalid() {
        let (registry, _dir) = setup();
        let root = registry.root();

        assert!(matches!(
            root.lookup("missing.txt").await,
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(
            root.lookup("..").await,
            Err(VfsError::InvalidPath(_))
        ));
        assert!(matches!(
            root.lookup("a/b").await,
            Err(VfsError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_attributes_use_inode_table() {
        let (registry, dir) = setup();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let root = registry.root();
        let file = root.lookup("notes.txt").await.unwrap();
        let first = file.attributes().await.unwrap();
        let again = root.lookup("notes.txt").await.unwrap().attributes().await.unwrap();

        assert_eq!(first.size, 5);
        assert!(first.is_file());
        assert_eq!(first.ino, again.ino);
        assert_ne!(first.ino, root.attributes().await.unwrap().ino);
        assert_eq!(first.ttl, DIR_TTL);
    }

    #[tokio::test]
    async fn test_partial_and_short_reads() {
        let (registry, dir) = setup();
        std::fs::write(dir.path().join("test.txt"), b"hello world").unwrap();

        let node = registry.root().lookup("test.txt").await.unwrap();
        let handle = node.open().await.unwrap();

        assert_eq!(handle.read(6, 5).await.unwrap(), b"world");
        assert_eq!(handle.read(6, 100).await.unwrap(), b"world");
        assert!(handle.read(100, 5).await.unwrap().is_empty());
        handle.release().unwrap();
    }

    #[tokio::test]
    async fn test_open_unreadable_file_is_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let (registry, dir) = setup();
        let path = dir.path().join("secret.txt");
        std::fs::write(&path, b"x").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o000)).unwrap();

        let node = registry.root().lookup("secret.txt").await.unwrap();
        // Root ignores permission bits.
        if File::open(&path).is_ok() {
            return;
        }
        assert!(matches!(node.open().await, Err(VfsError::Io(_))));
    }
}
