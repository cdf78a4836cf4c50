//! Zip-backed container nodes.
//!
//! A container file is exposed as a directory whose children are the
//! archive's entries. The archive is opened lazily, exactly once, the first
//! time anything needs its entry list or content; every node for the same
//! container shares one [`ArchiveHandle`] through the [`ArchiveCache`].
//!
//! Entry names use `/` as separator. A name ending in `/` is an explicit
//! directory record; a directory only implied by deeper entries (`sub/p.png`
//! without `sub/`) is synthesized so it can be listed and looked up.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::{FileExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;
use tokio::sync::OnceCell;
use zip::ZipArchive;

use super::run_blocking;
use crate::imgconv::Converter;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::inode::member_key;
use crate::vfs::node::{FileHandle, VirtualNode, check_segment};
use crate::vfs::registry::{ArchiveFactory, NodeContext};
use crate::vfs::types::{DirEntry, FileAttr, MEMBER_TTL, S_IFDIR, S_IFREG};

/// Upper bound on the up-front allocation for one decompressed entry.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;
/// Members above this size are logged when opened.
const LARGE_MEMBER: u64 = 256 * 1024 * 1024;

/// Metadata of the container file, captured when its handle is created.
#[derive(Debug, Clone, Copy)]
pub struct ContainerInfo {
    pub size: u64,
    /// Permission bits only.
    pub perm: u32,
    pub mtime: SystemTime,
}

/// One record inside an opened archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Position in the archive's central directory.
    pub index: usize,
    /// Full in-archive path.
    pub name: String,
    /// Uncompressed size.
    pub size: u64,
    pub mode: u32,
    pub mtime: SystemTime,
}

/// Positioned-read view of the container file.
///
/// Clones share the file descriptor but keep their own cursor, so each clone
/// of the archive can decompress independently.
#[derive(Debug, Clone)]
struct ArchiveReader {
    file: Arc<File>,
    pos: u64,
    len: u64,
}

impl Read for ArchiveReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ArchiveReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of archive")
        })?;
        self.pos = target;
        Ok(target)
    }
}

/// State that only exists once the archive has been opened.
struct OpenArchive {
    zip: ZipArchive<ArchiveReader>,
    entries: Vec<ArchiveEntry>,
}

fn zip_time(dt: zip::DateTime) -> Option<SystemTime> {
    let naive = chrono::NaiveDate::from_ymd_opt(dt.year().into(), dt.month().into(), dt.day().into())?
        .and_hms_opt(dt.hour().into(), dt.minute().into(), dt.second().into())?;
    Some(naive.and_utc().into())
}

fn open_archive(path: &Path) -> VfsResult<OpenArchive> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let reader = ArchiveReader {
        file: Arc::new(file),
        pos: 0,
        len,
    };

    let mut zip = ZipArchive::new(reader).map_err(|e| VfsError::archive_corrupt(path, e))?;
    let mut entries = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let file = zip
            .by_index_raw(index)
            .map_err(|e| VfsError::archive_corrupt(path, e))?;
        let default_mode = if file.is_dir() {
            S_IFDIR | 0o555
        } else {
            S_IFREG | 0o444
        };
        entries.push(ArchiveEntry {
            index,
            name: file.name().to_owned(),
            size: file.size(),
            mode: file.unix_mode().unwrap_or(default_mode),
            mtime: file
                .last_modified()
                .and_then(zip_time)
                .unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    Ok(OpenArchive { zip, entries })
}

/// One container file and its lazily opened archive.
pub struct ArchiveHandle {
    path: PathBuf,
    info: ContainerInfo,
    archive: OnceCell<OpenArchive>,
    opens: AtomicUsize,
}

impl fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveHandle")
            .field("path", &self.path)
            .field("info", &self.info)
            .field("open", &self.is_open())
            .finish()
    }
}

impl ArchiveHandle {
    /// Stat the container; the archive itself is not opened yet.
    pub async fn new(path: impl Into<PathBuf>) -> VfsResult<Self> {
        let path = path.into();
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| VfsError::from_stat(&path, e))?;

        let info = ContainerInfo {
            size: meta.len(),
            perm: meta.permissions().mode() & 0o7777,
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        };

        Ok(Self {
            path,
            info,
            archive: OnceCell::new(),
            opens: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> ContainerInfo {
        self.info
    }

    pub fn is_open(&self) -> bool {
        self.archive.initialized()
    }

    /// How many times the container has physically been opened.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Open the archive if nobody has yet.
    ///
    /// Concurrent first callers wait on the same open; a failed open leaves
    /// the handle unopened so a later request can try again.
    async fn ensure_open(&self) -> VfsResult<&OpenArchive> {
        self.archive
            .get_or_try_init(|| async {
                self.opens.fetch_add(1, Ordering::SeqCst);
                let path = self.path.clone();
                tracing::debug!(archive = %path.display(), "opening archive");
                run_blocking(move || open_archive(&path)).await
            })
            .await
            .inspect_err(|e| {
                tracing::error!(archive = %self.path.display(), error = %e, "failed to open archive");
            })
    }

    /// Entries in archive order.
    pub async fn entries(&self) -> VfsResult<&[ArchiveEntry]> {
        Ok(&self.ensure_open().await?.entries)
    }

    /// Decompress one entry fully.
    pub async fn read_entry(&self, entry: &ArchiveEntry) -> VfsResult<Vec<u8>> {
        let open = self.ensure_open().await?;
        let mut zip = open.zip.clone();
        let index = entry.index;
        let path = self.path.clone();

        run_blocking(move || {
            let mut file = zip
                .by_index(index)
                .map_err(|e| VfsError::archive_corrupt(&path, e))?;
            let mut data = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
            file.read_to_end(&mut data)
                .map_err(|e| VfsError::archive_corrupt(&path, e))?;
            Ok(data)
        })
        .await
    }
}

/// Container path → handle, so separate lookup chains share one open archive.
#[derive(Debug, Default)]
pub struct ArchiveCache {
    handles: DashMap<PathBuf, Arc<ArchiveHandle>>,
}

impl ArchiveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `path`, creating (but not opening) it on first use.
    pub async fn get_or_create(&self, path: &Path) -> VfsResult<Arc<ArchiveHandle>> {
        if let Some(handle) = self.handles.get(path) {
            return Ok(Arc::clone(&handle));
        }

        let handle = ArchiveHandle::new(path).await?;
        // Racing creators keep whichever handle landed first; the loser was
        // never opened.
        let entry = self
            .handles
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(handle));
        Ok(Arc::clone(&entry))
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drop every cached handle. Archives close once no node still holds them.
    pub fn clear(&self) {
        self.handles.clear();
    }
}

/// Factory for zip containers (`.zip`, `.cbz`).
#[derive(Debug, Default)]
pub struct ZipFactory {
    cache: ArchiveCache,
}

impl ZipFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &ArchiveCache {
        &self.cache
    }
}

#[async_trait]
impl ArchiveFactory for ZipFactory {
    async fn open_root(&self, path: &Path, ctx: &Arc<NodeContext>) -> VfsResult<ArchiveDirectory> {
        let handle = self.cache.get_or_create(path).await?;
        Ok(ArchiveDirectory::root(handle, Arc::clone(ctx)))
    }

    fn shutdown(&self) {
        self.cache.clear();
    }
}

/// Handle and context shared by every node inside one container.
#[derive(Debug, Clone)]
struct ArchiveRef {
    handle: Arc<ArchiveHandle>,
    ctx: Arc<NodeContext>,
}

impl ArchiveRef {
    fn inode(&self, inner: &str) -> u64 {
        self.ctx
            .inodes()
            .inode_for(&member_key(self.handle.path(), inner))
    }
}

/// Entries under one prefix of an archive (empty prefix = archive root).
#[derive(Debug, Clone)]
pub struct ArchiveDirectory {
    archive: ArchiveRef,
    /// Empty, or ends with `/`.
    prefix: String,
}

impl ArchiveDirectory {
    /// Root directory of the archive behind `handle`.
    pub fn root(handle: Arc<ArchiveHandle>, ctx: Arc<NodeContext>) -> Self {
        Self {
            archive: ArchiveRef { handle, ctx },
            prefix: String::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub async fn attributes(&self) -> VfsResult<FileAttr> {
        let info = self.archive.handle.info();
        // Read permission on the container implies search permission here.
        let perm = info.perm | ((info.perm & 0o444) >> 2);
        Ok(FileAttr::directory(
            self.archive.inode(&self.prefix),
            info.size,
            perm,
            info.mtime,
        ))
    }

    /// Direct children in archive order.
    pub async fn list_children(&self) -> VfsResult<Vec<DirEntry>> {
        let entries = self.archive.handle.entries().await?;

        let mut dirs = HashSet::new();
        let mut children = Vec::new();
        for entry in entries {
            let Some(rest) = entry.name.strip_prefix(&self.prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }

            match rest.find('/') {
                // Explicit `name/` record, or a deeper entry implying `name`.
                Some(sep) => {
                    let name = &rest[..sep];
                    if !name.is_empty() && dirs.insert(name) {
                        children.push(DirEntry::directory(name));
                    }
                }
                None => children.push(DirEntry::file(rest)),
            }
        }

        Ok(children)
    }

    pub async fn lookup(&self, name: &str) -> VfsResult<VirtualNode> {
        check_segment(name)?;
        let entries = self.archive.handle.entries().await?;
        let exists = |path: &str| entries.iter().any(|e| e.name == path);
        // A file, an explicit `path/` record or any entry below `path/`.
        let occupied = |path: &str| {
            entries.iter().any(|e| {
                e.name
                    .strip_prefix(path)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
        };

        let mut target = name.to_owned();
        let mut converter = None;
        if let Some((source, conv)) = self.archive.ctx.converters().detect(name) {
            let literal = format!("{}{}", self.prefix, name);
            let source_path = format!("{}{}", self.prefix, source);
            // An entry or directory literally named `x.webp.png` is served
            // as-is.
            if exists(&source_path) && !occupied(&literal) {
                tracing::debug!(dir = %self, entry = name, converter = %conv, "image conversion detected");
                target = source;
                converter = Some(conv);
            }
        }

        let path = format!("{}{}", self.prefix, target);
        let dir_path = format!("{path}/");
        let mut implied_dir = false;
        for entry in entries {
            if entry.name == path {
                return Ok(ArchiveMember {
                    archive: self.archive.clone(),
                    entry: entry.clone(),
                    path: format!("{}{}", self.prefix, name),
                    converter,
                }
                .into());
            }
            if entry.name == dir_path {
                return Ok(self.subdirectory(dir_path).into());
            }
            implied_dir |= entry.name.starts_with(&dir_path);
        }

        if implied_dir && converter.is_none() {
            return Ok(self.subdirectory(dir_path).into());
        }

        tracing::debug!(dir = %self, entry = name, "no such archive entry");
        Err(VfsError::not_found(format!(
            "{}/{}",
            self.archive.handle.path().display(),
            path
        )))
    }

    fn subdirectory(&self, prefix: String) -> ArchiveDirectory {
        ArchiveDirectory {
            archive: self.archive.clone(),
            prefix,
        }
    }
}

impl fmt::Display for ArchiveDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/{}", self.archive.handle.path().display(), self.prefix)
    }
}

/// One file-like archive entry, optionally seen through a converter.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    archive: ArchiveRef,
    entry: ArchiveEntry,
    /// In-archive path as requested (the destination name when converting).
    path: String,
    converter: Option<Converter>,
}

impl ArchiveMember {
    pub fn converter(&self) -> Option<&Converter> {
        self.converter.as_ref()
    }

    /// Stored metadata, or the converted length when a converter is bound.
    ///
    /// A failing conversion is logged and the unconverted size reported, so
    /// metadata queries keep working for a broken image.
    pub async fn attributes(&self) -> VfsResult<FileAttr> {
        let mut attr = FileAttr::file(
            self.archive.inode(&self.path),
            self.entry.size,
            self.entry.mode,
            self.entry.mtime,
        )
        .with_ttl(MEMBER_TTL);

        if let Some(converter) = &self.converter {
            let raw = self.archive.handle.read_entry(&self.entry).await?;
            let raw_len = raw.len() as u64;
            let conv = converter.clone();
            attr.size = match run_blocking(move || conv.convert(raw)).await {
                Ok(converted) => converted.len() as u64,
                Err(e) => {
                    tracing::error!(
                        member = %self,
                        converter = %converter,
                        error = %e,
                        "failed to convert image, reporting original size"
                    );
                    raw_len
                }
            };
        }

        Ok(attr)
    }

    /// Materialize the content for one open handle.
    ///
    /// Converted content is produced once here and reused by every read on
    /// the handle; a fresh open converts again.
    pub async fn open(&self) -> VfsResult<FileHandle> {
        warn_if_large(self, self.entry.size);
        let raw = self.archive.handle.read_entry(&self.entry).await?;
        let data = match self.converter.clone() {
            None => raw,
            Some(conv) => run_blocking(move || conv.convert(raw))
                .await
                .inspect_err(|e| {
                    tracing::error!(member = %self, error = %e, "failed to convert image");
                })?,
        };

        Ok(FileHandle::Member(MemberHandle {
            name: self.to_string(),
            data,
        }))
    }
}

impl fmt::Display for ArchiveMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/{}", self.archive.handle.path().display(), self.path)
    }
}

/// Members are buffered whole on open; flag the ones big enough to matter.
fn warn_if_large(member: &ArchiveMember, size: u64) -> bool {
    if size <= LARGE_MEMBER {
        return false;
    }
    tracing::warn!(member = %member, size, "buffering large archive member in memory");
    true
}

/// Open handle on an [`ArchiveMember`]; owns the member's bytes.
#[derive(Debug)]
pub struct MemberHandle {
    name: String,
    data: Vec<u8>,
}

impl MemberHandle {
    /// Content length (after conversion, if any).
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Up to `size` bytes at `offset`; empty at or past the end.
    pub fn read(&self, offset: u64, size: u32) -> Vec<u8> {
        tracing::trace!(member = %self.name, offset, size, "read");
        slice_range(&self.data, offset, size).to_vec()
    }

    /// Drop the buffered content.
    pub fn release(self) -> VfsResult<()> {
        drop(self.data);
        Ok(())
    }
}

fn slice_range(data: &[u8], offset: u64, size: u32) -> &[u8] {
    let len = data.len() as u64;
    if offset >= len {
        return &[];
    }
    let end = offset.saturating_add(u64::from(size)).min(len);
    &data[offset as usize..end as usize]
}
