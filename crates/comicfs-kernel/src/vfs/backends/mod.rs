//! Node implementations.

pub mod archive;
pub mod local;

pub use archive::{
    ArchiveCache, ArchiveDirectory, ArchiveEntry, ArchiveHandle, ArchiveMember, ContainerInfo,
    MemberHandle, ZipFactory,
};
pub use local::{RealDirectory, RealFile, RealFileHandle};

use crate::vfs::error::{VfsError, VfsResult};

/// Run blocking work (disk reads, decompression, image codecs) off the
/// async worker threads.
pub(crate) async fn run_blocking<F, T>(f: F) -> VfsResult<T>
where
    F: FnOnce() -> VfsResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| VfsError::other(format!("blocking task failed: {e}")))?
}
