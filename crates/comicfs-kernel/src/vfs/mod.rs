//! Read-only overlay filesystem.
//!
//! Mirrors a real directory tree and exposes every registered container file
//! (`.cbz`, `.zip`) as a directory of its entries. Key components:
//!
//! - [`FilesystemRegistry`] - composition root; hands out the root node
//! - [`VirtualNode`] - one resolved path (real dir/file, archive dir/member)
//! - [`InodeTable`] - stable inode numbers for virtual path keys
//! - [`ZipFactory`] - opens zip containers lazily and caches their handles
//! - [`ComicMount`] - path-based [`VfsOps`] with an open-handle table
//!
//! ## Design Decisions
//!
//! - **Single-segment lookups**: every path is resolved one component at a
//!   time from the root, crossing into an archive when a container file is
//!   reached.
//! - **Lazy archives**: listing a directory never opens a container; the
//!   first lookup or listing inside it does, exactly once.
//! - **No globals**: inode and conversion state belong to the registry, so
//!   every test builds its own.

pub mod backends;
mod error;
mod inode;
mod mount;
mod node;
mod ops;
mod registry;
mod types;

pub use backends::{
    ArchiveCache, ArchiveDirectory, ArchiveHandle, ArchiveMember, MemberHandle, RealDirectory,
    RealFile, RealFileHandle, ZipFactory,
};
pub use error::{VfsError, VfsResult};
pub use inode::{InodeTable, member_key, path_key};
pub use mount::ComicMount;
pub use node::{FileHandle, VirtualNode};
pub use ops::VfsOps;
pub use registry::{ArchiveFactory, ContainerTypes, FilesystemRegistry, NodeContext};
pub use types::{DIR_TTL, DirEntry, FileAttr, FileType, MEMBER_TTL, StatFs};
