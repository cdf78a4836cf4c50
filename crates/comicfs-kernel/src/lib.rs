//! comicfs: a read-only overlay filesystem for comic book archives.
//!
//! Directories are mirrored as they are; `.cbz`/`.zip` files appear as
//! directories of their pages, and a page can be requested in another image
//! format by appending an extension (`page01.webp.png`).
//!
//! The crate is the core only. A host binding (kernel filesystem, CLI, test)
//! drives it through [`FilesystemRegistry::root`] and the [`VirtualNode`]
//! operations, or through the path-based [`ComicMount`].

pub mod config;
pub mod imgconv;
pub mod vfs;

pub use config::{ComicFsConfig, ConfigError};
pub use imgconv::{ConversionRegistry, Converter};
pub use vfs::{
    ComicMount, DirEntry, FileAttr, FileHandle, FileType, FilesystemRegistry, VfsError, VfsOps,
    VfsResult, VirtualNode, ZipFactory,
};
