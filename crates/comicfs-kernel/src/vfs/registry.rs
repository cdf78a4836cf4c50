//! Composition root.
//!
//! [`FilesystemRegistry`] owns the process-wide state (inode table,
//! conversion registry, container types) and hands it to every node through a
//! shared [`NodeContext`].

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::backends::{ArchiveDirectory, RealDirectory, ZipFactory};
use super::error::VfsResult;
use super::inode::InodeTable;
use super::node::VirtualNode;
use crate::config::ComicFsConfig;
use crate::imgconv::{ConversionRegistry, normalize_ext};

/// Builds the root directory node of one container type.
#[async_trait]
pub trait ArchiveFactory: Send + Sync + std::fmt::Debug {
    /// Root node for the container at `path`.
    ///
    /// Implementations should not parse the archive here; listing or looking
    /// up entries opens it.
    async fn open_root(&self, path: &Path, ctx: &Arc<NodeContext>) -> VfsResult<ArchiveDirectory>;

    /// Release any cached archive state.
    fn shutdown(&self) {}
}

/// Extension → archive factory.
#[derive(Debug, Default)]
pub struct ContainerTypes {
    factories: RwLock<HashMap<String, Arc<dyn ArchiveFactory>>>,
}

impl ContainerTypes {
    pub fn register(&self, ext: &str, factory: Arc<dyn ArchiveFactory>) {
        let ext = normalize_ext(ext);
        tracing::debug!(ext = %ext, ?factory, "registered container type");
        self.factories.write().insert(ext, factory);
    }

    /// Factory for the file name's extension, if it is a container type.
    pub fn factory_for(&self, path: &Path) -> Option<Arc<dyn ArchiveFactory>> {
        let ext = path.extension()?.to_str()?;
        self.factories.read().get(&normalize_ext(ext)).cloned()
    }

    pub fn is_container(&self, name: &str) -> bool {
        self.factory_for(Path::new(name)).is_some()
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<_> = self.factories.read().keys().cloned().collect();
        exts.sort();
        exts
    }

    /// Shut down every registered factory.
    pub fn shutdown(&self) {
        for factory in self.factories.read().values() {
            factory.shutdown();
        }
    }
}

/// State shared by every node of one registry.
#[derive(Debug)]
pub struct NodeContext {
    inodes: InodeTable,
    converters: Arc<ConversionRegistry>,
    containers: ContainerTypes,
}

impl NodeContext {
    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub fn converters(&self) -> &Arc<ConversionRegistry> {
        &self.converters
    }

    pub fn containers(&self) -> &ContainerTypes {
        &self.containers
    }
}

/// Entry point for a host: the root node plus container registration.
#[derive(Debug)]
pub struct FilesystemRegistry {
    base_dir: PathBuf,
    context: Arc<NodeContext>,
}

impl FilesystemRegistry {
    /// Registry mirroring `base_dir`, with no container types yet.
    pub fn new(base_dir: impl AsRef<Path>, converters: ConversionRegistry) -> Self {
        let base_dir = base_dir.as_ref();
        let base_dir = dunce::canonicalize(base_dir).unwrap_or_else(|_| base_dir.to_path_buf());

        Self {
            base_dir,
            context: Arc::new(NodeContext {
                inodes: InodeTable::new(),
                converters: Arc::new(converters),
                containers: ContainerTypes::default(),
            }),
        }
    }

    /// Registry built from a validated config: configured codecs, and every
    /// container extension mapped to one shared [`ZipFactory`].
    pub fn from_config(config: &ComicFsConfig) -> VfsResult<Self> {
        let mut converters = ConversionRegistry::new();
        for ext in &config.decoders {
            converters.register_builtin_decoder(ext)?;
        }
        for ext in &config.encoders {
            converters.register_builtin_encoder(ext)?;
        }

        let registry = Self::new(&config.base_dir, converters);
        let zip: Arc<dyn ArchiveFactory> = Arc::new(ZipFactory::new());
        for ext in &config.container_extensions {
            registry.register_container_type(ext, Arc::clone(&zip));
        }

        tracing::info!(
            base_dir = %registry.base_dir.display(),
            containers = ?registry.context.containers.extensions(),
            converters = ?registry.context.converters,
            "filesystem registry ready"
        );
        Ok(registry)
    }

    /// Treat files ending in `ext` as containers opened by `factory`.
    pub fn register_container_type(&self, ext: &str, factory: Arc<dyn ArchiveFactory>) {
        self.context.containers.register(ext, factory);
    }

    /// Directory node for the base directory.
    pub fn root(&self) -> VirtualNode {
        RealDirectory::new(&self.base_dir, Arc::clone(&self.context)).into()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.context.inodes
    }

    pub fn converters(&self) -> &Arc<ConversionRegistry> {
        &self.context.converters
    }

    pub fn containers(&self) -> &ContainerTypes {
        &self.context.containers
    }

    /// Drop cached archive handles. Nodes still alive keep their own archive
    /// open until they are dropped.
    pub fn shutdown(&self) {
        tracing::debug!(base_dir = %self.base_dir.display(), "shutting down filesystem registry");
        self.context.containers.shutdown();
    }
}

impl Drop for FilesystemRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
