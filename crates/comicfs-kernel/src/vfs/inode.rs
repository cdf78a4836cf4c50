//! Path to inode identity table.
//!
//! Every node kind formats its key through [`path_key`] or [`member_key`], so
//! a real path and an archive entry can never share an inode.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

/// Stable inode numbers for virtual path keys.
///
/// A key seen for the first time gets `len(table)`; ids are never reused,
/// renumbered or evicted for the life of the table.
#[derive(Debug, Default)]
pub struct InodeTable {
    inodes: Mutex<HashMap<String, u64>>,
}

impl InodeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inode for `key`, assigning the next id if the key is new.
    pub fn inode_for(&self, key: &str) -> u64 {
        // Lookup and insert happen under one lock so two callers racing on the
        // same unseen key agree on its id.
        let mut inodes = self.inodes.lock();
        if let Some(&ino) = inodes.get(key) {
            return ino;
        }

        let ino = inodes.len() as u64;
        inodes.insert(key.to_owned(), ino);
        ino
    }

    /// Number of keys assigned so far.
    pub fn len(&self) -> usize {
        self.inodes.lock().len()
    }

    /// Returns true if no key has been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Key for a real filesystem path (also used for an archive's root).
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Key for a path inside the container at `container`.
///
/// An empty `inner` path is the archive root and shares the container's key.
pub fn member_key(container: &Path, inner: &str) -> String {
    let inner = inner.trim_end_matches('/');
    if inner.is_empty() {
        path_key(container)
    } else {
        format!("{}/{}", container.to_string_lossy(), inner)
    }
}
