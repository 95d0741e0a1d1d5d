//! Mount table
extern crate alloc;
use alloc::{string::String, vec::Vec};

use spin::RwLock;

use crate::inode::InodeRef;

/// Mount point information
#[derive(Clone)]
pub struct Mount {
    /// Absolute mount point path
    pub path: String,
    /// Root inode of the mounted filesystem
    pub root: InodeRef,
    /// Filesystem type name
    pub fs_type: &'static str,
}

/// Mounts in the order they were made. Entries are never removed.
#[derive(Default)]
pub struct MountTable {
    mounts: RwLock<Vec<Mount>>,
}

impl MountTable {
    pub const fn new() -> Self {
        Self {
            mounts: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, path: &str, root: InodeRef, fs_type: &'static str) {
        self.mounts.write().push(Mount {
            path: String::from(path),
            root,
            fs_type,
        });
    }

    /// Root inode mounted at `path`; later mounts shadow earlier ones
    pub fn find(&self, path: &str) -> Option<InodeRef> {
        self.mounts
            .read()
            .iter()
            .rev()
            .find(|mount| mount.path == path)
            .map(|mount| mount.root.clone())
    }

    /// Whether `path` is a mount point or has one somewhere beneath it
    pub fn covers(&self, path: &str) -> bool {
        self.mounts.read().iter().any(|mount| {
            mount.path == path
                || path == "/"
                || mount
                    .path
                    .strip_prefix(path)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn mounts(&self) -> Vec<Mount> {
        self.mounts.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::{FileOps, Inode};
    use crate::types::FileMode;
    use alloc::sync::Arc;

    #[test]
    fn test_later_mount_shadows() {
        let table = MountTable::new();
        let first = Inode::new(&FileOps::EMPTY, FileMode::new(FileMode::S_IFDIR), ()).into_ref();
        let second = Inode::new(&FileOps::EMPTY, FileMode::new(FileMode::S_IFDIR), ()).into_ref();
        table.add("/mnt", first, "tmpfs");
        table.add("/mnt", second.clone(), "proc");
        assert!(Arc::ptr_eq(&table.find("/mnt").unwrap(), &second));
        assert!(table.find("/mnt/x").is_none());
        assert_eq!(table.mounts().len(), 2);
    }

    #[test]
    fn test_covers_mount_points_and_ancestors() {
        let table = MountTable::new();
        let root = Inode::new(&FileOps::EMPTY, FileMode::new(FileMode::S_IFDIR), ()).into_ref();
        table.add("/srv/data", root, "tmpfs");
        assert!(table.covers("/srv/data"));
        assert!(table.covers("/srv"));
        assert!(!table.covers("/sr"));
        assert!(!table.covers("/srv/data2"));
        assert!(!table.covers("/srv/data/inner"));
    }
}
