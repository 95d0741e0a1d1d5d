//! Resolved path chains
//!
//! A [`Path`] is what the resolver hands back: the inode of the final
//! component, its name, and the resolved parent chain up to the root. The
//! root path is the only one without a basename and parent.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::inode::InodeRef;

#[derive(Clone)]
pub struct Path {
    /// `None` only when resolution tolerated a missing last component
    inode: Option<InodeRef>,
    basename: Option<String>,
    parent: Option<Arc<Path>>,
}

impl Path {
    pub fn root(inode: InodeRef) -> Self {
        Self {
            inode: Some(inode),
            basename: None,
            parent: None,
        }
    }

    /// Extend `parent` with a component named `basename`
    pub fn join(parent: Path, inode: Option<InodeRef>, basename: &str) -> Self {
        Self {
            inode,
            basename: Some(String::from(basename)),
            parent: Some(Arc::new(parent)),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn inode(&self) -> Option<&InodeRef> {
        self.inode.as_ref()
    }

    pub fn into_inode(self) -> Option<InodeRef> {
        self.inode
    }

    pub fn basename(&self) -> Option<&str> {
        self.basename.as_deref()
    }

    pub fn parent(&self) -> Option<&Path> {
        self.parent.as_deref()
    }

    /// Path one level up; the root is its own parent
    pub fn up(&self) -> Path {
        match &self.parent {
            Some(parent) => Path::clone(parent),
            None => self.clone(),
        }
    }

    /// Whether `ancestor`'s inode appears in this chain (including itself)
    pub fn has_ancestor(&self, ancestor: &InodeRef) -> bool {
        let mut cursor = Some(self);
        while let Some(path) = cursor {
            if let Some(inode) = &path.inode {
                if Arc::ptr_eq(inode, ancestor) {
                    return true;
                }
            }
            cursor = path.parent();
        }
        false
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        let mut cursor = Some(self);
        while let Some(path) = cursor {
            if let Some(name) = path.basename() {
                names.push(name);
            }
            cursor = path.parent();
        }
        if names.is_empty() {
            return f.write_str("/");
        }
        for name in names.iter().rev() {
            write!(f, "/{}", name)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self)
    }
}
