//! Inodes and the backend dispatch table
//!
//! An [`Inode`] is the identity of a filesystem object. Each backend supplies
//! a static [`FileOps`] table; entries left as `None` are capabilities the
//! object lacks, and the validated wrappers here and in [`crate::file`] turn
//! them into the matching error instead of dispatching.
//!
//! Inodes are shared as [`InodeRef`] (`Arc<Inode>`). The backend's `destroy`
//! hook runs from `Drop`, i.e. exactly once, after the last reference is gone.
//! The link count is bookkeeping only and never frees the inode.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use spin::{Mutex, Once};

use crate::config::PAGE_SIZE;
use crate::error::{VfsError, VfsResult};
use crate::file::FileDescription;
use crate::memory::Mapping;
use crate::types::{DeviceId, FileMode, FileType, MmapRequest, PollEvents, Stat, makedev};

pub type InodeRef = Arc<Inode>;

/// Directory enumeration callback: `(name, type)`; returns `false` to stop
pub type DirFiller<'a> = dyn FnMut(&str, FileType) -> bool + 'a;

/// Backend operation table
///
/// Inode-level entries receive the inode, description-level entries receive
/// the open description.
#[derive(Clone, Copy)]
pub struct FileOps {
    pub destroy: Option<fn(&Inode)>,

    pub lookup_child: Option<fn(&Inode, &str) -> VfsResult<InodeRef>>,
    pub create_child: Option<fn(&Inode, &str, FileMode) -> VfsResult<InodeRef>>,
    pub link_child: Option<fn(&Inode, &str, InodeRef) -> VfsResult<()>>,
    pub unlink_child: Option<fn(&Inode, &str) -> VfsResult<InodeRef>>,
    pub open: Option<fn(&FileDescription, FileMode) -> VfsResult<()>>,
    pub stat: Option<fn(&Inode, &mut Stat) -> VfsResult<()>>,

    pub close: Option<fn(&FileDescription)>,
    pub read: Option<fn(&FileDescription, &mut [u8]) -> VfsResult<usize>>,
    pub write: Option<fn(&FileDescription, &[u8]) -> VfsResult<usize>>,
    pub mmap: Option<fn(&FileDescription, &MmapRequest) -> VfsResult<Mapping>>,
    pub truncate: Option<fn(&FileDescription, u64) -> VfsResult<()>>,
    pub ioctl: Option<fn(&FileDescription, u32, &mut [u8]) -> VfsResult<usize>>,
    pub getdents: Option<fn(&FileDescription, &mut DirFiller<'_>) -> VfsResult<()>>,
    pub poll: Option<fn(&FileDescription, PollEvents) -> PollEvents>,
}

impl FileOps {
    /// Table with every capability missing
    pub const EMPTY: FileOps = FileOps {
        destroy: None,
        lookup_child: None,
        create_child: None,
        link_child: None,
        unlink_child: None,
        open: None,
        stat: None,
        close: None,
        read: None,
        write: None,
        mmap: None,
        truncate: None,
        ioctl: None,
        getdents: None,
        poll: None,
    };
}

static NEXT_INO: AtomicU64 = AtomicU64::new(1);
static NEXT_UNNAMED_MINOR: AtomicU32 = AtomicU32::new(1);

/// Device number for a fresh in-memory filesystem instance
pub fn generate_unnamed_device_number() -> DeviceId {
    makedev(0, NEXT_UNNAMED_MINOR.fetch_add(1, Ordering::Relaxed))
}

#[cfg(feature = "debug_subsystems")]
#[inline]
pub(crate) fn trace_op(op: &str, ino: u64) {
    log::trace!("vfs: {} on inode {}", op, ino);
}

#[cfg(not(feature = "debug_subsystems"))]
#[inline]
pub(crate) fn trace_op(_op: &str, _ino: u64) {}

/// Filesystem object identity
pub struct Inode {
    ops: &'static FileOps,
    ino: u64,
    dev: DeviceId,
    rdev: AtomicU64,
    mode: FileMode,
    nlink: AtomicU32,
    uid: u32,
    gid: u32,
    /// Pipe shared by every opener of a FIFO node
    pub(crate) fifo: Once<InodeRef>,
    /// Listening socket bound to a socket node
    pub(crate) bound_socket: Mutex<Option<InodeRef>>,
    private: Box<dyn Any + Send + Sync>,
}

impl Inode {
    pub fn new(ops: &'static FileOps, mode: FileMode, private: impl Any + Send + Sync) -> Self {
        Self {
            ops,
            ino: NEXT_INO.fetch_add(1, Ordering::Relaxed),
            dev: 0,
            rdev: AtomicU64::new(0),
            mode,
            nlink: AtomicU32::new(0),
            uid: 0,
            gid: 0,
            fifo: Once::new(),
            bound_socket: Mutex::new(None),
            private: Box::new(private),
        }
    }

    pub fn with_dev(mut self, dev: DeviceId) -> Self {
        self.dev = dev;
        self
    }

    pub fn with_rdev(self, rdev: DeviceId) -> Self {
        self.rdev.store(rdev, Ordering::Relaxed);
        self
    }

    pub fn with_nlink(self, nlink: u32) -> Self {
        self.nlink.store(nlink, Ordering::Relaxed);
        self
    }

    pub fn into_ref(self) -> InodeRef {
        Arc::new(self)
    }

    pub fn ops(&self) -> &'static FileOps {
        self.ops
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }

    pub fn dev(&self) -> DeviceId {
        self.dev
    }

    pub fn rdev(&self) -> DeviceId {
        self.rdev.load(Ordering::Relaxed)
    }

    pub fn set_rdev(&self, rdev: DeviceId) {
        self.rdev.store(rdev, Ordering::Relaxed);
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn file_type(&self) -> Option<FileType> {
        self.mode.file_type()
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    pub fn nlink(&self) -> u32 {
        self.nlink.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_nlink(&self) {
        self.nlink.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dec_nlink(&self) {
        let _ = self
            .nlink
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Backend-private state, if it is a `T`
    pub fn private<T: Any>(&self) -> VfsResult<&T> {
        self.private.downcast_ref::<T>().ok_or(VfsError::InvalidArgument)
    }

    pub fn lookup_child(&self, name: &str) -> VfsResult<InodeRef> {
        trace_op("lookup_child", self.ino);
        let lookup = match self.ops.lookup_child {
            Some(lookup) if self.is_dir() => lookup,
            _ => return Err(VfsError::NotDirectory),
        };
        lookup(self, name)
    }

    /// Create a child entry.
    ///
    /// # Panics
    ///
    /// If `mode` carries no object kind.
    pub fn create_child(&self, name: &str, mode: FileMode) -> VfsResult<InodeRef> {
        trace_op("create_child", self.ino);
        let create = match self.ops.create_child {
            Some(create) if self.is_dir() => create,
            _ => return Err(VfsError::NotDirectory),
        };
        assert!(mode.has_kind(), "create_child: mode {:#o} has no file type", mode.0);
        create(self, name, mode)
    }

    pub fn link_child(&self, name: &str, child: InodeRef) -> VfsResult<()> {
        trace_op("link_child", self.ino);
        if !self.is_dir() {
            return Err(VfsError::NotDirectory);
        }
        let link = self.ops.link_child.ok_or(VfsError::NotSupported)?;
        link(self, name, child)
    }

    /// Remove the entry `name`, returning the inode it referred to
    pub fn unlink_child(&self, name: &str) -> VfsResult<InodeRef> {
        trace_op("unlink_child", self.ino);
        if !self.is_dir() {
            return Err(VfsError::NotDirectory);
        }
        let unlink = self.ops.unlink_child.ok_or(VfsError::NotSupported)?;
        unlink(self, name)
    }

    pub fn stat(&self) -> VfsResult<Stat> {
        trace_op("stat", self.ino);
        let mut stat = Stat {
            dev: self.dev,
            ino: self.ino,
            mode: self.mode,
            nlink: self.nlink(),
            uid: self.uid,
            gid: self.gid,
            rdev: self.rdev(),
            blksize: PAGE_SIZE as u32,
            ..Stat::default()
        };
        if let Some(hook) = self.ops.stat {
            hook(self, &mut stat)?;
        }
        stat.blocks = stat.size.div_ceil(512);
        Ok(stat)
    }

    /// Size reported by the backend
    pub fn size(&self) -> VfsResult<u64> {
        Ok(self.stat()?.size)
    }
}

impl Drop for Inode {
    fn drop(&mut self) {
        trace_op("destroy", self.ino);
        if let Some(destroy) = self.ops.destroy {
            destroy(self);
        }
    }
}

impl fmt::Debug for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inode")
            .field("ino", &self.ino)
            .field("dev", &self.dev)
            .field("rdev", &self.rdev())
            .field("mode", &format_args!("{:#o}", self.mode.0))
            .field("nlink", &self.nlink())
            .finish()
    }
}
