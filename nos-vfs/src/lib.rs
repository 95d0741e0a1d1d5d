//! NOS VFS
//!
//! Virtual file system layer of the NOS kernel. Every file-like object is an
//! inode whose behaviour comes from a static table of operations; open files
//! are descriptions over an inode. On top of that sit path resolution with
//! mount crossing and symlinks, an in-memory tmpfs, procfs, the memory
//! pseudo-devices, pipes, Unix-domain sockets, virtual terminals and the
//! system console.
//!
//! # Usage
//!
//! ```rust
//! use nos_vfs::{FileMode, OpenFlags, Vfs, VfsConfig};
//!
//! let vfs = Vfs::new(VfsConfig::default())?;
//! vfs.mkdir("/etc", 0o755)?;
//! let file = vfs.open("/etc/motd", OpenFlags::RDWR | OpenFlags::CREAT, FileMode::new(0o644))?;
//! file.write(b"hello\n")?;
//! # Ok::<(), nos_vfs::VfsError>(())
//! ```
//!
//! Blocking operations park the caller through [`block::Scheduler`]; the
//! kernel installs its scheduler with [`block::install`] during boot.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(clippy::all)]

extern crate alloc;

// Core types
pub mod error;
pub mod types;
pub mod config;
pub mod klog;
pub mod block;
pub mod ring_buf;
pub mod memory;

// Inodes, descriptions and the namespace
pub mod inode;
pub mod file;
pub mod dentry;
pub mod path;
pub mod mount;
pub mod vfs;

// Backends
pub mod tmpfs;
pub mod procfs;
pub mod devices;
pub mod initrd;
pub mod fifo;
pub mod unix_socket;
pub mod tty;
pub mod console;

// Process-facing surface
pub mod fd_table;
pub mod syscall;

pub use config::{Cmdline, VfsConfig};
pub use error::{VfsError, VfsResult, to_neg_errno};
pub use fd_table::FdTable;
pub use file::{FileDescription, FileRef};
pub use inode::{FileOps, Inode, InodeRef};
pub use path::Path;
pub use syscall::FsContext;
pub use types::{
    DeviceId, FileMode, FileType, LookupFlags, MmapProt, MmapRequest, OpenFlags, PollEvents, SeekWhence, Stat,
    makedev, major, minor,
};
pub use vfs::Vfs;
