//! Memory pseudo-devices: null, zero and full

use crate::error::{VfsError, VfsResult};
use crate::file::FileDescription;
use crate::inode::{FileOps, Inode, InodeRef};
use crate::types::{FileMode, makedev};

/// Device numbers following the Linux convention
pub mod devno {
    /// Memory devices major number
    pub const MEM_MAJOR: u32 = 1;
    pub const NULL_MINOR: u32 = 3;
    pub const ZERO_MINOR: u32 = 5;
    pub const FULL_MINOR: u32 = 7;

    /// TTY devices major number
    pub const TTY_MAJOR: u32 = 5;
    /// /dev/console minor
    pub const CONSOLE_MINOR: u32 = 1;
    /// Virtual terminals major number
    pub const VT_MAJOR: u32 = 4;
}

fn read_nothing(_desc: &FileDescription, _buf: &mut [u8]) -> VfsResult<usize> {
    Ok(0)
}

fn read_zeros(_desc: &FileDescription, buf: &mut [u8]) -> VfsResult<usize> {
    buf.fill(0);
    Ok(buf.len())
}

fn write_to_bit_bucket(_desc: &FileDescription, buf: &[u8]) -> VfsResult<usize> {
    Ok(buf.len())
}

fn write_to_full_disk(_desc: &FileDescription, buf: &[u8]) -> VfsResult<usize> {
    if buf.is_empty() {
        Ok(0)
    } else {
        Err(VfsError::NoSpace)
    }
}

static NULL_OPS: FileOps = FileOps {
    read: Some(read_nothing),
    write: Some(write_to_bit_bucket),
    ..FileOps::EMPTY
};

static ZERO_OPS: FileOps = FileOps {
    read: Some(read_zeros),
    write: Some(write_to_bit_bucket),
    ..FileOps::EMPTY
};

static FULL_OPS: FileOps = FileOps {
    read: Some(read_zeros),
    write: Some(write_to_full_disk),
    ..FileOps::EMPTY
};

fn char_device(ops: &'static FileOps, minor: u32) -> InodeRef {
    Inode::new(ops, FileMode::new(FileMode::S_IFCHR | 0o666), ())
        .with_rdev(makedev(devno::MEM_MAJOR, minor))
        .with_nlink(1)
        .into_ref()
}

pub fn null_device_create() -> InodeRef {
    char_device(&NULL_OPS, devno::NULL_MINOR)
}

pub fn zero_device_create() -> InodeRef {
    char_device(&ZERO_OPS, devno::ZERO_MINOR)
}

pub fn full_device_create() -> InodeRef {
    char_device(&FULL_OPS, devno::FULL_MINOR)
}
