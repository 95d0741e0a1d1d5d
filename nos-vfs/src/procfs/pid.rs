//! /proc/<pid> directories

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt::Write;

use crate::error::{VfsError, VfsResult};
use crate::inode::{FileOps, Inode, InodeRef};
use crate::types::{DeviceId, FileMode, FileType};

use super::item::{ItemDef, ItemNode, ProcfsDir, procfs_dir_getdents, procfs_dir_lookup_child};
use super::{Pid, ProcfsSource};

fn item_pid(node: &ItemNode) -> VfsResult<Pid> {
    node.pid.ok_or(VfsError::InvalidArgument)
}

fn populate_comm(node: &ItemNode, buf: &mut String) -> VfsResult<()> {
    let process = node
        .source
        .processes
        .process(item_pid(node)?)
        .ok_or(VfsError::NotFound)?;
    writeln!(buf, "{}", process.comm).map_err(|_| VfsError::OutOfMemory)
}

fn populate_cmdline(node: &ItemNode, buf: &mut String) -> VfsResult<()> {
    let process = node
        .source
        .processes
        .process(item_pid(node)?)
        .ok_or(VfsError::NotFound)?;
    for arg in &process.cmdline {
        buf.push_str(arg);
        buf.push('\0');
    }
    Ok(())
}

static PID_ITEMS: [ItemDef; 2] = [
    ItemDef { name: "comm", kind: FileType::Regular, populate: populate_comm },
    ItemDef { name: "cmdline", kind: FileType::Regular, populate: populate_cmdline },
];

static PID_DIR_OPS: FileOps = FileOps {
    lookup_child: Some(procfs_dir_lookup_child),
    getdents: Some(procfs_dir_getdents),
    ..FileOps::EMPTY
};

/// Directory for `pid`, or `NotFound` if no such process is alive
pub(super) fn procfs_pid_dir_create(source: &Arc<ProcfsSource>, pid: Pid, dev: DeviceId) -> VfsResult<InodeRef> {
    if source.processes.process(pid).is_none() {
        return Err(VfsError::NotFound);
    }
    let dir = ProcfsDir::with_items(source, &PID_ITEMS, Some(pid), dev)?;
    Ok(Inode::new(&PID_DIR_OPS, FileMode::new(FileMode::S_IFDIR | 0o555), dir)
        .with_dev(dev)
        .with_nlink(1)
        .into_ref())
}
