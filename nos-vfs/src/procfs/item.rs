//! Generated files and the directory node shared by procfs directories

use alloc::string::String;
use alloc::sync::Arc;
use core::cmp::min;

use crate::dentry::DentryList;
use crate::error::{VfsError, VfsResult};
use crate::file::FileDescription;
use crate::inode::{DirFiller, FileOps, Inode, InodeRef};
use crate::types::{DeviceId, FileMode, FileType, Stat};

use super::{Pid, ProcfsSource};

/// Appends an item's text to the output buffer
pub(super) type PopulateFn = fn(&ItemNode, &mut String) -> VfsResult<()>;

pub(super) struct ItemDef {
    pub name: &'static str,
    pub kind: FileType,
    pub populate: PopulateFn,
}

pub(super) struct ItemNode {
    pub source: Arc<ProcfsSource>,
    pub pid: Option<Pid>,
    populate: PopulateFn,
}

impl ItemNode {
    fn generate(&self) -> VfsResult<String> {
        let mut buf = String::new();
        (self.populate)(self, &mut buf)?;
        Ok(buf)
    }
}

/// Text produced when the description was opened
struct Generated(String);

pub(super) fn item_create(def: &ItemDef, source: &Arc<ProcfsSource>, pid: Option<Pid>, dev: DeviceId) -> InodeRef {
    let perm = match def.kind {
        FileType::Symlink => 0o777,
        _ => 0o444,
    };
    let node = ItemNode {
        source: source.clone(),
        pid,
        populate: def.populate,
    };
    Inode::new(&ITEM_OPS, FileMode::of(def.kind, perm), node)
        .with_dev(dev)
        .into_ref()
}

fn item_open(desc: &FileDescription, _mode: FileMode) -> VfsResult<()> {
    let text = desc.inode().private::<ItemNode>()?.generate()?;
    desc.set_private(Generated(text));
    Ok(())
}

fn item_read(desc: &FileDescription, buf: &mut [u8]) -> VfsResult<usize> {
    let Generated(text) = desc.private::<Generated>().ok_or(VfsError::BadFileDescriptor)?;
    let bytes = text.as_bytes();
    let mut offset = desc.lock_offset();
    let start = min(*offset as usize, bytes.len());
    let count = min(buf.len(), bytes.len() - start);
    buf[..count].copy_from_slice(&bytes[start..start + count]);
    *offset += count as u64;
    Ok(count)
}

fn item_stat(inode: &Inode, stat: &mut Stat) -> VfsResult<()> {
    stat.size = inode.private::<ItemNode>()?.generate()?.len() as u64;
    Ok(())
}

static ITEM_OPS: FileOps = FileOps {
    open: Some(item_open),
    read: Some(item_read),
    stat: Some(item_stat),
    ..FileOps::EMPTY
};

/// Directory with a fixed set of children
pub(super) struct ProcfsDir {
    pub source: Arc<ProcfsSource>,
    pub children: DentryList,
}

impl ProcfsDir {
    /// Build a directory populated from `defs`
    pub fn with_items(source: &Arc<ProcfsSource>, defs: &[ItemDef], pid: Option<Pid>, dev: DeviceId) -> VfsResult<Self> {
        let mut children = DentryList::new();
        for def in defs {
            children.append(def.name, item_create(def, source, pid, dev))?;
        }
        Ok(Self {
            source: source.clone(),
            children,
        })
    }
}

pub(super) fn procfs_dir_lookup_child(inode: &Inode, name: &str) -> VfsResult<InodeRef> {
    inode
        .private::<ProcfsDir>()?
        .children
        .find(name)
        .ok_or(VfsError::NotFound)
}

pub(super) fn procfs_dir_getdents(desc: &FileDescription, filler: &mut DirFiller<'_>) -> VfsResult<()> {
    desc.inode()
        .private::<ProcfsDir>()?
        .children
        .getdents(desc, filler)
}
