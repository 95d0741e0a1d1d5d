//! Temporary file system (tmpfs) implementation
//!
//! Regular files and symlinks keep their bytes in an [`AnonRegion`] that
//! grows by doubling, rounded to the page size. Directories keep a
//! [`DentryList`]. FIFO, socket and device nodes carry no data; the VFS
//! redirects opens on them.

use alloc::sync::Arc;
use core::cmp::min;

use spin::{Mutex, RwLock};

use crate::config::VfsConfig;
use crate::dentry::DentryList;
use crate::error::{VfsError, VfsResult};
use crate::file::FileDescription;
use crate::inode::{DirFiller, FileOps, Inode, InodeRef, generate_unnamed_device_number};
use crate::memory::{AnonRegion, Mapping};
use crate::types::{DeviceId, FileMode, FileType, MmapRequest, OpenFlags, Stat};

/// Per-instance state shared by every node of one tmpfs
struct TmpfsSuper {
    dev: DeviceId,
    page_size: usize,
}

struct FileData {
    region: AnonRegion,
    size: usize,
}

enum Content {
    Dir(RwLock<DentryList>),
    Data(Mutex<FileData>),
    Special,
}

struct TmpfsNode {
    sb: Arc<TmpfsSuper>,
    content: Content,
}

impl TmpfsNode {
    fn children(&self) -> VfsResult<&RwLock<DentryList>> {
        match &self.content {
            Content::Dir(children) => Ok(children),
            _ => Err(VfsError::NotDirectory),
        }
    }

    fn data(&self) -> VfsResult<&Mutex<FileData>> {
        match &self.content {
            Content::Data(data) => Ok(data),
            Content::Dir(_) => Err(VfsError::IsDirectory),
            Content::Special => Err(VfsError::InvalidArgument),
        }
    }
}

fn node_of(inode: &Inode) -> VfsResult<&TmpfsNode> {
    inode.private::<TmpfsNode>()
}

fn new_node(sb: &Arc<TmpfsSuper>, mode: FileMode) -> InodeRef {
    let (ops, content) = match mode.file_type() {
        Some(FileType::Directory) => (&DIR_OPS, Content::Dir(RwLock::new(DentryList::new()))),
        Some(FileType::Regular) | Some(FileType::Symlink) => (
            &FILE_OPS,
            Content::Data(Mutex::new(FileData {
                region: AnonRegion::new(sb.page_size),
                size: 0,
            })),
        ),
        _ => (&SPECIAL_OPS, Content::Special),
    };
    let node = TmpfsNode {
        sb: sb.clone(),
        content,
    };
    Inode::new(ops, mode, node).with_dev(sb.dev).into_ref()
}

/// Create the root directory of a fresh tmpfs instance
pub fn create_root(config: &VfsConfig) -> VfsResult<InodeRef> {
    if !config.page_size.is_power_of_two() {
        return Err(VfsError::InvalidArgument);
    }
    let sb = Arc::new(TmpfsSuper {
        dev: generate_unnamed_device_number(),
        page_size: config.page_size,
    });
    let root = new_node(&sb, FileMode::new(FileMode::S_IFDIR | 0o755));
    root.inc_nlink();
    log::debug!("tmpfs: new instance dev={:#x}", sb.dev);
    Ok(root)
}

fn tmpfs_lookup_child(inode: &Inode, name: &str) -> VfsResult<InodeRef> {
    node_of(inode)?
        .children()?
        .read()
        .find(name)
        .ok_or(VfsError::NotFound)
}

fn tmpfs_create_child(inode: &Inode, name: &str, mode: FileMode) -> VfsResult<InodeRef> {
    let node = node_of(inode)?;
    let child = new_node(&node.sb, mode);
    node.children()?.write().append(name, child.clone())?;
    Ok(child)
}

fn tmpfs_link_child(inode: &Inode, name: &str, child: InodeRef) -> VfsResult<()> {
    node_of(inode)?.children()?.write().append(name, child)
}

fn tmpfs_unlink_child(inode: &Inode, name: &str) -> VfsResult<InodeRef> {
    node_of(inode)?.children()?.write().remove(name)
}

fn tmpfs_stat(inode: &Inode, stat: &mut Stat) -> VfsResult<()> {
    if let Content::Data(data) = &node_of(inode)?.content {
        stat.size = data.lock().size as u64;
    }
    Ok(())
}

fn tmpfs_getdents(desc: &FileDescription, filler: &mut DirFiller<'_>) -> VfsResult<()> {
    let node = node_of(desc.inode())?;
    node.children()?.read().getdents(desc, filler)
}

fn tmpfs_read(desc: &FileDescription, buf: &mut [u8]) -> VfsResult<usize> {
    let data = node_of(desc.inode())?.data()?;
    let mut offset = desc.lock_offset();
    let data = data.lock();
    let start = *offset as usize;
    if start >= data.size {
        return Ok(0);
    }
    let count = min(buf.len(), data.size - start);
    data.region.read_at(start, &mut buf[..count]);
    *offset += count as u64;
    Ok(count)
}

fn tmpfs_write(desc: &FileDescription, buf: &[u8]) -> VfsResult<usize> {
    let data = node_of(desc.inode())?.data()?;
    let mut offset = desc.lock_offset();
    let mut data = data.lock();
    // APPEND takes the end of file under the data lock
    if desc.flags().contains(OpenFlags::APPEND) {
        *offset = data.size as u64;
    }
    let start = usize::try_from(*offset).map_err(|_| VfsError::InvalidArgument)?;
    let end = start.checked_add(buf.len()).ok_or(VfsError::InvalidArgument)?;
    if end > data.region.capacity() {
        data.region.grow(end)?;
    }
    data.region.write_at(start, buf);
    *offset = end as u64;
    if data.size < end {
        data.size = end;
    }
    Ok(buf.len())
}

fn tmpfs_mmap(desc: &FileDescription, request: &MmapRequest) -> VfsResult<Mapping> {
    if request.offset != 0 || !request.shared {
        return Err(VfsError::NotSupported);
    }
    let data = node_of(desc.inode())?.data()?.lock();
    if request.length > data.size {
        return Err(VfsError::InvalidArgument);
    }
    Ok(data.region.share(request.addr, request.length))
}

fn tmpfs_truncate(desc: &FileDescription, length: u64) -> VfsResult<()> {
    let mut data = node_of(desc.inode())?.data()?.lock();
    let length = usize::try_from(length).map_err(|_| VfsError::InvalidArgument)?;
    if length <= data.size {
        data.region.zero_range(length, data.size);
    } else if length < data.region.capacity() {
        data.region.zero_range(data.size, length);
    } else {
        data.region.grow(length)?;
    }
    data.size = length;
    Ok(())
}

static DIR_OPS: FileOps = FileOps {
    lookup_child: Some(tmpfs_lookup_child),
    create_child: Some(tmpfs_create_child),
    link_child: Some(tmpfs_link_child),
    unlink_child: Some(tmpfs_unlink_child),
    stat: Some(tmpfs_stat),
    getdents: Some(tmpfs_getdents),
    ..FileOps::EMPTY
};

static FILE_OPS: FileOps = FileOps {
    stat: Some(tmpfs_stat),
    read: Some(tmpfs_read),
    write: Some(tmpfs_write),
    mmap: Some(tmpfs_mmap),
    truncate: Some(tmpfs_truncate),
    ..FileOps::EMPTY
};

static SPECIAL_OPS: FileOps = FileOps {
    stat: Some(tmpfs_stat),
    ..FileOps::EMPTY
};
