//! Virtual File System (VFS) Layer
//!
//! Ties the backends together:
//! - Path resolution across mount points and symbolic links
//! - Namespace operations (create, link, unlink, rename, rmdir)
//! - Device registry and redirection of opens on special nodes
//! - Pipes and socket binding

extern crate alloc;

use alloc::{format, string::{String, ToString}, sync::Arc, vec, vec::Vec};
use core::cmp::min;

use hashbrown::HashMap;
use spin::{Once, RwLock};

use crate::config::VfsConfig;
use crate::devices::{full_device_create, null_device_create, zero_device_create};
use crate::error::{VfsError, VfsResult};
use crate::fifo::fifo_create;
use crate::file::{self, FileDescription, FileRef};
use crate::inode::InodeRef;
use crate::mount::MountTable;
use crate::path::Path;
use crate::procfs::{NoProcesses, NullSystemInfo, ProcessTable, ProcfsSource, SystemInfo, procfs_create_root};
use crate::tmpfs;
use crate::types::{DeviceId, FileMode, FileType, LookupFlags, OpenFlags, Stat};
use crate::unix_socket::{unix_socket_connect, unix_socket_create};

// ============================================================================
// VFS Core
// ============================================================================

pub struct Vfs {
    config: VfsConfig,
    /// Root of the initial tmpfs
    root: InodeRef,
    mounts: MountTable,
    /// Registered devices by name
    devices: RwLock<HashMap<String, InodeRef>>,
    procfs_source: ProcfsSource,
}

impl Vfs {
    /// Create a VFS with a tmpfs root and the memory pseudo-devices registered
    pub fn new(config: VfsConfig) -> VfsResult<Self> {
        Self::with_collaborators(config, Arc::new(NoProcesses), Arc::new(NullSystemInfo))
    }

    /// Like [`Vfs::new`], with procfs reading from the given collaborators
    pub fn with_collaborators(
        config: VfsConfig,
        processes: Arc<dyn ProcessTable>,
        system: Arc<dyn SystemInfo>,
    ) -> VfsResult<Self> {
        let root = tmpfs::create_root(&config)?;
        let procfs_source = ProcfsSource {
            processes,
            system,
            cmdline: String::from(config.cmdline.raw()),
        };
        let vfs = Self {
            config,
            root,
            mounts: MountTable::new(),
            devices: RwLock::new(HashMap::new()),
            procfs_source,
        };
        vfs.register_device("null", null_device_create())?;
        vfs.register_device("zero", zero_device_create())?;
        vfs.register_device("full", full_device_create())?;
        log::info!("vfs: initialized");
        Ok(vfs)
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    /// Root path, honouring a filesystem mounted on `/`
    pub fn root_path(&self) -> Path {
        Path::root(self.mounts.find("/").unwrap_or_else(|| self.root.clone()))
    }

    // ========================================================================
    // Path resolution
    // ========================================================================

    pub fn resolve_path(&self, pathname: &str, flags: LookupFlags) -> VfsResult<Path> {
        self.resolve_path_at(&self.root_path(), pathname, flags)
    }

    /// Resolve `pathname` relative to `base` (ignored for absolute paths)
    pub fn resolve_path_at(&self, base: &Path, pathname: &str, flags: LookupFlags) -> VfsResult<Path> {
        self.resolve_inner(base, pathname, flags, 0)
    }

    fn resolve_inner(&self, base: &Path, pathname: &str, flags: LookupFlags, depth: usize) -> VfsResult<Path> {
        if pathname.is_empty() {
            return Err(VfsError::NotFound);
        }
        if pathname.len() >= self.config.path_max {
            return Err(VfsError::NameTooLong);
        }

        let mut path = if pathname.starts_with('/') {
            self.root_path()
        } else {
            base.clone()
        };

        let mut components = pathname.split('/').filter(|c| !c.is_empty()).peekable();
        while let Some(name) = components.next() {
            let is_last = components.peek().is_none();
            if name.len() > self.config.name_max {
                return Err(VfsError::NameTooLong);
            }

            let dir = path.inode().cloned().ok_or(VfsError::NotFound)?;
            if !dir.is_dir() {
                return Err(VfsError::NotDirectory);
            }
            match name {
                "." => continue,
                ".." => {
                    path = path.up();
                    continue;
                }
                _ => {}
            }

            let child = match dir.lookup_child(name) {
                Ok(child) => child,
                Err(VfsError::NotFound) if is_last && flags.contains(LookupFlags::ALLOW_NOENT) => {
                    return Ok(Path::join(path, None, name));
                }
                Err(err) => return Err(err),
            };

            let mut next = Path::join(path.clone(), Some(child.clone()), name);
            if let Some(mounted) = self.mounts.find(&next.to_string()) {
                next = Path::join(path.clone(), Some(mounted), name);
            }

            if !child.mode().is_symlink() {
                path = next;
                continue;
            }

            if is_last && flags.contains(LookupFlags::NOFOLLOW) {
                if flags.contains(LookupFlags::NOFOLLOW_NOERROR) {
                    return Ok(next);
                }
                return Err(VfsError::TooManySymlinks);
            }
            if depth >= self.config.max_symlink_depth {
                return Err(VfsError::TooManySymlinks);
            }

            let target = self.read_link_target(&child)?;
            let target_flags = if is_last { flags } else { LookupFlags::empty() };
            path = self.resolve_inner(&path, &target, target_flags, depth + 1)?;
            if path.inode().is_none() {
                return Ok(path);
            }
        }
        Ok(path)
    }

    fn read_link_target(&self, link: &InodeRef) -> VfsResult<String> {
        let desc = file::open(link, OpenFlags::RDONLY, FileMode::default())?;
        let mut buf = vec![0u8; self.config.symlink_max];
        let len = desc.read_to_end(&mut buf)?;
        buf.truncate(len);
        String::from_utf8(buf).map_err(|_| VfsError::InvalidArgument)
    }

    // ========================================================================
    // Open / create / stat
    // ========================================================================

    pub fn open(&self, pathname: &str, flags: OpenFlags, mode: FileMode) -> VfsResult<FileRef> {
        self.open_at(&self.root_path(), pathname, flags, mode)
    }

    pub fn open_at(&self, base: &Path, pathname: &str, flags: OpenFlags, mode: FileMode) -> VfsResult<FileRef> {
        let mut lookup = LookupFlags::empty();
        if flags.contains(OpenFlags::CREAT) {
            lookup |= LookupFlags::ALLOW_NOENT;
        }
        if flags.contains(OpenFlags::NOFOLLOW) {
            lookup |= LookupFlags::NOFOLLOW;
        }

        let path = self.resolve_path_at(base, pathname, lookup)?;
        let inode = match path.inode() {
            Some(inode) => {
                if flags.contains(OpenFlags::CREAT | OpenFlags::EXCL) {
                    return Err(VfsError::Exists);
                }
                inode.clone()
            }
            None => create_in_parent(&path, mode.or_regular())?,
        };
        if flags.contains(OpenFlags::DIRECTORY) && !inode.is_dir() {
            return Err(VfsError::NotDirectory);
        }

        let target = self.open_target(&inode)?;
        let desc = file::open(&target, flags, mode)?;
        if flags.contains(OpenFlags::TRUNC) && flags.writable() && inode.mode().is_regular() {
            desc.truncate(0)?;
        }
        Ok(desc)
    }

    /// Object an open of `inode` actually reaches
    fn open_target(&self, inode: &InodeRef) -> VfsResult<InodeRef> {
        let mode = inode.mode();
        if mode.is_fifo() {
            if let Some(pipe) = inode.fifo.get() {
                return Ok(pipe.clone());
            }
            let pipe = fifo_create(self.config.fifo_capacity)?;
            return Ok(inode.fifo.call_once(|| pipe).clone());
        }
        if mode.is_device() {
            return self.find_device_by_rdev(inode.rdev()).ok_or(VfsError::NoSuchDevice);
        }
        if mode.is_socket() {
            return Err(VfsError::NoSuchDevice);
        }
        Ok(inode.clone())
    }

    /// Create `pathname`, which must not exist yet.
    ///
    /// # Panics
    ///
    /// If `mode` carries no object kind.
    pub fn create(&self, pathname: &str, mode: FileMode) -> VfsResult<InodeRef> {
        self.create_at(&self.root_path(), pathname, mode)
    }

    pub fn create_at(&self, base: &Path, pathname: &str, mode: FileMode) -> VfsResult<InodeRef> {
        let path = self.resolve_path_at(base, pathname, LookupFlags::ALLOW_NOENT)?;
        if path.inode().is_some() {
            return Err(VfsError::Exists);
        }
        create_in_parent(&path, mode)
    }

    pub fn stat(&self, pathname: &str, flags: LookupFlags) -> VfsResult<Stat> {
        self.stat_at(&self.root_path(), pathname, flags)
    }

    pub fn stat_at(&self, base: &Path, pathname: &str, flags: LookupFlags) -> VfsResult<Stat> {
        self.resolve_path_at(base, pathname, flags)?
            .inode()
            .ok_or(VfsError::NotFound)?
            .stat()
    }

    // ========================================================================
    // Namespace operations
    // ========================================================================

    pub fn mkdir(&self, pathname: &str, perm: u32) -> VfsResult<InodeRef> {
        self.mkdir_at(&self.root_path(), pathname, perm)
    }

    pub fn mkdir_at(&self, base: &Path, pathname: &str, perm: u32) -> VfsResult<InodeRef> {
        self.create_at(base, pathname, FileMode::of(FileType::Directory, perm & 0o777))
    }

    /// Create a special or regular node carrying `rdev`
    pub fn mknod_at(&self, base: &Path, pathname: &str, mode: FileMode, rdev: DeviceId) -> VfsResult<InodeRef> {
        match mode.file_type() {
            Some(FileType::Regular)
            | Some(FileType::CharDevice)
            | Some(FileType::BlockDevice)
            | Some(FileType::Fifo)
            | Some(FileType::Socket) => {}
            _ => return Err(VfsError::InvalidArgument),
        }
        let inode = self.create_at(base, pathname, mode)?;
        inode.set_rdev(rdev);
        Ok(inode)
    }

    pub fn symlink_at(&self, base: &Path, target: &str, linkpath: &str) -> VfsResult<()> {
        if target.len() > self.config.symlink_max {
            return Err(VfsError::NameTooLong);
        }
        let link = self.create_at(base, linkpath, FileMode::new(FileMode::S_IFLNK | 0o777))?;
        let desc = file::open(&link, OpenFlags::WRONLY, FileMode::default())?;
        desc.write_all(target.as_bytes())?;
        Ok(())
    }

    /// Copy the target of the symlink at `pathname` into `buf`
    pub fn readlink_at(&self, base: &Path, pathname: &str, buf: &mut [u8]) -> VfsResult<usize> {
        let path = self.resolve_path_at(base, pathname, LookupFlags::NOFOLLOW | LookupFlags::NOFOLLOW_NOERROR)?;
        let link = path.inode().ok_or(VfsError::NotFound)?;
        if !link.mode().is_symlink() {
            return Err(VfsError::InvalidArgument);
        }
        let desc = file::open(link, OpenFlags::RDONLY, FileMode::default())?;
        let len = min(buf.len(), self.config.symlink_max);
        desc.read_to_end(&mut buf[..len])
    }

    pub fn link_at(&self, base: &Path, oldpath: &str, newpath: &str) -> VfsResult<()> {
        let old = self
            .resolve_path_at(base, oldpath, LookupFlags::empty())?
            .into_inode()
            .ok_or(VfsError::NotFound)?;
        if old.is_dir() {
            return Err(VfsError::NotPermitted);
        }
        let new = self.resolve_path_at(base, newpath, LookupFlags::ALLOW_NOENT)?;
        if new.inode().is_some() {
            return Err(VfsError::Exists);
        }
        let (parent, name) = parent_and_name(&new)?;
        parent.link_child(name, old)
    }

    pub fn unlink_at(&self, base: &Path, pathname: &str) -> VfsResult<()> {
        let path = self.resolve_path_at(base, pathname, LookupFlags::NOFOLLOW | LookupFlags::NOFOLLOW_NOERROR)?;
        let (parent, name) = parent_and_name(&path)?;
        if path.inode().is_some_and(|inode| inode.is_dir()) {
            return Err(VfsError::NotPermitted);
        }
        parent.unlink_child(name)?;
        Ok(())
    }

    /// Move `oldpath` to `newpath`, replacing a non-directory or an empty
    /// directory at the destination
    pub fn rename_at(&self, base: &Path, oldpath: &str, newpath: &str) -> VfsResult<()> {
        let nofollow = LookupFlags::NOFOLLOW | LookupFlags::NOFOLLOW_NOERROR;
        let old_path = self.resolve_path_at(base, oldpath, nofollow)?;
        let old = old_path.inode().cloned().ok_or(VfsError::NotFound)?;
        let (old_parent, old_name) = parent_and_name(&old_path)?;

        let new_path = self.resolve_path_at(base, newpath, nofollow | LookupFlags::ALLOW_NOENT)?;
        let (new_parent, new_name) = parent_and_name(&new_path)?;
        if self.mounts.covers(&old_path.to_string()) || self.mounts.covers(&new_path.to_string()) {
            return Err(VfsError::Busy);
        }

        if let Some(target) = new_path.inode() {
            if Arc::ptr_eq(target, &old) {
                return Ok(());
            }
            if target.is_dir() {
                if !old.is_dir() {
                    return Err(VfsError::IsDirectory);
                }
                ensure_empty_directory(target)?;
            } else if old.is_dir() {
                return Err(VfsError::NotDirectory);
            }
        }
        if old.is_dir() && new_path.parent().is_some_and(|parent| parent.has_ancestor(&old)) {
            return Err(VfsError::InvalidArgument);
        }

        if new_path.inode().is_some() {
            new_parent.unlink_child(new_name)?;
        }
        new_parent.link_child(new_name, old.clone())?;
        old_parent.unlink_child(old_name)?;
        log::debug!("vfs: renamed {} -> {}", old_path, new_path);
        Ok(())
    }

    pub fn rmdir_at(&self, base: &Path, pathname: &str) -> VfsResult<()> {
        let path = self.resolve_path_at(base, pathname, LookupFlags::NOFOLLOW | LookupFlags::NOFOLLOW_NOERROR)?;
        let (parent, name) = parent_and_name(&path)?;
        let dir = path.inode().ok_or(VfsError::NotFound)?;
        if !dir.is_dir() {
            return Err(VfsError::NotDirectory);
        }
        if self.mounts.covers(&path.to_string()) {
            return Err(VfsError::Busy);
        }
        ensure_empty_directory(dir)?;
        parent.unlink_child(name)?;
        Ok(())
    }

    // ========================================================================
    // Mounts
    // ========================================================================

    /// Mount a fresh `fs_type` instance on the directory at `target`
    pub fn mount(&self, target: &str, fs_type: &str) -> VfsResult<()> {
        self.mount_at(&self.root_path(), target, fs_type)
    }

    pub fn mount_at(&self, base: &Path, target: &str, fs_type: &str) -> VfsResult<()> {
        let path = self.resolve_path_at(base, target, LookupFlags::empty())?;
        if !path.inode().is_some_and(|inode| inode.is_dir()) {
            return Err(VfsError::NotDirectory);
        }
        let (root, fs_type) = match fs_type {
            "tmpfs" => (tmpfs::create_root(&self.config)?, "tmpfs"),
            "proc" => (procfs_create_root(self.procfs_source.clone())?, "proc"),
            _ => return Err(VfsError::NoSuchDevice),
        };
        let mount_point = path.to_string();
        self.mounts.add(&mount_point, root, fs_type);
        log::info!("vfs: mounted {} on {}", fs_type, mount_point);
        Ok(())
    }

    // ========================================================================
    // Devices
    // ========================================================================

    pub fn register_device(&self, name: &str, device: InodeRef) -> VfsResult<()> {
        let mut devices = self.devices.write();
        if devices.contains_key(name) {
            return Err(VfsError::Exists);
        }
        log::debug!("vfs: registered device {} rdev={:#x}", name, device.rdev());
        devices.insert(String::from(name), device);
        Ok(())
    }

    pub fn get_device_by_name(&self, name: &str) -> Option<InodeRef> {
        self.devices.read().get(name).cloned()
    }

    pub fn find_device_by_rdev(&self, rdev: DeviceId) -> Option<InodeRef> {
        self.devices
            .read()
            .values()
            .find(|device| device.rdev() == rdev)
            .cloned()
    }

    /// Create `/dev/<name>` for every registered device that lacks one
    pub fn populate_dev(&self) -> VfsResult<()> {
        match self.mkdir("/dev", 0o755) {
            Ok(_) | Err(VfsError::Exists) => {}
            Err(err) => return Err(err),
        }
        let mut devices: Vec<(String, FileMode, DeviceId)> = self
            .devices
            .read()
            .iter()
            .map(|(name, device)| (name.clone(), device.mode(), device.rdev()))
            .collect();
        devices.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let root = self.root_path();
        for (name, mode, rdev) in devices {
            let pathname = format!("/dev/{}", name);
            match self.mknod_at(&root, &pathname, mode, rdev) {
                Ok(_) | Err(VfsError::Exists) => {}
                Err(err) => {
                    log::warn!("vfs: failed to create {}: {}", pathname, err);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Pipes and sockets
    // ========================================================================

    /// Create an anonymous pipe, returning its read and write ends
    pub fn pipe(&self) -> VfsResult<(FileRef, FileRef)> {
        let pipe = fifo_create(self.config.fifo_capacity)?;
        let reader = file::open(&pipe, OpenFlags::RDONLY, FileMode::default())?;
        let writer = file::open(&pipe, OpenFlags::WRONLY, FileMode::default())?;
        Ok((reader, writer))
    }

    pub fn socket(&self) -> VfsResult<InodeRef> {
        unix_socket_create(&self.config)
    }

    /// Create a socket node at `pathname` bound to `socket`
    pub fn bind_socket_at(&self, base: &Path, pathname: &str, socket: &InodeRef) -> VfsResult<()> {
        let node = match self.create_at(base, pathname, FileMode::new(FileMode::S_IFSOCK | 0o777)) {
            Ok(node) => node,
            Err(VfsError::Exists) => return Err(VfsError::AddressInUse),
            Err(err) => return Err(err),
        };
        *node.bound_socket.lock() = Some(socket.clone());
        Ok(())
    }

    /// Connect the socket behind `desc` to the listener bound at `pathname`
    pub fn connect_socket_at(&self, base: &Path, pathname: &str, desc: &FileDescription) -> VfsResult<()> {
        let node = self
            .resolve_path_at(base, pathname, LookupFlags::empty())?
            .into_inode()
            .ok_or(VfsError::NotFound)?;
        if !node.mode().is_socket() {
            return Err(VfsError::ConnectionRefused);
        }
        let listener = node.bound_socket.lock().clone().ok_or(VfsError::ConnectionRefused)?;
        unix_socket_connect(desc, &listener)
    }
}

fn parent_and_name(path: &Path) -> VfsResult<(&InodeRef, &str)> {
    let parent = path
        .parent()
        .and_then(|parent| parent.inode())
        .ok_or(VfsError::NotPermitted)?;
    let name = path.basename().ok_or(VfsError::NotPermitted)?;
    Ok((parent, name))
}

fn create_in_parent(path: &Path, mode: FileMode) -> VfsResult<InodeRef> {
    let (parent, name) = parent_and_name(path)?;
    parent.create_child(name, mode)
}

/// Fail with `NotEmpty` if the directory has any entry
pub fn ensure_empty_directory(dir: &InodeRef) -> VfsResult<()> {
    let desc = file::open(dir, OpenFlags::RDONLY, FileMode::default())?;
    let mut empty = true;
    desc.getdents(&mut |_: &str, _: FileType| {
        empty = false;
        false
    })?;
    if empty { Ok(()) } else { Err(VfsError::NotEmpty) }
}

// ============================================================================
// Global VFS Instance
// ============================================================================

static VFS: Once<Vfs> = Once::new();

/// Install the global VFS. Later calls keep the first instance.
pub fn install(vfs: Vfs) -> &'static Vfs {
    VFS.call_once(|| vfs)
}

/// Get the global VFS, if installed
pub fn vfs() -> Option<&'static Vfs> {
    VFS.get()
}
