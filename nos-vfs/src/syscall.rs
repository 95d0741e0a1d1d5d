//! File system system calls
//!
//! [`FsContext`] is the file system state of one process: its descriptor
//! table and working directory. The `sys_*` methods take arguments already
//! copied in from user space and return [`VfsResult`]; the dispatcher turns
//! the result into the syscall return value with
//! [`to_neg_errno`](crate::error::to_neg_errno).

use alloc::string::ToString;
use alloc::sync::Arc;
use core::mem::size_of;

use spin::Mutex;
use static_assertions::const_assert_eq;

use crate::error::{VfsError, VfsResult};
use crate::fd_table::FdTable;
use crate::file::{self, FileRef};
use crate::path::Path;
use crate::types::{DeviceId, FileMode, FileType, LookupFlags, OpenFlags, SeekWhence, Stat};
use crate::unix_socket::{unix_socket_accept, unix_socket_set_backlog};
use crate::vfs::Vfs;

/// `fcntl` commands
pub mod fcntl {
    pub const F_DUPFD: i32 = 0;
    pub const F_GETFL: i32 = 3;
    pub const F_SETFL: i32 = 4;
}

/// `lseek` whence values
pub mod whence {
    pub const SEEK_SET: i32 = 0;
    pub const SEEK_CUR: i32 = 1;
    pub const SEEK_END: i32 = 2;
}

/// Fixed part of a directory entry record; the name and its NUL follow
#[repr(C)]
struct DirentHeader {
    reclen: u16,
    kind: u8,
    namlen: u8,
}

pub const DIRENT_HEADER_LEN: usize = size_of::<DirentHeader>();
const_assert_eq!(DIRENT_HEADER_LEN, 4);

/// Pack directory records into `out` until one does not fit
struct DirentWriter<'a> {
    out: &'a mut [u8],
    written: usize,
    overflow: bool,
}

impl DirentWriter<'_> {
    fn push(&mut self, name: &str, kind: FileType) -> bool {
        let reclen = DIRENT_HEADER_LEN + name.len() + 1;
        let (Ok(reclen16), Ok(namlen)) = (u16::try_from(reclen), u8::try_from(name.len())) else {
            self.overflow = true;
            return false;
        };
        let Some(record) = self.out.get_mut(self.written..self.written + reclen) else {
            self.overflow = true;
            return false;
        };
        record[0..2].copy_from_slice(&reclen16.to_le_bytes());
        record[2] = kind.dirent_type();
        record[3] = namlen;
        record[DIRENT_HEADER_LEN..reclen - 1].copy_from_slice(name.as_bytes());
        record[reclen - 1] = 0;
        self.written += reclen;
        true
    }
}

pub struct FsContext {
    vfs: Arc<Vfs>,
    fds: FdTable,
    cwd: Mutex<Path>,
}

impl FsContext {
    /// Context with an empty descriptor table, working in `/`
    pub fn new(vfs: Arc<Vfs>) -> Self {
        let fds = FdTable::new(vfs.config().open_max);
        let cwd = Mutex::new(vfs.root_path());
        Self { vfs, fds, cwd }
    }

    /// Context for a forked child: same descriptions, same directory
    pub fn fork(&self) -> Self {
        Self {
            vfs: self.vfs.clone(),
            fds: self.fds.clone_table(),
            cwd: Mutex::new(self.cwd()),
        }
    }

    pub fn vfs(&self) -> &Arc<Vfs> {
        &self.vfs
    }

    pub fn fds(&self) -> &FdTable {
        &self.fds
    }

    pub fn cwd(&self) -> Path {
        self.cwd.lock().clone()
    }

    fn desc(&self, fd: i32) -> VfsResult<FileRef> {
        let fd = usize::try_from(fd).map_err(|_| VfsError::BadFileDescriptor)?;
        self.fds.get(fd)
    }

    fn install(&self, desc: FileRef) -> VfsResult<usize> {
        self.fds.alloc(None, desc)
    }

    // ------------------------------------------------------------------
    // Descriptors
    // ------------------------------------------------------------------

    pub fn sys_open(&self, pathname: &str, flags: OpenFlags, mode: u32) -> VfsResult<usize> {
        let mode = FileMode::new((mode & 0o777) | FileMode::S_IFREG);
        let desc = self.vfs.open_at(&self.cwd(), pathname, flags, mode)?;
        self.install(desc)
    }

    pub fn sys_close(&self, fd: i32) -> VfsResult<usize> {
        let fd = usize::try_from(fd).map_err(|_| VfsError::BadFileDescriptor)?;
        self.fds.free(fd)?;
        Ok(0)
    }

    pub fn sys_read(&self, fd: i32, buf: &mut [u8]) -> VfsResult<usize> {
        self.desc(fd)?.read(buf)
    }

    pub fn sys_write(&self, fd: i32, buf: &[u8]) -> VfsResult<usize> {
        self.desc(fd)?.write(buf)
    }

    pub fn sys_ftruncate(&self, fd: i32, length: i64) -> VfsResult<usize> {
        let length = u64::try_from(length).map_err(|_| VfsError::InvalidArgument)?;
        self.desc(fd)?.truncate(length)?;
        Ok(0)
    }

    pub fn sys_lseek(&self, fd: i32, offset: i64, whence: i32) -> VfsResult<usize> {
        let whence = match whence {
            whence::SEEK_SET => SeekWhence::Set,
            whence::SEEK_CUR => SeekWhence::Cur,
            whence::SEEK_END => SeekWhence::End,
            _ => return Err(VfsError::InvalidArgument),
        };
        let offset = self.desc(fd)?.seek(offset, whence)?;
        usize::try_from(offset).map_err(|_| VfsError::InvalidArgument)
    }

    pub fn sys_ioctl(&self, fd: i32, request: u32, arg: &mut [u8]) -> VfsResult<usize> {
        self.desc(fd)?.ioctl(request, arg)
    }

    /// Fill `buf` with directory records; fails if not even one fits
    pub fn sys_getdents(&self, fd: i32, buf: &mut [u8]) -> VfsResult<usize> {
        let desc = self.desc(fd)?;
        let mut writer = DirentWriter {
            out: buf,
            written: 0,
            overflow: false,
        };
        desc.getdents(&mut |name: &str, kind: FileType| writer.push(name, kind))?;
        if writer.overflow && writer.written == 0 {
            return Err(VfsError::InvalidArgument);
        }
        Ok(writer.written)
    }

    pub fn sys_fcntl(&self, fd: i32, cmd: i32, arg: usize) -> VfsResult<usize> {
        let desc = self.desc(fd)?;
        match cmd {
            fcntl::F_DUPFD => self.install(desc),
            fcntl::F_GETFL => Ok(desc.flags().bits() as usize),
            fcntl::F_SETFL => {
                let flags = u32::try_from(arg).map_err(|_| VfsError::InvalidArgument)?;
                desc.set_flags(OpenFlags::from_bits_retain(flags));
                Ok(0)
            }
            _ => Err(VfsError::InvalidArgument),
        }
    }

    pub fn sys_dup2(&self, oldfd: i32, newfd: i32) -> VfsResult<usize> {
        let desc = self.desc(oldfd)?;
        let newfd = usize::try_from(newfd).map_err(|_| VfsError::BadFileDescriptor)?;
        if oldfd as usize == newfd {
            return Ok(newfd);
        }
        if self.fds.get(newfd).is_ok() {
            self.fds.free(newfd)?;
        }
        self.fds.alloc(Some(newfd), desc)
    }

    /// Returns the read and write descriptors
    pub fn sys_pipe(&self) -> VfsResult<[usize; 2]> {
        let (reader, writer) = self.vfs.pipe()?;
        let reader_fd = self.install(reader)?;
        match self.install(writer) {
            Ok(writer_fd) => Ok([reader_fd, writer_fd]),
            Err(err) => {
                let _ = self.fds.free(reader_fd);
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    pub fn sys_stat(&self, pathname: &str) -> VfsResult<Stat> {
        self.vfs.stat_at(&self.cwd(), pathname, LookupFlags::empty())
    }

    pub fn sys_lstat(&self, pathname: &str) -> VfsResult<Stat> {
        self.vfs
            .stat_at(&self.cwd(), pathname, LookupFlags::NOFOLLOW | LookupFlags::NOFOLLOW_NOERROR)
    }

    pub fn sys_fstat(&self, fd: i32) -> VfsResult<Stat> {
        self.desc(fd)?.inode().stat()
    }

    pub fn sys_readlink(&self, pathname: &str, buf: &mut [u8]) -> VfsResult<usize> {
        self.vfs.readlink_at(&self.cwd(), pathname, buf)
    }

    pub fn sys_symlink(&self, target: &str, linkpath: &str) -> VfsResult<usize> {
        self.vfs.symlink_at(&self.cwd(), target, linkpath)?;
        Ok(0)
    }

    pub fn sys_mkdir(&self, pathname: &str, mode: u32) -> VfsResult<usize> {
        self.vfs.mkdir_at(&self.cwd(), pathname, mode)?;
        Ok(0)
    }

    pub fn sys_mknod(&self, pathname: &str, mode: u32, dev: DeviceId) -> VfsResult<usize> {
        self.vfs.mknod_at(&self.cwd(), pathname, FileMode::new(mode), dev)?;
        Ok(0)
    }

    pub fn sys_mount(&self, target: &str, fs_type: &str) -> VfsResult<usize> {
        self.vfs.mount_at(&self.cwd(), target, fs_type)?;
        Ok(0)
    }

    pub fn sys_link(&self, oldpath: &str, newpath: &str) -> VfsResult<usize> {
        self.vfs.link_at(&self.cwd(), oldpath, newpath)?;
        Ok(0)
    }

    pub fn sys_unlink(&self, pathname: &str) -> VfsResult<usize> {
        self.vfs.unlink_at(&self.cwd(), pathname)?;
        Ok(0)
    }

    pub fn sys_rename(&self, oldpath: &str, newpath: &str) -> VfsResult<usize> {
        self.vfs.rename_at(&self.cwd(), oldpath, newpath)?;
        Ok(0)
    }

    pub fn sys_rmdir(&self, pathname: &str) -> VfsResult<usize> {
        self.vfs.rmdir_at(&self.cwd(), pathname)?;
        Ok(0)
    }

    pub fn sys_chdir(&self, pathname: &str) -> VfsResult<usize> {
        let path = self.vfs.resolve_path_at(&self.cwd(), pathname, LookupFlags::empty())?;
        if !path.inode().is_some_and(|inode| inode.is_dir()) {
            return Err(VfsError::NotDirectory);
        }
        *self.cwd.lock() = path;
        Ok(0)
    }

    /// Copy the NUL-terminated working directory into `buf`, returning the
    /// bytes written
    pub fn sys_getcwd(&self, buf: &mut [u8]) -> VfsResult<usize> {
        if buf.is_empty() {
            return Err(VfsError::InvalidArgument);
        }
        let cwd = self.cwd().to_string();
        let len = cwd.len();
        if buf.len() < len + 1 {
            return Err(VfsError::OutOfRange);
        }
        buf[..len].copy_from_slice(cwd.as_bytes());
        buf[len] = 0;
        Ok(len + 1)
    }

    // ------------------------------------------------------------------
    // Unix-domain sockets
    // ------------------------------------------------------------------

    pub fn sys_socket(&self) -> VfsResult<usize> {
        let socket = self.vfs.socket()?;
        let desc = file::open(&socket, OpenFlags::RDWR, FileMode::default())?;
        self.install(desc)
    }

    fn socket_desc(&self, fd: i32) -> VfsResult<FileRef> {
        let desc = self.desc(fd)?;
        if !desc.inode().mode().is_socket() {
            return Err(VfsError::NotSupported);
        }
        Ok(desc)
    }

    pub fn sys_bind(&self, fd: i32, pathname: &str) -> VfsResult<usize> {
        let desc = self.socket_desc(fd)?;
        self.vfs.bind_socket_at(&self.cwd(), pathname, desc.inode())?;
        Ok(0)
    }

    pub fn sys_listen(&self, fd: i32, backlog: usize) -> VfsResult<usize> {
        unix_socket_set_backlog(self.socket_desc(fd)?.inode(), backlog)?;
        Ok(0)
    }

    /// Wait for a connection and return a descriptor for the server side
    pub fn sys_accept(&self, fd: i32) -> VfsResult<usize> {
        let listener = self.socket_desc(fd)?;
        let connector = unix_socket_accept(&listener)?;
        let desc = file::open(&connector, OpenFlags::RDWR, FileMode::default())?;
        self.install(desc)
    }

    pub fn sys_connect(&self, fd: i32, pathname: &str) -> VfsResult<usize> {
        let desc = self.socket_desc(fd)?;
        self.vfs.connect_socket_at(&self.cwd(), pathname, &desc)?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VfsConfig;
    use crate::error::{errno, to_neg_errno};

    fn context() -> FsContext {
        FsContext::new(Arc::new(Vfs::new(VfsConfig::default()).unwrap()))
    }

    #[test]
    fn test_open_write_read_close() {
        let ctx = context();
        let fd = ctx.sys_open("/f", OpenFlags::RDWR | OpenFlags::CREAT, 0o644).unwrap() as i32;
        assert_eq!(ctx.sys_write(fd, b"hello").unwrap(), 5);
        assert_eq!(ctx.sys_lseek(fd, 0, whence::SEEK_SET).unwrap(), 0);
        let mut buf = [0u8; 8];
        assert_eq!(ctx.sys_read(fd, &mut buf).unwrap(), 5);
        assert_eq!(ctx.sys_fstat(fd).unwrap().mode.permissions(), 0o644);
        ctx.sys_close(fd).unwrap();
        assert_eq!(to_neg_errno(ctx.sys_read(fd, &mut buf)), -(errno::EBADF as isize));
        assert_eq!(ctx.sys_close(-1).err(), Some(VfsError::BadFileDescriptor));
    }

    #[test]
    fn test_getdents_records() {
        let ctx = context();
        ctx.sys_mkdir("/d", 0o755).unwrap();
        ctx.sys_mkdir("/d/sub", 0o755).unwrap();
        ctx.sys_open("/d/file", OpenFlags::WRONLY | OpenFlags::CREAT, 0o600).unwrap();
        let fd = ctx.sys_open("/d", OpenFlags::RDONLY, 0).unwrap() as i32;

        let mut tiny = [0u8; 4];
        assert_eq!(ctx.sys_getdents(fd, &mut tiny).err(), Some(VfsError::InvalidArgument));

        let mut buf = [0u8; 64];
        let n = ctx.sys_getdents(fd, &mut buf).unwrap();
        assert_eq!(n, (4 + 3 + 1) + (4 + 4 + 1));
        assert_eq!(u16::from_le_bytes([buf[0], buf[1]]), 8);
        assert_eq!(buf[2], FileType::Directory.dirent_type());
        assert_eq!(buf[3], 3);
        assert_eq!(&buf[4..8], b"sub\0");
        assert_eq!(buf[10], FileType::Regular.dirent_type());
        assert_eq!(ctx.sys_getdents(fd, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_fcntl_and_dup2() {
        let ctx = context();
        let fd = ctx.sys_open("/f", OpenFlags::WRONLY | OpenFlags::CREAT, 0o644).unwrap() as i32;
        let dup = ctx.sys_fcntl(fd, fcntl::F_DUPFD, 0).unwrap();
        assert_eq!(dup, 1);
        let flags = ctx.sys_fcntl(fd, fcntl::F_GETFL, 0).unwrap() as u32;
        assert!(OpenFlags::from_bits_retain(flags).contains(OpenFlags::WRONLY));
        ctx.sys_fcntl(fd, fcntl::F_SETFL, (OpenFlags::WRONLY | OpenFlags::APPEND).bits() as usize).unwrap();
        assert!(ctx.desc(dup as i32).unwrap().flags().contains(OpenFlags::APPEND));
        assert_eq!(ctx.sys_fcntl(fd, 99, 0).err(), Some(VfsError::InvalidArgument));

        assert_eq!(ctx.sys_dup2(fd, fd).unwrap(), fd as usize);
        let other = ctx.sys_open("/g", OpenFlags::WRONLY | OpenFlags::CREAT, 0o644).unwrap() as i32;
        assert_eq!(ctx.sys_dup2(fd, other).unwrap(), other as usize);
        assert!(Arc::ptr_eq(&ctx.desc(other).unwrap(), &ctx.desc(fd).unwrap()));
    }

    #[test]
    fn test_pipe_and_cwd() {
        let ctx = context();
        let [r, w] = ctx.sys_pipe().unwrap();
        ctx.sys_write(w as i32, b"abc").unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(ctx.sys_read(r as i32, &mut buf).unwrap(), 3);

        ctx.sys_mkdir("/home", 0o755).unwrap();
        ctx.sys_chdir("/home").unwrap();
        ctx.sys_mkdir("user", 0o700).unwrap();
        ctx.sys_chdir("user").unwrap();
        let mut cwd = [0u8; 16];
        assert_eq!(ctx.sys_getcwd(&mut cwd).unwrap(), 11);
        assert_eq!(&cwd[..11], b"/home/user\0");
        assert_eq!(ctx.sys_getcwd(&mut [0u8; 10]).err(), Some(VfsError::OutOfRange));
        assert_eq!(ctx.sys_chdir("/home/missing").err(), Some(VfsError::NotFound));

        ctx.sys_open("/home/f", OpenFlags::WRONLY | OpenFlags::CREAT, 0o644).unwrap();
        assert_eq!(ctx.sys_chdir("../f").err(), Some(VfsError::NotDirectory));
        assert!(ctx.sys_stat("../f").unwrap().mode.is_regular());
    }

    #[test]
    fn test_mknod_and_mount() {
        let ctx = context();
        assert_eq!(
            ctx.sys_mknod("/bad", FileMode::S_IFDIR | 0o755, 0).err(),
            Some(VfsError::InvalidArgument)
        );
        ctx.sys_mknod("/fifo", FileMode::S_IFIFO | 0o600, 0).unwrap();
        assert!(ctx.sys_lstat("/fifo").unwrap().mode.is_fifo());

        ctx.sys_mkdir("/proc", 0o555).unwrap();
        ctx.sys_mount("/proc", "proc").unwrap();
        assert!(ctx.sys_stat("/proc/uptime").unwrap().mode.is_regular());
        assert_eq!(ctx.sys_mount("/proc", "sysfs").err(), Some(VfsError::NoSuchDevice));
    }
}
