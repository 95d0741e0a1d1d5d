//! Open file descriptions
//!
//! A [`FileDescription`] is created by a successful open and shared through
//! [`FileRef`] by every descriptor that duplicates it. The wrappers here only
//! validate and dispatch; backend behaviour lives behind the inode's
//! [`FileOps`](crate::inode::FileOps).

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::{Mutex, MutexGuard, Once};

use crate::block;
use crate::error::{VfsError, VfsResult};
use crate::inode::{DirFiller, InodeRef, trace_op};
use crate::memory::Mapping;
use crate::types::{FileMode, MmapProt, MmapRequest, OpenFlags, PollEvents, SeekWhence};

pub type FileRef = Arc<FileDescription>;

pub struct FileDescription {
    inode: InodeRef,
    offset: Mutex<u64>,
    flags: AtomicU32,
    private: Once<Box<dyn Any + Send + Sync>>,
    opened: bool,
}

/// Open `inode` into a new description.
///
/// The backend's open hook runs against the new description; if it fails the
/// description is dropped without running the close hook.
pub fn open(inode: &InodeRef, flags: OpenFlags, mode: FileMode) -> VfsResult<FileRef> {
    trace_op("open", inode.ino());
    if inode.is_dir() && flags.writable() {
        return Err(VfsError::IsDirectory);
    }
    let mut desc = FileDescription {
        inode: inode.clone(),
        offset: Mutex::new(0),
        flags: AtomicU32::new(flags.bits()),
        private: Once::new(),
        opened: false,
    };
    if let Some(hook) = inode.ops().open {
        hook(&desc, mode)?;
    }
    desc.opened = true;
    Ok(Arc::new(desc))
}

impl FileDescription {
    pub fn inode(&self) -> &InodeRef {
        &self.inode
    }

    pub fn flags(&self) -> OpenFlags {
        OpenFlags::from_bits_retain(self.flags.load(Ordering::Acquire))
    }

    pub fn set_flags(&self, flags: OpenFlags) {
        self.flags.store(flags.bits(), Ordering::Release);
    }

    /// Lock the offset for a read-modify-write
    pub fn lock_offset(&self) -> MutexGuard<'_, u64> {
        self.offset.lock()
    }

    pub fn offset(&self) -> u64 {
        *self.offset.lock()
    }

    /// Attach per-open backend state. Only the first value is kept.
    pub fn set_private(&self, value: impl Any + Send + Sync) {
        self.private.call_once(|| Box::new(value));
    }

    pub fn private<T: Any>(&self) -> Option<&T> {
        self.private.get().and_then(|value| value.downcast_ref::<T>())
    }

    pub fn read(&self, buf: &mut [u8]) -> VfsResult<usize> {
        trace_op("read", self.inode.ino());
        if self.inode.is_dir() {
            return Err(VfsError::IsDirectory);
        }
        let read = self.inode.ops().read.ok_or(VfsError::InvalidArgument)?;
        if !self.flags().readable() {
            return Err(VfsError::BadFileDescriptor);
        }
        read(self, buf)
    }

    /// Read until `buf` is full or end of file
    pub fn read_to_end(&self, buf: &mut [u8]) -> VfsResult<usize> {
        let mut cursor = 0;
        while cursor < buf.len() {
            let nread = self.read(&mut buf[cursor..])?;
            if nread == 0 {
                break;
            }
            cursor += nread;
        }
        Ok(cursor)
    }

    pub fn write(&self, buf: &[u8]) -> VfsResult<usize> {
        trace_op("write", self.inode.ino());
        if self.inode.is_dir() {
            return Err(VfsError::IsDirectory);
        }
        let write = self.inode.ops().write.ok_or(VfsError::InvalidArgument)?;
        if !self.flags().writable() {
            return Err(VfsError::BadFileDescriptor);
        }
        write(self, buf)
    }

    /// Write the whole buffer, stopping early only if the backend makes no progress
    pub fn write_all(&self, buf: &[u8]) -> VfsResult<usize> {
        let mut cursor = 0;
        while cursor < buf.len() {
            let nwritten = self.write(&buf[cursor..])?;
            if nwritten == 0 {
                break;
            }
            cursor += nwritten;
        }
        Ok(cursor)
    }

    pub fn mmap(&self, request: &MmapRequest) -> VfsResult<Mapping> {
        trace_op("mmap", self.inode.ino());
        let mmap = self.inode.ops().mmap.ok_or(VfsError::NoSuchDevice)?;
        let flags = self.flags();
        if !flags.readable() {
            return Err(VfsError::PermissionDenied);
        }
        if request.shared && request.prot.contains(MmapProt::WRITE) && !flags.contains(OpenFlags::RDWR) {
            return Err(VfsError::PermissionDenied);
        }
        mmap(self, request)
    }

    pub fn truncate(&self, length: u64) -> VfsResult<()> {
        trace_op("truncate", self.inode.ino());
        if self.inode.is_dir() {
            return Err(VfsError::IsDirectory);
        }
        let truncate = self.inode.ops().truncate.ok_or(VfsError::ReadOnlyFilesystem)?;
        if !self.flags().writable() {
            return Err(VfsError::BadFileDescriptor);
        }
        truncate(self, length)
    }

    /// Reposition the offset, returning the new one
    pub fn seek(&self, offset: i64, whence: SeekWhence) -> VfsResult<u64> {
        let mode = self.inode.mode();
        if mode.is_fifo() || mode.is_socket() {
            return Err(VfsError::InvalidSeek);
        }
        let end = match whence {
            SeekWhence::End => self.inode.size()?,
            _ => 0,
        };
        let mut current = self.offset.lock();
        let base = match whence {
            SeekWhence::Set => 0,
            SeekWhence::Cur => *current as i64,
            SeekWhence::End => end as i64,
        };
        let new_offset = base
            .checked_add(offset)
            .filter(|pos| *pos >= 0)
            .ok_or(VfsError::InvalidArgument)?;
        *current = new_offset as u64;
        Ok(*current)
    }

    pub fn ioctl(&self, request: u32, arg: &mut [u8]) -> VfsResult<usize> {
        trace_op("ioctl", self.inode.ino());
        let ioctl = self.inode.ops().ioctl.ok_or(VfsError::NotATty)?;
        ioctl(self, request, arg)
    }

    pub fn getdents(&self, filler: &mut DirFiller<'_>) -> VfsResult<()> {
        trace_op("getdents", self.inode.ino());
        let getdents = match self.inode.ops().getdents {
            Some(getdents) if self.inode.is_dir() => getdents,
            _ => return Err(VfsError::NotDirectory),
        };
        getdents(self, filler)
    }

    /// Readiness for `events`; objects without a poll hook are always ready
    pub fn poll(&self, events: PollEvents) -> PollEvents {
        match self.inode.ops().poll {
            Some(poll) => poll(self, events),
            None => events & (PollEvents::IN | PollEvents::OUT),
        }
    }

    /// Wait until `unblock` holds, or fail with `WouldBlock` on a
    /// non-blocking description
    pub fn block(&self, mut unblock: impl FnMut() -> bool) -> VfsResult<()> {
        if self.flags().contains(OpenFlags::NONBLOCK) {
            return if unblock() { Ok(()) } else { Err(VfsError::WouldBlock) };
        }
        block::block(unblock)
    }
}

impl Drop for FileDescription {
    fn drop(&mut self) {
        if !self.opened {
            return;
        }
        trace_op("close", self.inode.ino());
        if let Some(close) = self.inode.ops().close {
            close(self);
        }
    }
}

impl fmt::Debug for FileDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileDescription")
            .field("inode", &self.inode.ino())
            .field("offset", &self.offset())
            .field("flags", &self.flags())
            .finish()
    }
}
