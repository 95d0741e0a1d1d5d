//! Per-process file descriptor table

use alloc::vec::Vec;

use spin::Mutex;

use crate::error::{VfsError, VfsResult};
use crate::file::FileRef;

/// Slots `0..open_max`, each empty or sharing an open description
pub struct FdTable {
    entries: Mutex<Vec<Option<FileRef>>>,
}

impl FdTable {
    pub fn new(open_max: usize) -> Self {
        let mut entries = Vec::new();
        entries.resize_with(open_max, || None);
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Install `desc` at `fd`, or at the lowest free slot when `fd` is `None`
    pub fn alloc(&self, fd: Option<usize>, desc: FileRef) -> VfsResult<usize> {
        let mut entries = self.entries.lock();
        let slot = match fd {
            Some(fd) => {
                let entry = entries.get(fd).ok_or(VfsError::BadFileDescriptor)?;
                if entry.is_some() {
                    return Err(VfsError::Exists);
                }
                fd
            }
            None => entries
                .iter()
                .position(Option::is_none)
                .ok_or(VfsError::TooManyOpenFiles)?,
        };
        entries[slot] = Some(desc);
        Ok(slot)
    }

    /// Empty `fd`, returning what it held
    pub fn free(&self, fd: usize) -> VfsResult<FileRef> {
        self.entries
            .lock()
            .get_mut(fd)
            .and_then(Option::take)
            .ok_or(VfsError::BadFileDescriptor)
    }

    pub fn get(&self, fd: usize) -> VfsResult<FileRef> {
        self.entries
            .lock()
            .get(fd)
            .and_then(Option::clone)
            .ok_or(VfsError::BadFileDescriptor)
    }

    pub fn open_count(&self) -> usize {
        self.entries.lock().iter().filter(|e| e.is_some()).count()
    }

    /// Copy for a forked process; both tables share every description
    pub fn clone_table(&self) -> Self {
        Self {
            entries: Mutex::new(self.entries.lock().clone()),
        }
    }

    /// Drop every descriptor, as on process exit
    pub fn close_all(&self) {
        let taken: Vec<FileRef> = self.entries.lock().iter_mut().filter_map(Option::take).collect();
        drop(taken);
    }
}
