//! Directory entry lists shared by directory backends

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{VfsError, VfsResult};
use crate::file::FileDescription;
use crate::inode::{DirFiller, InodeRef};
use crate::types::FileType;

/// Ordered name -> inode mapping. Enumeration follows insertion order.
///
/// Appending an entry counts as a link to the child; removing it drops one.
#[derive(Default)]
pub struct DentryList {
    entries: Vec<(String, InodeRef)>,
}

impl DentryList {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<InodeRef> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, inode)| inode.clone())
    }

    pub fn append(&mut self, name: &str, child: InodeRef) -> VfsResult<()> {
        if self.find(name).is_some() {
            return Err(VfsError::Exists);
        }
        self.entries
            .try_reserve(1)
            .map_err(|_| VfsError::OutOfMemory)?;
        child.inc_nlink();
        self.entries.push((String::from(name), child));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> VfsResult<InodeRef> {
        let index = self
            .entries
            .iter()
            .position(|(entry, _)| entry == name)
            .ok_or(VfsError::NotFound)?;
        let (_, child) = self.entries.remove(index);
        child.dec_nlink();
        Ok(child)
    }

    /// Feed entries to `filler` starting at the description's offset.
    ///
    /// The offset counts entries and advances past every entry accepted.
    pub fn getdents(&self, desc: &FileDescription, filler: &mut DirFiller<'_>) -> VfsResult<()> {
        let mut offset = desc.lock_offset();
        for (name, inode) in self.entries.iter().skip(*offset as usize) {
            let kind = inode.file_type().unwrap_or(FileType::Regular);
            if !filler(name, kind) {
                break;
            }
            *offset += 1;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InodeRef)> {
        self.entries.iter().map(|(name, inode)| (name.as_str(), inode))
    }
}
