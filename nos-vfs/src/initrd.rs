//! Initial ramdisk unpacking
//!
//! The initrd is a cpio archive in the portable ASCII ("odc") format. Each
//! record is a 76-byte header of fixed-width octal fields, the NUL-terminated
//! name, then the file data. A record named `TRAILER!!!` ends the archive.

use core::fmt;
use core::str;

use static_assertions::const_assert_eq;

use crate::error::{VfsError, VfsResult};
use crate::file;
use crate::types::{DeviceId, FileMode, OpenFlags};
use crate::vfs::Vfs;

pub const MAGIC: &[u8; 6] = b"070707";
pub const TRAILER: &str = "TRAILER!!!";

/// Field widths in header order: magic, dev, ino, mode, uid, gid, nlink,
/// rdev, mtime, namesize, filesize
const FIELD_WIDTHS: [usize; 11] = [6, 6, 6, 6, 6, 6, 6, 6, 11, 6, 11];

const fn header_len() -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < FIELD_WIDTHS.len() {
        total += FIELD_WIDTHS[i];
        i += 1;
    }
    total
}

pub const HEADER_LEN: usize = header_len();
const_assert_eq!(HEADER_LEN, 76);

const fn field_offset(index: usize) -> usize {
    let mut offset = 0;
    let mut i = 0;
    while i < index {
        offset += FIELD_WIDTHS[i];
        i += 1;
    }
    offset
}

const MODE: usize = 3;
const UID: usize = 4;
const GID: usize = 5;
const RDEV: usize = 7;
const MTIME: usize = 8;
const NAMESIZE: usize = 9;
const FILESIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpioError {
    /// Header at this offset does not start with the odc magic
    BadMagic { offset: usize },
    /// A header field is not an octal number
    BadField { offset: usize, field: usize },
    /// The archive ends inside a record
    Truncated { offset: usize },
    /// Entry name is empty, unterminated or not UTF-8
    BadName { offset: usize },
}

impl fmt::Display for CpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpioError::BadMagic { offset } => write!(f, "bad cpio magic at offset {}", offset),
            CpioError::BadField { offset, field } => {
                write!(f, "malformed header field {} at offset {}", field, offset)
            }
            CpioError::Truncated { offset } => write!(f, "archive truncated in record at offset {}", offset),
            CpioError::BadName { offset } => write!(f, "malformed entry name at offset {}", offset),
        }
    }
}

impl From<CpioError> for VfsError {
    fn from(err: CpioError) -> Self {
        match err {
            CpioError::Truncated { .. } => VfsError::IoError,
            _ => VfsError::InvalidArgument,
        }
    }
}

/// One archive member
#[derive(Debug, Clone, Copy)]
pub struct CpioEntry<'a> {
    pub name: &'a str,
    pub mode: FileMode,
    pub uid: u32,
    pub gid: u32,
    pub rdev: DeviceId,
    pub mtime: u64,
    pub data: &'a [u8],
}

/// Iterator over the members of an odc archive, stopping at the trailer
pub struct CpioReader<'a> {
    archive: &'a [u8],
    cursor: usize,
    done: bool,
}

impl<'a> CpioReader<'a> {
    pub fn new(archive: &'a [u8]) -> Self {
        Self {
            archive,
            cursor: 0,
            done: false,
        }
    }

    fn field(&self, header: &[u8], index: usize) -> Result<u64, CpioError> {
        let start = field_offset(index);
        parse_octal(&header[start..start + FIELD_WIDTHS[index]]).ok_or(CpioError::BadField {
            offset: self.cursor,
            field: index,
        })
    }

    fn next_entry(&mut self) -> Result<Option<CpioEntry<'a>>, CpioError> {
        let offset = self.cursor;
        let archive = self.archive;
        let header = archive
            .get(offset..offset + HEADER_LEN)
            .ok_or(CpioError::Truncated { offset })?;
        if &header[..MAGIC.len()] != MAGIC {
            return Err(CpioError::BadMagic { offset });
        }

        let name_size = self.field(header, NAMESIZE)? as usize;
        let file_size = self.field(header, FILESIZE)? as usize;
        let name_start = offset + HEADER_LEN;
        let data_start = name_start + name_size;
        let raw_name = archive
            .get(name_start..data_start)
            .ok_or(CpioError::Truncated { offset })?;
        let name = match raw_name.split_last() {
            Some((0, name)) => str::from_utf8(name).map_err(|_| CpioError::BadName { offset })?,
            _ => return Err(CpioError::BadName { offset }),
        };
        if name == TRAILER {
            return Ok(None);
        }

        let data = archive
            .get(data_start..data_start + file_size)
            .ok_or(CpioError::Truncated { offset })?;
        let entry = CpioEntry {
            name,
            mode: FileMode::new(self.field(header, MODE)? as u32),
            uid: self.field(header, UID)? as u32,
            gid: self.field(header, GID)? as u32,
            rdev: self.field(header, RDEV)?,
            mtime: self.field(header, MTIME)?,
            data,
        };
        self.cursor = data_start + file_size;
        Ok(Some(entry))
    }
}

impl<'a> Iterator for CpioReader<'a> {
    type Item = Result<CpioEntry<'a>, CpioError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.next_entry();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result.transpose()
    }
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    field.iter().try_fold(0u64, |value, &digit| match digit {
        b'0'..=b'7' => value.checked_mul(8)?.checked_add(u64::from(digit - b'0')),
        _ => None,
    })
}

/// Archive names are relative, optionally prefixed with `./`
fn absolute_name(name: &str) -> Option<alloc::string::String> {
    let trimmed = name.trim_start_matches("./").trim_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return None;
    }
    Some(alloc::format!("/{}", trimmed))
}

/// Create every member of `archive` under the VFS root.
///
/// Returns the number of entries created. Directories that already exist are
/// reused.
pub fn unpack(vfs: &Vfs, archive: &[u8]) -> VfsResult<usize> {
    let mut created = 0;
    for entry in CpioReader::new(archive) {
        let entry = entry?;
        if !entry.mode.has_kind() {
            log::error!("initrd: {} has invalid mode {:#o}", entry.name, entry.mode.0);
            return Err(VfsError::InvalidArgument);
        }
        let Some(pathname) = absolute_name(entry.name) else {
            continue;
        };

        let inode = match vfs.create(&pathname, entry.mode) {
            Ok(inode) => inode,
            Err(VfsError::Exists) if entry.mode.is_dir() => continue,
            Err(err) => {
                log::error!("initrd: failed to create {}: {}", pathname, err);
                return Err(err);
            }
        };
        inode.set_rdev(entry.rdev);

        if !entry.data.is_empty() {
            let desc = file::open(&inode, OpenFlags::WRONLY, FileMode::default())?;
            let written = desc.write_all(entry.data)?;
            if written != entry.data.len() {
                log::error!("initrd: short write to {}", pathname);
                return Err(VfsError::NoSpace);
            }
        }
        created += 1;
    }
    Ok(created)
}

/// Unpack the boot archive into the root filesystem.
///
/// # Panics
///
/// If the archive is not an odc cpio archive.
pub fn populate_root_fs(vfs: &Vfs, archive: &[u8]) -> VfsResult<usize> {
    if let Some(Err(err @ CpioError::BadMagic { .. })) = CpioReader::new(archive).find(|e| e.is_err()) {
        panic!("initrd: {}", err);
    }
    let count = unpack(vfs, archive)?;
    log::info!("initrd: unpacked {} entries ({} bytes)", count, archive.len());
    Ok(count)
}
