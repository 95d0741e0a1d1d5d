//! VFS error types
//!
//! Every VFS operation reports failure through [`VfsError`]. The syscall
//! layer converts it to the negative errno convention with [`to_neg_errno`].

use core::fmt;

/// POSIX errno values used by the VFS
pub mod errno {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const EINTR: i32 = 4;
    pub const EIO: i32 = 5;
    pub const EBADF: i32 = 9;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EACCES: i32 = 13;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const ENODEV: i32 = 19;
    pub const ENOTDIR: i32 = 20;
    pub const EISDIR: i32 = 21;
    pub const EINVAL: i32 = 22;
    pub const EMFILE: i32 = 24;
    pub const ENOTTY: i32 = 25;
    pub const ENOSPC: i32 = 28;
    pub const ESPIPE: i32 = 29;
    pub const EROFS: i32 = 30;
    pub const EPIPE: i32 = 32;
    pub const ERANGE: i32 = 34;
    pub const ENAMETOOLONG: i32 = 36;
    pub const ENOTEMPTY: i32 = 39;
    pub const ELOOP: i32 = 40;
    pub const ENOTSUP: i32 = 95;
    pub const EADDRINUSE: i32 = 98;
    pub const ECONNREFUSED: i32 = 111;
}

/// VFS error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    NotPermitted,          // EPERM
    NotFound,              // ENOENT
    Interrupted,           // EINTR
    IoError,               // EIO
    BadFileDescriptor,     // EBADF
    WouldBlock,            // EAGAIN
    OutOfMemory,           // ENOMEM
    PermissionDenied,      // EACCES
    Busy,                  // EBUSY
    Exists,                // EEXIST
    NoSuchDevice,          // ENODEV
    NotDirectory,          // ENOTDIR
    IsDirectory,           // EISDIR
    InvalidArgument,       // EINVAL
    TooManyOpenFiles,      // EMFILE
    NotATty,               // ENOTTY
    NoSpace,               // ENOSPC
    InvalidSeek,           // ESPIPE
    ReadOnlyFilesystem,    // EROFS
    BrokenPipe,            // EPIPE
    OutOfRange,            // ERANGE
    NameTooLong,           // ENAMETOOLONG
    NotEmpty,              // ENOTEMPTY
    TooManySymlinks,       // ELOOP
    NotSupported,          // ENOTSUP
    AddressInUse,          // EADDRINUSE
    ConnectionRefused,     // ECONNREFUSED
}

pub type VfsResult<T> = Result<T, VfsError>;

impl VfsError {
    /// Positive POSIX errno for this error
    pub const fn errno(self) -> i32 {
        use errno::*;
        match self {
            VfsError::NotPermitted => EPERM,
            VfsError::NotFound => ENOENT,
            VfsError::Interrupted => EINTR,
            VfsError::IoError => EIO,
            VfsError::BadFileDescriptor => EBADF,
            VfsError::WouldBlock => EAGAIN,
            VfsError::OutOfMemory => ENOMEM,
            VfsError::PermissionDenied => EACCES,
            VfsError::Busy => EBUSY,
            VfsError::Exists => EEXIST,
            VfsError::NoSuchDevice => ENODEV,
            VfsError::NotDirectory => ENOTDIR,
            VfsError::IsDirectory => EISDIR,
            VfsError::InvalidArgument => EINVAL,
            VfsError::TooManyOpenFiles => EMFILE,
            VfsError::NotATty => ENOTTY,
            VfsError::NoSpace => ENOSPC,
            VfsError::InvalidSeek => ESPIPE,
            VfsError::ReadOnlyFilesystem => EROFS,
            VfsError::BrokenPipe => EPIPE,
            VfsError::OutOfRange => ERANGE,
            VfsError::NameTooLong => ENAMETOOLONG,
            VfsError::NotEmpty => ENOTEMPTY,
            VfsError::TooManySymlinks => ELOOP,
            VfsError::NotSupported => ENOTSUP,
            VfsError::AddressInUse => EADDRINUSE,
            VfsError::ConnectionRefused => ECONNREFUSED,
        }
    }

    /// Map a positive errno back to an error, if it is one the VFS produces
    pub const fn from_errno(errno: i32) -> Option<Self> {
        use errno::*;
        Some(match errno {
            EPERM => VfsError::NotPermitted,
            ENOENT => VfsError::NotFound,
            EINTR => VfsError::Interrupted,
            EIO => VfsError::IoError,
            EBADF => VfsError::BadFileDescriptor,
            EAGAIN => VfsError::WouldBlock,
            ENOMEM => VfsError::OutOfMemory,
            EACCES => VfsError::PermissionDenied,
            EBUSY => VfsError::Busy,
            EEXIST => VfsError::Exists,
            ENODEV => VfsError::NoSuchDevice,
            ENOTDIR => VfsError::NotDirectory,
            EISDIR => VfsError::IsDirectory,
            EINVAL => VfsError::InvalidArgument,
            EMFILE => VfsError::TooManyOpenFiles,
            ENOTTY => VfsError::NotATty,
            ENOSPC => VfsError::NoSpace,
            ESPIPE => VfsError::InvalidSeek,
            EROFS => VfsError::ReadOnlyFilesystem,
            EPIPE => VfsError::BrokenPipe,
            ERANGE => VfsError::OutOfRange,
            ENAMETOOLONG => VfsError::NameTooLong,
            ENOTEMPTY => VfsError::NotEmpty,
            ELOOP => VfsError::TooManySymlinks,
            ENOTSUP => VfsError::NotSupported,
            EADDRINUSE => VfsError::AddressInUse,
            ECONNREFUSED => VfsError::ConnectionRefused,
            _ => return None,
        })
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VfsError::NotPermitted => "Operation not permitted",
            VfsError::NotFound => "No such file or directory",
            VfsError::Interrupted => "Interrupted system call",
            VfsError::IoError => "I/O error",
            VfsError::BadFileDescriptor => "Bad file descriptor",
            VfsError::WouldBlock => "Resource temporarily unavailable",
            VfsError::OutOfMemory => "Out of memory",
            VfsError::PermissionDenied => "Permission denied",
            VfsError::Busy => "Device or resource busy",
            VfsError::Exists => "File exists",
            VfsError::NoSuchDevice => "No such device",
            VfsError::NotDirectory => "Not a directory",
            VfsError::IsDirectory => "Is a directory",
            VfsError::InvalidArgument => "Invalid argument",
            VfsError::TooManyOpenFiles => "Too many open files",
            VfsError::NotATty => "Inappropriate ioctl for device",
            VfsError::NoSpace => "No space left on device",
            VfsError::InvalidSeek => "Illegal seek",
            VfsError::ReadOnlyFilesystem => "Read-only file system",
            VfsError::BrokenPipe => "Broken pipe",
            VfsError::OutOfRange => "Numerical result out of range",
            VfsError::NameTooLong => "File name too long",
            VfsError::NotEmpty => "Directory not empty",
            VfsError::TooManySymlinks => "Too many levels of symbolic links",
            VfsError::NotSupported => "Operation not supported",
            VfsError::AddressInUse => "Address already in use",
            VfsError::ConnectionRefused => "Connection refused",
        };
        write!(f, "{} (errno {})", msg, self.errno())
    }
}

/// Convert a VFS result into the syscall return convention
///
/// Success returns the value, failure returns the negated errno.
#[inline]
pub fn to_neg_errno(result: VfsResult<usize>) -> isize {
    match result {
        Ok(value) => value as isize,
        Err(error) => -(error.errno() as isize),
    }
}
