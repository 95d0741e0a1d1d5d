//! File types, modes and flags for VFS

use bitflags::bitflags;

/// File type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Regular,
    Directory,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Symlink,
}

impl FileType {
    /// Directory entry type tag (`DT_*`) reported by getdents
    pub const fn dirent_type(self) -> u8 {
        match self {
            FileType::Fifo => 1,
            FileType::CharDevice => 2,
            FileType::Directory => 4,
            FileType::BlockDevice => 6,
            FileType::Regular => 8,
            FileType::Symlink => 10,
            FileType::Socket => 12,
        }
    }

    pub const fn mode_bits(self) -> u32 {
        match self {
            FileType::Regular => FileMode::S_IFREG,
            FileType::Directory => FileMode::S_IFDIR,
            FileType::CharDevice => FileMode::S_IFCHR,
            FileType::BlockDevice => FileMode::S_IFBLK,
            FileType::Fifo => FileMode::S_IFIFO,
            FileType::Socket => FileMode::S_IFSOCK,
            FileType::Symlink => FileMode::S_IFLNK,
        }
    }
}

/// File mode/permissions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileMode(pub u32);

impl FileMode {
    pub const S_IFMT: u32   = 0o170000;  // Type mask
    pub const S_IFREG: u32  = 0o100000;  // Regular file
    pub const S_IFDIR: u32  = 0o040000;  // Directory
    pub const S_IFCHR: u32  = 0o020000;  // Character device
    pub const S_IFBLK: u32  = 0o060000;  // Block device
    pub const S_IFIFO: u32  = 0o010000;  // FIFO
    pub const S_IFSOCK: u32 = 0o140000;  // Socket
    pub const S_IFLNK: u32  = 0o120000;  // Symbolic link

    pub const S_ISUID: u32  = 0o4000;   // Set UID
    pub const S_ISGID: u32  = 0o2000;   // Set GID
    pub const S_ISVTX: u32  = 0o1000;   // Sticky bit

    pub const fn new(mode: u32) -> Self {
        Self(mode)
    }

    /// Mode of the given kind with permission bits
    pub const fn of(kind: FileType, perm: u32) -> Self {
        Self(kind.mode_bits() | (perm & 0o7777))
    }

    /// Object kind, `None` when the type bits do not name a known kind
    pub const fn file_type(&self) -> Option<FileType> {
        match self.0 & Self::S_IFMT {
            Self::S_IFREG => Some(FileType::Regular),
            Self::S_IFDIR => Some(FileType::Directory),
            Self::S_IFCHR => Some(FileType::CharDevice),
            Self::S_IFBLK => Some(FileType::BlockDevice),
            Self::S_IFIFO => Some(FileType::Fifo),
            Self::S_IFSOCK => Some(FileType::Socket),
            Self::S_IFLNK => Some(FileType::Symlink),
            _ => None,
        }
    }

    pub const fn has_kind(&self) -> bool {
        self.file_type().is_some()
    }

    pub const fn is_dir(&self) -> bool {
        self.0 & Self::S_IFMT == Self::S_IFDIR
    }

    pub const fn is_regular(&self) -> bool {
        self.0 & Self::S_IFMT == Self::S_IFREG
    }

    pub const fn is_symlink(&self) -> bool {
        self.0 & Self::S_IFMT == Self::S_IFLNK
    }

    pub const fn is_fifo(&self) -> bool {
        self.0 & Self::S_IFMT == Self::S_IFIFO
    }

    pub const fn is_socket(&self) -> bool {
        self.0 & Self::S_IFMT == Self::S_IFSOCK
    }

    pub const fn is_device(&self) -> bool {
        let kind = self.0 & Self::S_IFMT;
        kind == Self::S_IFCHR || kind == Self::S_IFBLK
    }

    pub const fn permissions(&self) -> u32 {
        self.0 & 0o7777
    }

    /// Same permissions, kind replaced with `S_IFREG` when no kind is set
    pub const fn or_regular(self) -> Self {
        if self.has_kind() {
            self
        } else {
            Self(self.0 | Self::S_IFREG)
        }
    }
}

/// Device number (`dev_t`)
pub type DeviceId = u64;

/// Encode major:minor into a device number
///
/// Linux split layout: minor bits 0..8 in bits 0..8, major in bits 8..20,
/// remaining minor bits from bit 20.
#[inline]
pub const fn makedev(major: u32, minor: u32) -> DeviceId {
    let major = major as u64 & 0xfff;
    let minor = minor as u64;
    (minor & 0xff) | (major << 8) | ((minor & !0xff) << 12)
}

/// Extract major number from a device number
#[inline]
pub const fn major(dev: DeviceId) -> u32 {
    ((dev >> 8) & 0xfff) as u32
}

/// Extract minor number from a device number
#[inline]
pub const fn minor(dev: DeviceId) -> u32 {
    ((dev & 0xff) | ((dev >> 12) & !0xff)) as u32
}

/// Time value carried in [`Stat`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i64,
}

/// File attributes (stat structure equivalent)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    pub dev: DeviceId,      // Device containing the file
    pub ino: u64,           // Inode number
    pub mode: FileMode,     // Mode and permissions
    pub nlink: u32,         // Number of hard links
    pub uid: u32,           // Owner user ID
    pub gid: u32,           // Owner group ID
    pub rdev: DeviceId,     // Device ID (for device files)
    pub size: u64,          // Size in bytes
    pub blksize: u32,       // Block size
    pub blocks: u64,        // Number of 512B blocks
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
}

bitflags! {
    /// Open file description flags
    ///
    /// `RDONLY` and `WRONLY` are independent bits; `RDWR` is both.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const RDONLY    = 0x0001;
        const WRONLY    = 0x0002;
        const RDWR      = Self::RDONLY.bits() | Self::WRONLY.bits();
        const CREAT     = 0x0004;
        const EXCL      = 0x0008;
        const TRUNC     = 0x0010;
        const APPEND    = 0x0020;
        const NONBLOCK  = 0x0040;
        const NOFOLLOW  = 0x0100;
        const DIRECTORY = 0x0200;
    }
}

impl OpenFlags {
    pub const fn readable(self) -> bool {
        self.contains(Self::RDONLY)
    }

    pub const fn writable(self) -> bool {
        self.contains(Self::WRONLY)
    }
}

bitflags! {
    /// Path resolution behaviour
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LookupFlags: u32 {
        /// Return a path even if the last component does not exist.
        /// Its inode is `None` in that case.
        const ALLOW_NOENT      = 0x1;
        /// Do not follow a symbolic link in the last component.
        const NOFOLLOW         = 0x2;
        /// With `NOFOLLOW`, return the link itself instead of failing.
        const NOFOLLOW_NOERROR = 0x4;
    }
}

/// Seek whence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    Set,  // Absolute position
    Cur,  // Relative to current
    End,  // Relative to end
}

bitflags! {
    /// Mapping protection
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MmapProt: u32 {
        const READ  = 0x1;
        const WRITE = 0x2;
        const EXEC  = 0x4;
    }
}

/// Parameters of an mmap request against a file description
#[derive(Debug, Clone, Copy)]
pub struct MmapRequest {
    pub addr: usize,
    pub length: usize,
    pub offset: u64,
    pub prot: MmapProt,
    pub shared: bool,
}

bitflags! {
    /// Readiness events for poll
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PollEvents: u16 {
        const IN   = 0x0001;
        const OUT  = 0x0004;
        const ERR  = 0x0008;
        const HUP  = 0x0010;
    }
}
