//! VFS integration tests
//!
//! Namespace operations, tmpfs data paths, the boot archive and the
//! syscall surface, driven through the public API only.

use std::sync::Arc;

use nos_vfs::devices::devno;
use nos_vfs::initrd;
use nos_vfs::{
    FileMode, FileType, FsContext, LookupFlags, MmapProt, MmapRequest, OpenFlags, SeekWhence, Vfs, VfsConfig,
    VfsError, makedev,
};
use proptest::prelude::*;

fn new_vfs() -> Vfs {
    Vfs::new(VfsConfig::default()).expect("vfs")
}

fn write_file(vfs: &Vfs, path: &str, data: &[u8]) {
    let file = vfs
        .open(path, OpenFlags::WRONLY | OpenFlags::CREAT | OpenFlags::TRUNC, FileMode::new(0o644))
        .expect("open for write");
    assert_eq!(file.write_all(data).expect("write"), data.len());
}

fn read_file(vfs: &Vfs, path: &str) -> Vec<u8> {
    let file = vfs.open(path, OpenFlags::RDONLY, FileMode::default()).expect("open for read");
    let mut out = Vec::new();
    let mut chunk = [0u8; 512];
    loop {
        let n = file.read(&mut chunk).expect("read");
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&chunk[..n]);
    }
}

/// odc archive with every member owned by root and one link
fn cpio(members: &[(&str, u32, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut push = |name: &str, mode: u32, data: &[u8]| {
        out.extend_from_slice(initrd::MAGIC);
        out.extend_from_slice(b"000000000000");
        out.extend_from_slice(format!("{:06o}", mode).as_bytes());
        out.extend_from_slice(b"000000000000000001000000");
        out.extend_from_slice(b"00000000000");
        out.extend_from_slice(format!("{:06o}", name.len() + 1).as_bytes());
        out.extend_from_slice(format!("{:011o}", data.len()).as_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(data);
    };
    for (name, mode, data) in members {
        push(name, *mode, data);
    }
    push(initrd::TRAILER, 0, &[]);
    out
}

// ============================================================================
// Path resolution
// ============================================================================

#[test]
fn test_relative_symlink_resolves_against_link_directory() {
    let vfs = new_vfs();
    vfs.mkdir("/usr", 0o755).unwrap();
    vfs.mkdir("/usr/lib", 0o755).unwrap();
    write_file(&vfs, "/usr/lib/libc.so.6", b"elf");
    let root = vfs.root_path();
    vfs.symlink_at(&root, "libc.so.6", "/usr/lib/libc.so").unwrap();
    vfs.symlink_at(&root, "usr/lib", "/lib").unwrap();

    assert_eq!(read_file(&vfs, "/lib/libc.so"), b"elf");

    let link = vfs
        .stat("/lib", LookupFlags::NOFOLLOW | LookupFlags::NOFOLLOW_NOERROR)
        .unwrap();
    assert!(link.mode.is_symlink());
    assert_eq!(
        vfs.resolve_path("/lib", LookupFlags::NOFOLLOW).err(),
        Some(VfsError::TooManySymlinks)
    );

    let mut buf = [0u8; 32];
    let n = vfs.readlink_at(&root, "/lib", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"usr/lib");
}

#[test]
fn test_symlink_loop_fails() {
    let vfs = new_vfs();
    let root = vfs.root_path();
    vfs.symlink_at(&root, "/b", "/a").unwrap();
    vfs.symlink_at(&root, "/a", "/b").unwrap();
    assert_eq!(
        vfs.open("/a", OpenFlags::RDONLY, FileMode::default()).err(),
        Some(VfsError::TooManySymlinks)
    );
}

#[test]
fn test_name_and_path_limits() {
    let vfs = Vfs::new(VfsConfig {
        name_max: 8,
        path_max: 32,
        ..VfsConfig::default()
    })
    .unwrap();
    assert_eq!(vfs.mkdir("/123456789", 0o755).err(), Some(VfsError::NameTooLong));
    vfs.mkdir("/12345678", 0o755).unwrap();
    let long = "/a".repeat(16);
    assert_eq!(vfs.stat(&long, LookupFlags::empty()).err(), Some(VfsError::NameTooLong));
    assert_eq!(vfs.stat("", LookupFlags::empty()).err(), Some(VfsError::NotFound));
}

#[test]
fn test_mount_shadows_directory_contents() {
    let vfs = new_vfs();
    vfs.mkdir("/mnt", 0o755).unwrap();
    write_file(&vfs, "/mnt/hidden", b"x");
    vfs.mount("/mnt", "tmpfs").unwrap();

    assert_eq!(vfs.stat("/mnt/hidden", LookupFlags::empty()).err(), Some(VfsError::NotFound));
    write_file(&vfs, "/mnt/visible", b"y");
    assert_eq!(read_file(&vfs, "/mnt/../mnt/visible"), b"y");

    let mnt = vfs.stat("/mnt", LookupFlags::empty()).unwrap();
    let root = vfs.stat("/", LookupFlags::empty()).unwrap();
    assert_ne!(mnt.dev, root.dev);
    assert_eq!(vfs.mounts().mounts().len(), 1);
}

#[test]
fn test_mount_points_cannot_be_removed_or_moved() {
    let vfs = new_vfs();
    let root = vfs.root_path();
    vfs.mkdir("/tmp", 0o755).unwrap();
    vfs.mount("/tmp", "tmpfs").unwrap();
    vfs.mkdir("/srv", 0o755).unwrap();
    vfs.mkdir("/srv/data", 0o755).unwrap();
    vfs.mount("/srv/data", "tmpfs").unwrap();
    vfs.mkdir("/spare", 0o755).unwrap();

    assert_eq!(vfs.rmdir_at(&root, "/tmp").err(), Some(VfsError::Busy));
    assert_eq!(vfs.rename_at(&root, "/tmp", "/moved").err(), Some(VfsError::Busy));
    assert_eq!(vfs.rename_at(&root, "/spare", "/tmp").err(), Some(VfsError::Busy));
    assert_eq!(vfs.rename_at(&root, "/srv", "/elsewhere").err(), Some(VfsError::Busy));

    write_file(&vfs, "/tmp/still-here", b"ok");
    assert_eq!(read_file(&vfs, "/tmp/still-here"), b"ok");
    assert!(vfs.stat("/srv/data", LookupFlags::empty()).is_ok());

    vfs.mkdir("/tmp/inner", 0o755).unwrap();
    vfs.rmdir_at(&root, "/tmp/inner").unwrap();
    vfs.rename_at(&root, "/spare", "/spare2").unwrap();
}

// ============================================================================
// Namespace operations
// ============================================================================

#[test]
fn test_rename_replaces_file_and_keeps_link_counts() {
    let vfs = new_vfs();
    write_file(&vfs, "/old", b"new contents");
    write_file(&vfs, "/target", b"stale");
    let root = vfs.root_path();

    vfs.rename_at(&root, "/old", "/target").unwrap();
    assert_eq!(read_file(&vfs, "/target"), b"new contents");
    assert_eq!(vfs.stat("/old", LookupFlags::empty()).err(), Some(VfsError::NotFound));
    assert_eq!(vfs.stat("/target", LookupFlags::empty()).unwrap().nlink, 1);

    vfs.mkdir("/dir", 0o755).unwrap();
    assert_eq!(vfs.rename_at(&root, "/target", "/dir").err(), Some(VfsError::IsDirectory));
    assert_eq!(vfs.rename_at(&root, "/dir", "/target").err(), Some(VfsError::NotDirectory));
    assert_eq!(vfs.rename_at(&root, "/dir", "/dir/inner").err(), Some(VfsError::InvalidArgument));
}

#[test]
fn test_hard_link_survives_unlink() {
    let vfs = new_vfs();
    write_file(&vfs, "/a", b"shared");
    let root = vfs.root_path();
    vfs.link_at(&root, "/a", "/b").unwrap();
    assert_eq!(vfs.stat("/a", LookupFlags::empty()).unwrap().nlink, 2);

    let open = vfs.open("/a", OpenFlags::RDONLY, FileMode::default()).unwrap();
    vfs.unlink_at(&root, "/a").unwrap();
    vfs.unlink_at(&root, "/b").unwrap();

    let mut buf = [0u8; 6];
    assert_eq!(open.read(&mut buf).unwrap(), 6);
    assert_eq!(&buf, b"shared");
    assert_eq!(open.inode().nlink(), 0);
}

#[test]
fn test_rmdir_requires_empty_directory() {
    let vfs = new_vfs();
    vfs.mkdir("/d", 0o755).unwrap();
    write_file(&vfs, "/d/f", b"");
    let root = vfs.root_path();
    assert_eq!(vfs.rmdir_at(&root, "/d").err(), Some(VfsError::NotEmpty));
    assert_eq!(vfs.rmdir_at(&root, "/d/f").err(), Some(VfsError::NotDirectory));
    vfs.unlink_at(&root, "/d/f").unwrap();
    vfs.rmdir_at(&root, "/d").unwrap();
    assert_eq!(vfs.rmdir_at(&root, "/").err(), Some(VfsError::NotPermitted));
}

// ============================================================================
// tmpfs data
// ============================================================================

#[test]
fn test_sparse_write_reads_zero_gap() {
    let vfs = new_vfs();
    let file = vfs
        .open("/sparse", OpenFlags::RDWR | OpenFlags::CREAT, FileMode::new(0o600))
        .unwrap();
    file.seek(10_000, SeekWhence::Set).unwrap();
    file.write(b"end").unwrap();
    assert_eq!(file.inode().size().unwrap(), 10_003);

    let data = read_file(&vfs, "/sparse");
    assert!(data[..10_000].iter().all(|&b| b == 0));
    assert_eq!(&data[10_000..], b"end");
}

#[test]
fn test_append_and_truncate() {
    let vfs = new_vfs();
    write_file(&vfs, "/log", b"one\n");
    let file = vfs
        .open("/log", OpenFlags::WRONLY | OpenFlags::APPEND, FileMode::default())
        .unwrap();
    file.write(b"two\n").unwrap();
    assert_eq!(read_file(&vfs, "/log"), b"one\ntwo\n");

    file.truncate(2).unwrap();
    file.truncate(4).unwrap();
    assert_eq!(read_file(&vfs, "/log"), b"on\0\0");
}

#[test]
fn test_concurrent_appenders_never_overlap() {
    let vfs = Arc::new(new_vfs());
    write_file(&vfs, "/journal", b"");
    let writers: Vec<_> = [b'a', b'b']
        .into_iter()
        .map(|tag| {
            let vfs = vfs.clone();
            std::thread::spawn(move || {
                let file = vfs
                    .open("/journal", OpenFlags::WRONLY | OpenFlags::APPEND, FileMode::default())
                    .unwrap();
                for _ in 0..200 {
                    file.write(&[tag; 8]).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let data = read_file(&vfs, "/journal");
    assert_eq!(data.len(), 2 * 200 * 8);
    for record in data.chunks(8) {
        assert!(record.iter().all(|byte| *byte == record[0]), "torn record {:?}", record);
    }
    assert_eq!(data.iter().filter(|byte| **byte == b'a').count(), 200 * 8);
}

#[test]
fn test_shared_mapping_sees_file_bytes() {
    let vfs = new_vfs();
    write_file(&vfs, "/map", b"abcd");
    let request = MmapRequest {
        addr: 0x4000_0000,
        length: 4,
        offset: 0,
        prot: MmapProt::READ | MmapProt::WRITE,
        shared: true,
    };

    let read_only = vfs.open("/map", OpenFlags::RDONLY, FileMode::default()).unwrap();
    assert_eq!(read_only.mmap(&request).err(), Some(VfsError::PermissionDenied));

    let file = vfs.open("/map", OpenFlags::RDWR, FileMode::default()).unwrap();
    let mapping = file.mmap(&request).unwrap();
    assert_eq!(mapping.load(1).unwrap(), b'b');
    mapping.store(0, b'z').unwrap();
    assert_eq!(read_file(&vfs, "/map"), b"zbcd");
    assert_eq!(mapping.load(4).err(), Some(VfsError::InvalidArgument));
}

proptest! {
    #[test]
    fn prop_tmpfs_write_then_read(chunks in proptest::collection::vec(
        proptest::collection::vec(any::<u8>(), 1..3000), 1..8)) {
        let vfs = new_vfs();
        let file = vfs
            .open("/f", OpenFlags::RDWR | OpenFlags::CREAT, FileMode::new(0o644))
            .unwrap();
        let mut expected = Vec::new();
        for chunk in &chunks {
            prop_assert_eq!(file.write_all(chunk).unwrap(), chunk.len());
            expected.extend_from_slice(chunk);
        }
        prop_assert_eq!(file.inode().size().unwrap(), expected.len() as u64);
        prop_assert_eq!(read_file(&vfs, "/f"), expected);
    }
}

// ============================================================================
// Boot archive and devices
// ============================================================================

#[test]
fn test_initrd_populates_tree_with_device_nodes() {
    let vfs = new_vfs();
    let archive = cpio(&[
        ("bin", 0o040755, b""),
        ("bin/init", 0o100755, b"\x7fELF"),
        ("dev", 0o040755, b""),
        ("etc/hostname", 0o100644, b"nos\n"),
    ]);
    assert_eq!(
        initrd::unpack(&vfs, &archive).err(),
        Some(VfsError::NotFound),
        "parent directories are not created implicitly"
    );

    let vfs = new_vfs();
    let archive = cpio(&[
        ("bin", 0o040755, b""),
        ("bin/init", 0o100755, b"\x7fELF"),
        ("dev", 0o040755, b""),
    ]);
    assert_eq!(initrd::populate_root_fs(&vfs, &archive).unwrap(), 3);
    assert_eq!(vfs.stat("/bin/init", LookupFlags::empty()).unwrap().mode.permissions(), 0o755);

    vfs.populate_dev().unwrap();
    let null = vfs.stat("/dev/null", LookupFlags::empty()).unwrap();
    assert_eq!(null.rdev, makedev(devno::MEM_MAJOR, devno::NULL_MINOR));
    assert_eq!(null.mode.file_type(), Some(FileType::CharDevice));

    let full = vfs.open("/dev/full", OpenFlags::RDWR, FileMode::default()).unwrap();
    assert_eq!(full.write(b"x").err(), Some(VfsError::NoSpace));
    let mut buf = [1u8; 3];
    assert_eq!(full.read(&mut buf).unwrap(), 3);
    assert_eq!(buf, [0; 3]);
}

#[test]
fn test_unknown_device_node_fails_to_open() {
    let vfs = new_vfs();
    vfs.mknod_at(&vfs.root_path(), "/weird", FileMode::new(FileMode::S_IFCHR | 0o600), makedev(42, 0))
        .unwrap();
    assert_eq!(
        vfs.open("/weird", OpenFlags::RDONLY, FileMode::default()).err(),
        Some(VfsError::NoSuchDevice)
    );
}

// ============================================================================
// Syscall surface
// ============================================================================

#[test]
fn test_forked_context_shares_offsets() {
    let ctx = FsContext::new(Arc::new(new_vfs()));
    let fd = ctx.sys_open("/shared", OpenFlags::RDWR | OpenFlags::CREAT, 0o644).unwrap() as i32;
    ctx.sys_write(fd, b"parent ").unwrap();

    let child = ctx.fork();
    child.sys_write(fd, b"child").unwrap();
    assert_eq!(ctx.sys_lseek(fd, 0, 1).unwrap(), 12);

    child.sys_close(fd).unwrap();
    assert!(ctx.sys_fstat(fd).is_ok());
    assert_eq!(child.sys_fstat(fd).err(), Some(VfsError::BadFileDescriptor));
}

#[test]
fn test_descriptor_exhaustion() {
    let vfs = Vfs::new(VfsConfig {
        open_max: 3,
        ..VfsConfig::default()
    })
    .unwrap();
    let ctx = FsContext::new(Arc::new(vfs));
    for expected in 0..3 {
        assert_eq!(ctx.sys_open("/", OpenFlags::RDONLY, 0).unwrap(), expected);
    }
    assert_eq!(ctx.sys_open("/", OpenFlags::RDONLY, 0).err(), Some(VfsError::TooManyOpenFiles));
    assert_eq!(ctx.sys_pipe().err(), Some(VfsError::TooManyOpenFiles));

    ctx.sys_close(2).unwrap();
    assert_eq!(ctx.sys_pipe().err(), Some(VfsError::TooManyOpenFiles));
    assert_eq!(ctx.fds().open_count(), 2);
}

#[test]
fn test_errno_mapping() {
    let ctx = FsContext::new(Arc::new(new_vfs()));
    assert_eq!(nos_vfs::to_neg_errno(ctx.sys_unlink("/missing")), -2);
    assert_eq!(nos_vfs::to_neg_errno(ctx.sys_mkdir("/", 0o755)), -17);
    assert_eq!(nos_vfs::to_neg_errno(ctx.sys_close(7)), -9);
    assert_eq!(nos_vfs::to_neg_errno(ctx.sys_getcwd(&mut [0u8; 1])), -34);
}
