//! The procfs root directory
//!
//! Enumeration serves the fixed items first and then every live pid in
//! ascending order. The offset past the items is `pid + NUM_ITEMS` of the
//! last pid emitted, so a pid that exits between calls does not shift the
//! cursor.

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt::Write;

use crate::error::{VfsError, VfsResult};
use crate::file::FileDescription;
use crate::inode::{DirFiller, FileOps, Inode, InodeRef, generate_unnamed_device_number};
use crate::klog;
use crate::types::{FileMode, FileType};

use super::item::{ItemDef, ItemNode, ProcfsDir};
use super::pid::procfs_pid_dir_create;
use super::{Pid, ProcfsSource};

fn fmt_err(_: core::fmt::Error) -> VfsError {
    VfsError::OutOfMemory
}

fn populate_cmdline(node: &ItemNode, buf: &mut String) -> VfsResult<()> {
    writeln!(buf, "{}", node.source.cmdline).map_err(fmt_err)
}

fn populate_meminfo(node: &ItemNode, buf: &mut String) -> VfsResult<()> {
    let info = node.source.system.memory_info();
    writeln!(buf, "MemTotal: {:>8} kB", info.total_kib).map_err(fmt_err)?;
    writeln!(buf, "MemFree:  {:>8} kB", info.free_kib).map_err(fmt_err)
}

fn populate_uptime(node: &ItemNode, buf: &mut String) -> VfsResult<()> {
    writeln!(buf, "{}", node.source.system.uptime_secs()).map_err(fmt_err)
}

fn populate_kmsg(_node: &ItemNode, buf: &mut String) -> VfsResult<()> {
    buf.push_str(&String::from_utf8_lossy(&klog::kmsg().snapshot()));
    Ok(())
}

// Target of the `self` symlink
fn populate_self(node: &ItemNode, buf: &mut String) -> VfsResult<()> {
    let pid = node
        .source
        .processes
        .current_pid()
        .ok_or(VfsError::NotFound)?;
    write!(buf, "{}", pid).map_err(fmt_err)
}

static ROOT_ITEMS: [ItemDef; 5] = [
    ItemDef { name: "cmdline", kind: FileType::Regular, populate: populate_cmdline },
    ItemDef { name: "meminfo", kind: FileType::Regular, populate: populate_meminfo },
    ItemDef { name: "uptime", kind: FileType::Regular, populate: populate_uptime },
    ItemDef { name: "kmsg", kind: FileType::Regular, populate: populate_kmsg },
    ItemDef { name: "self", kind: FileType::Symlink, populate: populate_self },
];

const NUM_ITEMS: u64 = ROOT_ITEMS.len() as u64;

fn parse_pid(name: &str) -> Option<Pid> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

fn procfs_root_lookup_child(inode: &Inode, name: &str) -> VfsResult<InodeRef> {
    let root = inode.private::<ProcfsDir>()?;
    match parse_pid(name) {
        Some(pid) => procfs_pid_dir_create(&root.source, pid, inode.dev()),
        None => root.children.find(name).ok_or(VfsError::NotFound),
    }
}

fn procfs_root_getdents(desc: &FileDescription, filler: &mut DirFiller<'_>) -> VfsResult<()> {
    let root = desc.inode().private::<ProcfsDir>()?;
    if desc.offset() < NUM_ITEMS {
        root.children.getdents(desc, filler)?;
        if desc.offset() < NUM_ITEMS {
            return Ok(());
        }
    }

    let mut pids = root.source.processes.pids();
    pids.sort_unstable();
    pids.dedup();

    let mut offset = desc.lock_offset();
    let Ok(last) = Pid::try_from(*offset - NUM_ITEMS) else {
        return Ok(());
    };
    for pid in pids.into_iter().filter(|pid| *pid > last) {
        let mut name = String::new();
        write!(name, "{}", pid).map_err(fmt_err)?;
        if !filler(&name, FileType::Directory) {
            break;
        }
        *offset = pid as u64 + NUM_ITEMS;
    }
    Ok(())
}

static ROOT_OPS: FileOps = FileOps {
    lookup_child: Some(procfs_root_lookup_child),
    getdents: Some(procfs_root_getdents),
    ..FileOps::EMPTY
};

/// Build a procfs instance reading from `source`
pub fn procfs_create_root(source: ProcfsSource) -> VfsResult<InodeRef> {
    let source = Arc::new(source);
    let dev = generate_unnamed_device_number();
    let root = ProcfsDir::with_items(&source, &ROOT_ITEMS, None, dev)?;
    log::debug!("procfs: created instance on device {:#x}", dev);
    Ok(Inode::new(&ROOT_OPS, FileMode::new(FileMode::S_IFDIR | 0o555), root)
        .with_dev(dev)
        .with_nlink(1)
        .into_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file;
    use crate::procfs::{NoProcesses, NullSystemInfo};
    use crate::procfs::{ProcessInfo, ProcessTable};
    use crate::types::{OpenFlags, SeekWhence};
    use alloc::vec::Vec;

    fn empty_source() -> ProcfsSource {
        ProcfsSource {
            processes: Arc::new(NoProcesses),
            system: Arc::new(NullSystemInfo),
            cmdline: String::from("console=tty1 quiet"),
        }
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("42"), Some(42));
        assert_eq!(parse_pid("+4"), None);
        assert_eq!(parse_pid(""), None);
        assert_eq!(parse_pid("self"), None);
        assert_eq!(parse_pid("99999999999"), None);
    }

    #[test]
    fn test_root_items_and_cmdline() {
        let root = procfs_create_root(empty_source()).unwrap();
        let desc = file::open(&root, OpenFlags::RDONLY, FileMode::default()).unwrap();
        let mut names = Vec::new();
        desc.getdents(&mut |name: &str, _: FileType| {
            names.push(String::from(name));
            true
        })
        .unwrap();
        assert_eq!(names, ["cmdline", "meminfo", "uptime", "kmsg", "self"]);

        let cmdline = root.lookup_child("cmdline").unwrap();
        let desc = file::open(&cmdline, OpenFlags::RDONLY, FileMode::default()).unwrap();
        let mut out = [0u8; 64];
        let n = desc.read_to_end(&mut out).unwrap();
        assert_eq!(&out[..n], b"console=tty1 quiet\n");
    }

    struct FixedPids(Vec<Pid>);

    impl ProcessTable for FixedPids {
        fn pids(&self) -> Vec<Pid> {
            self.0.clone()
        }

        fn process(&self, _pid: Pid) -> Option<ProcessInfo> {
            None
        }

        fn current_pid(&self) -> Option<Pid> {
            None
        }
    }

    #[test]
    fn test_cursor_past_pid_range_ends_listing() {
        let source = ProcfsSource {
            processes: Arc::new(FixedPids(alloc::vec![1, 2])),
            ..empty_source()
        };
        let root = procfs_create_root(source).unwrap();
        let desc = file::open(&root, OpenFlags::RDONLY, FileMode::default()).unwrap();
        desc.seek(u32::MAX as i64 + NUM_ITEMS as i64 + 1, SeekWhence::Set).unwrap();

        let mut names = Vec::new();
        desc.getdents(&mut |name: &str, _: FileType| {
            names.push(String::from(name));
            true
        })
        .unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_missing_pid_and_self() {
        let root = procfs_create_root(empty_source()).unwrap();
        assert_eq!(root.lookup_child("7").err(), Some(VfsError::NotFound));
        let link = root.lookup_child("self").unwrap();
        assert!(link.mode().is_symlink());
        assert_eq!(
            file::open(&link, OpenFlags::RDONLY, FileMode::default()).err(),
            Some(VfsError::NotFound)
        );
    }
}
