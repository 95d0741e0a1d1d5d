//! procfs tests against mocked process and system collaborators

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use mockall::mock;
use mockall::predicate::eq;
use nos_vfs::procfs::{MemoryInfo, Pid, ProcessInfo, ProcessTable, SystemInfo};
use nos_vfs::{FileMode, FileRef, FileType, LookupFlags, OpenFlags, Vfs, VfsConfig, VfsError};

mock! {
    pub Processes {}

    impl ProcessTable for Processes {
        fn pids(&self) -> Vec<Pid>;
        fn process(&self, pid: Pid) -> Option<ProcessInfo>;
        fn current_pid(&self) -> Option<Pid>;
    }
}

mock! {
    pub System {}

    impl SystemInfo for System {
        fn memory_info(&self) -> MemoryInfo;
        fn uptime_secs(&self) -> u64;
    }
}

fn shell(pid: Pid) -> ProcessInfo {
    ProcessInfo {
        pid,
        comm: String::from("sh"),
        cmdline: vec![String::from("/bin/sh"), String::from("-l")],
    }
}

fn quiet_system() -> MockSystem {
    let mut system = MockSystem::new();
    system.expect_memory_info().return_const(MemoryInfo {
        total_kib: 131_072,
        free_kib: 65_536,
    });
    system.expect_uptime_secs().return_const(42u64);
    system
}

fn mounted(processes: MockProcesses, system: MockSystem) -> Vfs {
    let vfs = Vfs::with_collaborators(
        VfsConfig::default().with_cmdline("console=tty1"),
        Arc::new(processes),
        Arc::new(system),
    )
    .unwrap();
    vfs.mkdir("/proc", 0o555).unwrap();
    vfs.mount("/proc", "proc").unwrap();
    vfs
}

fn contents(vfs: &Vfs, path: &str) -> Result<Vec<u8>, VfsError> {
    let file = vfs.open(path, OpenFlags::RDONLY, FileMode::default())?;
    let mut buf = vec![0u8; 256];
    let n = file.read_to_end(&mut buf)?;
    buf.truncate(n);
    Ok(buf)
}

/// Read entries until `limit` have been accepted or the directory ends
fn list(dir: &FileRef, limit: usize) -> Vec<(String, FileType)> {
    let mut names = Vec::new();
    dir.getdents(&mut |name: &str, kind: FileType| {
        if names.len() == limit {
            return false;
        }
        names.push((String::from(name), kind));
        true
    })
    .unwrap();
    names
}

#[test]
fn test_root_lists_items_then_sorted_pids() {
    let mut processes = MockProcesses::new();
    processes.expect_pids().returning(|| vec![7, 1, 3, 7]);
    let vfs = mounted(processes, quiet_system());

    let dir = vfs.open("/proc", OpenFlags::RDONLY, FileMode::default()).unwrap();
    let entries = list(&dir, usize::MAX);
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["cmdline", "meminfo", "uptime", "kmsg", "self", "1", "3", "7"]);
    assert_eq!(entries[4].1, FileType::Symlink);
    assert_eq!(entries[5].1, FileType::Directory);
    assert!(list(&dir, usize::MAX).is_empty());
}

#[test]
fn test_cursor_skips_exited_process() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut processes = MockProcesses::new();
    {
        let calls = calls.clone();
        processes.expect_pids().returning(move || {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                vec![1, 2, 3]
            } else {
                vec![3, 1]
            }
        });
    }
    let vfs = mounted(processes, quiet_system());

    let dir = vfs.open("/proc", OpenFlags::RDONLY, FileMode::default()).unwrap();
    let first = list(&dir, 6);
    assert_eq!(first.last().map(|(name, _)| name.as_str()), Some("1"));

    let rest = list(&dir, usize::MAX);
    let names: Vec<&str> = rest.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["3"]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_pid_directory_items() {
    let mut processes = MockProcesses::new();
    processes.expect_process().with(eq(12)).returning(|pid| Some(shell(pid)));
    processes.expect_process().returning(|_| None);
    processes.expect_current_pid().return_const(Some(12));
    let vfs = mounted(processes, quiet_system());

    assert_eq!(contents(&vfs, "/proc/12/comm").unwrap(), b"sh\n");
    assert_eq!(contents(&vfs, "/proc/12/cmdline").unwrap(), b"/bin/sh\0-l\0");
    assert_eq!(contents(&vfs, "/proc/self/comm").unwrap(), b"sh\n");
    assert_eq!(
        vfs.stat("/proc/self", LookupFlags::NOFOLLOW | LookupFlags::NOFOLLOW_NOERROR)
            .unwrap()
            .size,
        2
    );
    assert_eq!(contents(&vfs, "/proc/13/comm").err(), Some(VfsError::NotFound));
    assert_eq!(vfs.stat("/proc/12/environ", LookupFlags::empty()).err(), Some(VfsError::NotFound));

    let dir = vfs.open("/proc/12", OpenFlags::RDONLY, FileMode::default()).unwrap();
    let names: Vec<String> = list(&dir, usize::MAX).into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["comm", "cmdline"]);
}

#[test]
fn test_system_items() {
    let vfs = mounted(MockProcesses::new(), quiet_system());
    assert_eq!(contents(&vfs, "/proc/cmdline").unwrap(), b"console=tty1\n");
    assert_eq!(
        contents(&vfs, "/proc/meminfo").unwrap(),
        b"MemTotal:   131072 kB\nMemFree:     65536 kB\n"
    );
    assert_eq!(contents(&vfs, "/proc/uptime").unwrap(), b"42\n");

    let stat = vfs.stat("/proc/uptime", LookupFlags::empty()).unwrap();
    assert_eq!(stat.size, 3);
    assert_eq!(stat.mode.permissions(), 0o444);
    assert_eq!(
        vfs.open("/proc/uptime", OpenFlags::WRONLY, FileMode::default())
            .and_then(|file| file.write(b"0")),
        Err(VfsError::InvalidArgument)
    );
}
