//! Process file system (procfs)
//!
//! Synthetic files generated on open. The root lists a fixed set of
//! system-wide items followed by one directory per live process; the
//! per-process directories are built on lookup and validated against the
//! process table.

use alloc::{string::String, sync::Arc, vec::Vec};

mod item;
mod pid;
mod root;

pub use root::procfs_create_root;

pub type Pid = u32;

/// Snapshot of one process as reported by the process subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub comm: String,
    /// Arguments, joined with NUL bytes in `/proc/<pid>/cmdline`
    pub cmdline: Vec<String>,
}

/// Read-only view of the process table
///
/// Implementations must not block; procfs queries it with no locks held.
pub trait ProcessTable: Send + Sync {
    /// Pids of all live processes, in any order
    fn pids(&self) -> Vec<Pid>;

    fn process(&self, pid: Pid) -> Option<ProcessInfo>;

    /// Pid of the calling process, if there is one
    fn current_pid(&self) -> Option<Pid>;
}

/// Physical memory summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total_kib: u64,
    pub free_kib: u64,
}

/// System-wide counters shown in the procfs root
pub trait SystemInfo: Send + Sync {
    fn memory_info(&self) -> MemoryInfo;

    fn uptime_secs(&self) -> u64;
}

/// Process table with no processes, used before the scheduler starts
#[derive(Debug, Default)]
pub struct NoProcesses;

impl ProcessTable for NoProcesses {
    fn pids(&self) -> Vec<Pid> {
        Vec::new()
    }

    fn process(&self, _pid: Pid) -> Option<ProcessInfo> {
        None
    }

    fn current_pid(&self) -> Option<Pid> {
        None
    }
}

/// System information source reporting zeros
#[derive(Debug, Default)]
pub struct NullSystemInfo;

impl SystemInfo for NullSystemInfo {
    fn memory_info(&self) -> MemoryInfo {
        MemoryInfo::default()
    }

    fn uptime_secs(&self) -> u64 {
        0
    }
}

/// Everything a procfs instance reads from
#[derive(Clone)]
pub struct ProcfsSource {
    pub processes: Arc<dyn ProcessTable>,
    pub system: Arc<dyn SystemInfo>,
    /// Raw kernel command line
    pub cmdline: String,
}
