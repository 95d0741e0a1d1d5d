//! VFS configuration
//!
//! Tunables consulted by the VFS and its backends, plus the kernel command
//! line parser used for `console=` selection and `/proc/cmdline`.

use alloc::string::String;
use alloc::vec::Vec;

pub const PAGE_SIZE: usize = 4096;
pub const OPEN_MAX: usize = 1024;
pub const PATH_MAX: usize = 4096;
pub const NAME_MAX: usize = 255;
pub const SYMLINK_MAX: usize = 1024;
pub const SYMLOOP_MAX: usize = 8;
pub const PIPE_BUF_SIZE: usize = 4096;
pub const SOCKET_BUF_SIZE: usize = 4096;
pub const SOMAXCONN: usize = 128;
pub const TTY_QUEUE_SIZE: usize = 1024;
pub const KMSG_BUF_SIZE: usize = 16 * 1024;

/// Runtime VFS tunables
#[derive(Debug, Clone)]
pub struct VfsConfig {
    /// Granularity of tmpfs buffer growth
    pub page_size: usize,
    /// Ring capacity of a pipe; one byte less is usable
    pub fifo_capacity: usize,
    /// Ring capacity of each unix socket direction
    pub socket_buffer_capacity: usize,
    /// Upper bound for `listen` backlogs
    pub max_backlog: usize,
    /// Nested symlinks followed before giving up with ELOOP
    pub max_symlink_depth: usize,
    pub open_max: usize,
    pub path_max: usize,
    pub name_max: usize,
    pub symlink_max: usize,
    pub tty_queue_size: usize,
    /// Raw kernel command line
    pub cmdline: Cmdline,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            fifo_capacity: PIPE_BUF_SIZE,
            socket_buffer_capacity: SOCKET_BUF_SIZE,
            max_backlog: SOMAXCONN,
            max_symlink_depth: SYMLOOP_MAX,
            open_max: OPEN_MAX,
            path_max: PATH_MAX,
            name_max: NAME_MAX,
            symlink_max: SYMLINK_MAX,
            tty_queue_size: TTY_QUEUE_SIZE,
            cmdline: Cmdline::default(),
        }
    }
}

impl VfsConfig {
    pub fn with_cmdline(mut self, raw: &str) -> Self {
        self.cmdline = Cmdline::parse(raw);
        self
    }
}

/// Parsed kernel command line
///
/// Words are separated by spaces; `key=value` words are looked up by key,
/// bare words are flags whose value is empty.
#[derive(Debug, Clone, Default)]
pub struct Cmdline {
    raw: String,
    params: Vec<(String, String)>,
}

impl Cmdline {
    pub fn parse(raw: &str) -> Self {
        let params = raw
            .split(' ')
            .filter(|word| !word.is_empty())
            .map(|word| match word.split_once('=') {
                Some((key, value)) => (String::from(key), String::from(value)),
                None => (String::from(word), String::new()),
            })
            .collect();
        Self {
            raw: String::from(raw),
            params,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Last value given for `key`
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
