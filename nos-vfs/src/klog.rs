//! Kernel message buffer
//!
//! A byte ring that keeps the most recent log output. [`KernelLog`] plugs it
//! into the `log` facade and `/proc/kmsg` reads it back.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use lazy_static::lazy_static;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

use crate::config::KMSG_BUF_SIZE;
use crate::ring_buf::RingBuf;

/// Kernel message ring; writes evict the oldest bytes
pub struct KmsgBuffer {
    ring: Mutex<RingBuf>,
}

impl KmsgBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(RingBuf::with_capacity(capacity)),
        }
    }

    pub fn write(&self, bytes: &[u8]) -> usize {
        self.ring.lock().write_evicting_oldest(bytes)
    }

    /// Current contents, oldest byte first
    pub fn snapshot(&self) -> Vec<u8> {
        self.ring.lock().peek_all()
    }

    pub fn clear(&self) {
        self.ring.lock().clear();
    }
}

lazy_static! {
    static ref KMSG: KmsgBuffer = KmsgBuffer::with_capacity(KMSG_BUF_SIZE);
}

/// The global kernel message buffer
pub fn kmsg() -> &'static KmsgBuffer {
    &KMSG
}

/// `log` sink that records into the kernel message buffer
pub struct KernelLog;

impl Log for KernelLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut line = String::new();
        let _ = writeln!(line, "[{}] {}: {}", record.level(), record.target(), record.args());
        KMSG.write(line.as_bytes());
    }

    fn flush(&self) {}
}

static LOGGER: KernelLog = KernelLog;

/// Route the `log` facade into the kernel message buffer
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
