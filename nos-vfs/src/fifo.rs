//! Pipes
//!
//! A pipe inode owns one ring buffer. Reads block while it is empty and at
//! least one writer remains; writes block while it is full and at least one
//! reader remains. Both re-check under the buffer lock after waking.

use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::block;
use crate::error::{VfsError, VfsResult};
use crate::file::FileDescription;
use crate::inode::{FileOps, Inode, InodeRef};
use crate::ring_buf::RingBuf;
use crate::types::{FileMode, PollEvents, Stat};

struct Pipe {
    buf: Mutex<RingBuf>,
    readers: AtomicUsize,
    writers: AtomicUsize,
}

/// Which ends a description holds, fixed at open
#[derive(Clone, Copy)]
struct PipeEnd {
    reader: bool,
    writer: bool,
}

impl Pipe {
    fn has_readers(&self) -> bool {
        self.readers.load(Ordering::Acquire) > 0
    }

    fn has_writers(&self) -> bool {
        self.writers.load(Ordering::Acquire) > 0
    }
}

fn pipe_of(desc: &FileDescription) -> VfsResult<&Pipe> {
    desc.inode().private::<Pipe>()
}

/// Create an unnamed pipe with a ring of `capacity` bytes
pub fn fifo_create(capacity: usize) -> VfsResult<InodeRef> {
    let pipe = Pipe {
        buf: Mutex::new(RingBuf::new(capacity)?),
        readers: AtomicUsize::new(0),
        writers: AtomicUsize::new(0),
    };
    Ok(Inode::new(&FIFO_OPS, FileMode::new(FileMode::S_IFIFO | 0o600), pipe).into_ref())
}

fn fifo_open(desc: &FileDescription, _mode: FileMode) -> VfsResult<()> {
    let pipe = pipe_of(desc)?;
    let flags = desc.flags();
    let end = PipeEnd {
        reader: flags.readable(),
        writer: flags.writable(),
    };
    if end.reader {
        pipe.readers.fetch_add(1, Ordering::AcqRel);
    }
    if end.writer {
        pipe.writers.fetch_add(1, Ordering::AcqRel);
    }
    desc.set_private(end);
    Ok(())
}

fn fifo_close(desc: &FileDescription) {
    let (Ok(pipe), Some(end)) = (pipe_of(desc), desc.private::<PipeEnd>()) else {
        return;
    };
    if end.reader {
        pipe.readers.fetch_sub(1, Ordering::AcqRel);
    }
    if end.writer {
        pipe.writers.fetch_sub(1, Ordering::AcqRel);
    }
    block::wake();
}

fn fifo_read(desc: &FileDescription, dest: &mut [u8]) -> VfsResult<usize> {
    let pipe = pipe_of(desc)?;
    if dest.is_empty() {
        return Ok(0);
    }
    loop {
        desc.block(|| !pipe.buf.lock().is_empty() || !pipe.has_writers())?;

        let mut buf = pipe.buf.lock();
        if buf.is_empty() {
            if !pipe.has_writers() {
                return Ok(0);
            }
            continue;
        }
        let nread = buf.read(dest);
        drop(buf);
        block::wake();
        return Ok(nread);
    }
}

fn fifo_write(desc: &FileDescription, src: &[u8]) -> VfsResult<usize> {
    let pipe = pipe_of(desc)?;
    if src.is_empty() {
        return Ok(0);
    }
    loop {
        if !pipe.has_readers() {
            return Err(VfsError::BrokenPipe);
        }
        desc.block(|| !pipe.buf.lock().is_full() || !pipe.has_readers())?;

        let mut buf = pipe.buf.lock();
        if !pipe.has_readers() {
            return Err(VfsError::BrokenPipe);
        }
        if buf.is_full() {
            continue;
        }
        let nwritten = buf.write(src);
        drop(buf);
        block::wake();
        return Ok(nwritten);
    }
}

fn fifo_stat(inode: &Inode, stat: &mut Stat) -> VfsResult<()> {
    stat.size = inode.private::<Pipe>()?.buf.lock().len() as u64;
    Ok(())
}

fn fifo_poll(desc: &FileDescription, events: PollEvents) -> PollEvents {
    let Ok(pipe) = pipe_of(desc) else {
        return PollEvents::ERR;
    };
    let buf = pipe.buf.lock();
    let mut ready = PollEvents::empty();
    if !buf.is_empty() {
        ready |= PollEvents::IN;
    }
    if !buf.is_full() {
        ready |= PollEvents::OUT;
    }
    if !pipe.has_writers() {
        ready |= PollEvents::HUP;
    }
    if !pipe.has_readers() {
        ready |= PollEvents::ERR;
    }
    ready & (events | PollEvents::HUP | PollEvents::ERR)
}

static FIFO_OPS: FileOps = FileOps {
    open: Some(fifo_open),
    close: Some(fifo_close),
    read: Some(fifo_read),
    write: Some(fifo_write),
    stat: Some(fifo_stat),
    poll: Some(fifo_poll),
    ..FileOps::EMPTY
};
