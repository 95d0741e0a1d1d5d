//! Unix-domain stream sockets
//!
//! A connecting socket becomes the connection itself: it owns both
//! directions' ring buffers, the client keeps the description it connected
//! with and the server opens a second description on the same inode after
//! [`accept`]. A listener only holds the queue of pending connectors.

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use crate::block;
use crate::config::VfsConfig;
use crate::error::{VfsError, VfsResult};
use crate::file::FileDescription;
use crate::inode::{FileOps, Inode, InodeRef};
use crate::ring_buf::RingBuf;
use crate::types::{FileMode, PollEvents};

pub struct UnixSocket {
    client_to_server: Mutex<RingBuf>,
    server_to_client: Mutex<RingBuf>,
    pending: Mutex<VecDeque<InodeRef>>,
    backlog: AtomicUsize,
    max_backlog: usize,
    connected: AtomicBool,
}

/// Marks the description a connector used for `connect`
struct ClientEnd;

impl UnixSocket {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn num_pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn buf_to_read(&self, desc: &FileDescription) -> &Mutex<RingBuf> {
        if desc.private::<ClientEnd>().is_some() {
            &self.server_to_client
        } else {
            &self.client_to_server
        }
    }

    fn buf_to_write(&self, desc: &FileDescription) -> &Mutex<RingBuf> {
        if desc.private::<ClientEnd>().is_some() {
            &self.client_to_server
        } else {
            &self.server_to_client
        }
    }
}

fn socket_of(inode: &Inode) -> VfsResult<&UnixSocket> {
    inode.private::<UnixSocket>().map_err(|_| VfsError::NotSupported)
}

/// Create an unconnected socket
pub fn unix_socket_create(config: &VfsConfig) -> VfsResult<InodeRef> {
    let socket = UnixSocket {
        client_to_server: Mutex::new(RingBuf::new(config.socket_buffer_capacity)?),
        server_to_client: Mutex::new(RingBuf::new(config.socket_buffer_capacity)?),
        pending: Mutex::new(VecDeque::new()),
        backlog: AtomicUsize::new(0),
        max_backlog: config.max_backlog,
        connected: AtomicBool::new(false),
    };
    Ok(Inode::new(&SOCKET_OPS, FileMode::new(FileMode::S_IFSOCK | 0o777), socket).into_ref())
}

/// Set the listen backlog, clamped to the configured ceiling
pub fn unix_socket_set_backlog(listener: &Inode, backlog: usize) -> VfsResult<()> {
    let socket = socket_of(listener)?;
    socket
        .backlog
        .store(backlog.min(socket.max_backlog), Ordering::Release);
    Ok(())
}

/// Wait for a pending connector on `listener_desc` and mark it connected.
///
/// Connectors are accepted in the order they connected. A non-blocking
/// listener with nothing pending fails with `WouldBlock`.
pub fn unix_socket_accept(listener_desc: &FileDescription) -> VfsResult<InodeRef> {
    let socket = socket_of(listener_desc.inode())?;
    loop {
        listener_desc.block(|| !socket.pending.lock().is_empty())?;
        let Some(connector) = socket.pending.lock().pop_front() else {
            continue;
        };
        socket_of(&connector)?.connected.store(true, Ordering::Release);
        block::wake();
        log::debug!("unix_socket: accepted connection on inode {}", connector.ino());
        return Ok(connector);
    }
}

/// Queue `connector_desc`'s socket on `listener` and wait until accepted.
///
/// A full pending queue refuses the connection without blocking.
pub fn unix_socket_connect(connector_desc: &FileDescription, listener: &Inode) -> VfsResult<()> {
    let connector = connector_desc.inode();
    let connector_socket = socket_of(connector)?;
    let socket = socket_of(listener)?;
    if connector_socket.is_connected() {
        return Err(VfsError::InvalidArgument);
    }
    {
        let mut pending = socket.pending.lock();
        if pending.len() >= socket.backlog.load(Ordering::Acquire) {
            log::warn!("unix_socket: connection refused, backlog full");
            return Err(VfsError::ConnectionRefused);
        }
        connector_desc.set_private(ClientEnd);
        pending
            .try_reserve(1)
            .map_err(|_| VfsError::OutOfMemory)?;
        pending.push_back(connector.clone());
    }
    block::wake();
    block::block(|| connector_socket.is_connected())
}

fn unix_socket_read(desc: &FileDescription, dest: &mut [u8]) -> VfsResult<usize> {
    let buf = socket_of(desc.inode())?.buf_to_read(desc);
    loop {
        desc.block(|| !buf.lock().is_empty())?;

        let mut ring = buf.lock();
        if ring.is_empty() {
            continue;
        }
        let nread = ring.read(dest);
        drop(ring);
        block::wake();
        return Ok(nread);
    }
}

fn unix_socket_write(desc: &FileDescription, src: &[u8]) -> VfsResult<usize> {
    let buf = socket_of(desc.inode())?.buf_to_write(desc);
    loop {
        desc.block(|| !buf.lock().is_full())?;

        let mut ring = buf.lock();
        if ring.is_full() {
            continue;
        }
        let nwritten = ring.write(src);
        drop(ring);
        block::wake();
        return Ok(nwritten);
    }
}

fn unix_socket_poll(desc: &FileDescription, events: PollEvents) -> PollEvents {
    let Ok(socket) = socket_of(desc.inode()) else {
        return PollEvents::ERR;
    };
    let mut ready = PollEvents::empty();
    if !socket.buf_to_read(desc).lock().is_empty() || !socket.pending.lock().is_empty() {
        ready |= PollEvents::IN;
    }
    if !socket.buf_to_write(desc).lock().is_full() {
        ready |= PollEvents::OUT;
    }
    ready & events
}

fn unix_socket_destroy(inode: &Inode) {
    log::trace!("unix_socket: inode {} destroyed", inode.ino());
}

static SOCKET_OPS: FileOps = FileOps {
    destroy: Some(unix_socket_destroy),
    read: Some(unix_socket_read),
    write: Some(unix_socket_write),
    poll: Some(unix_socket_poll),
    ..FileOps::EMPTY
};
