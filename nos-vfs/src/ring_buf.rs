//! Fixed-capacity byte ring
//!
//! One slot is always left free to tell "full" from "empty", so a ring of
//! capacity `n` holds at most `n - 1` bytes. Callers wrap the ring in a lock.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{VfsError, VfsResult};

pub struct RingBuf {
    ring: Vec<u8>,
    read_index: usize,
    write_index: usize,
}

impl RingBuf {
    /// Create a ring with `capacity` slots (`capacity >= 2`)
    pub fn new(capacity: usize) -> VfsResult<Self> {
        if capacity < 2 {
            return Err(VfsError::InvalidArgument);
        }
        let mut ring = Vec::new();
        ring.try_reserve_exact(capacity)
            .map_err(|_| VfsError::OutOfMemory)?;
        ring.resize(capacity, 0);
        Ok(Self {
            ring,
            read_index: 0,
            write_index: 0,
        })
    }

    /// Infallible constructor for statically sized rings; `capacity` is clamped to 2
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: vec![0; capacity.max(2)],
            read_index: 0,
            write_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.write_index == self.read_index
    }

    pub fn is_full(&self) -> bool {
        (self.write_index + 1) % self.capacity() == self.read_index
    }

    /// Bytes available to read
    pub fn len(&self) -> usize {
        (self.write_index + self.capacity() - self.read_index) % self.capacity()
    }

    /// Free slots available to write
    pub fn space(&self) -> usize {
        self.capacity() - 1 - self.len()
    }

    /// Move up to `dest.len()` bytes out of the ring
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        let mut nread = 0;
        while nread < dest.len() && !self.is_empty() {
            dest[nread] = self.ring[self.read_index];
            self.read_index = (self.read_index + 1) % self.capacity();
            nread += 1;
        }
        nread
    }

    /// Copy up to `src.len()` bytes into the ring, stopping when full
    pub fn write(&mut self, src: &[u8]) -> usize {
        let mut nwritten = 0;
        while nwritten < src.len() && !self.is_full() {
            self.ring[self.write_index] = src[nwritten];
            self.write_index = (self.write_index + 1) % self.capacity();
            nwritten += 1;
        }
        nwritten
    }

    /// Write every byte, discarding the oldest unread bytes when full
    pub fn write_evicting_oldest(&mut self, src: &[u8]) -> usize {
        for &byte in src {
            self.ring[self.write_index] = byte;
            self.write_index = (self.write_index + 1) % self.capacity();
            if self.write_index == self.read_index {
                self.read_index = (self.read_index + 1) % self.capacity();
            }
        }
        src.len()
    }

    /// Copy unread bytes without consuming them
    pub fn peek_all(&self) -> Vec<u8> {
        let mut out = vec![0; self.len()];
        let mut index = self.read_index;
        for byte in out.iter_mut() {
            *byte = self.ring[index];
            index = (index + 1) % self.capacity();
        }
        out
    }

    pub fn clear(&mut self) {
        self.read_index = 0;
        self.write_index = 0;
    }
}
