//! Anonymous memory regions backing in-memory files
//!
//! A region is a list of shared, zero-filled pages. Growing a region maps the
//! existing pages into the larger range and appends fresh ones, so mappings
//! handed out earlier keep observing the same bytes.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::RwLock;

use crate::error::{VfsError, VfsResult};

/// Round `value` up to a multiple of `align` (a power of two)
#[inline]
pub const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// One page of anonymous memory
pub struct Page {
    data: RwLock<Box<[u8]>>,
}

pub type PageRef = Arc<Page>;

impl Page {
    fn zeroed(page_size: usize) -> PageRef {
        Arc::new(Self {
            data: RwLock::new(vec![0u8; page_size].into_boxed_slice()),
        })
    }
}

/// Growable page-granular buffer
pub struct AnonRegion {
    pages: Vec<PageRef>,
    page_size: usize,
}

impl AnonRegion {
    pub const fn new(page_size: usize) -> Self {
        Self {
            pages: Vec::new(),
            page_size,
        }
    }

    pub fn capacity(&self) -> usize {
        self.pages.len() * self.page_size
    }

    /// Grow to hold at least `requested` bytes.
    ///
    /// New capacity is the larger of twice the current capacity and the
    /// request, rounded up to the page size. Added pages are zero-filled.
    pub fn grow(&mut self, requested: usize) -> VfsResult<()> {
        let new_capacity = round_up(
            core::cmp::max(self.capacity() * 2, requested),
            self.page_size,
        );
        let new_pages = (new_capacity - self.capacity()) / self.page_size;
        self.pages
            .try_reserve(new_pages)
            .map_err(|_| VfsError::OutOfMemory)?;
        for _ in 0..new_pages {
            self.pages.push(Page::zeroed(self.page_size));
        }
        Ok(())
    }

    /// Copy bytes at `offset` into `buf`. The range must lie within capacity.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) {
        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done;
            let in_page = pos % self.page_size;
            let chunk = core::cmp::min(self.page_size - in_page, buf.len() - done);
            let page = self.pages[pos / self.page_size].data.read();
            buf[done..done + chunk].copy_from_slice(&page[in_page..in_page + chunk]);
            done += chunk;
        }
    }

    /// Copy `buf` into the region at `offset`. The range must lie within capacity.
    pub fn write_at(&self, offset: usize, buf: &[u8]) {
        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done;
            let in_page = pos % self.page_size;
            let chunk = core::cmp::min(self.page_size - in_page, buf.len() - done);
            let mut page = self.pages[pos / self.page_size].data.write();
            page[in_page..in_page + chunk].copy_from_slice(&buf[done..done + chunk]);
            done += chunk;
        }
    }

    /// Zero the bytes in `start..end`
    pub fn zero_range(&self, start: usize, end: usize) {
        let mut pos = start;
        while pos < end {
            let in_page = pos % self.page_size;
            let chunk = core::cmp::min(self.page_size - in_page, end - pos);
            let mut page = self.pages[pos / self.page_size].data.write();
            page[in_page..in_page + chunk].fill(0);
            pos += chunk;
        }
    }

    /// Share the pages covering the first `length` bytes at address `addr`
    pub fn share(&self, addr: usize, length: usize) -> Mapping {
        let npages = round_up(length, self.page_size) / self.page_size;
        Mapping {
            addr,
            length,
            page_size: self.page_size,
            pages: self.pages[..npages].to_vec(),
        }
    }
}

/// Shared mapping of a region's pages
pub struct Mapping {
    pub addr: usize,
    pub length: usize,
    page_size: usize,
    pages: Vec<PageRef>,
}

impl Mapping {
    /// Read a byte through the mapping
    pub fn load(&self, offset: usize) -> VfsResult<u8> {
        if offset >= self.length {
            return Err(VfsError::InvalidArgument);
        }
        Ok(self.pages[offset / self.page_size].data.read()[offset % self.page_size])
    }

    /// Write a byte through the mapping
    pub fn store(&self, offset: usize, value: u8) -> VfsResult<()> {
        if offset >= self.length {
            return Err(VfsError::InvalidArgument);
        }
        self.pages[offset / self.page_size].data.write()[offset % self.page_size] = value;
        Ok(())
    }
}

impl core::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mapping")
            .field("addr", &self.addr)
            .field("length", &self.length)
            .finish()
    }
}
