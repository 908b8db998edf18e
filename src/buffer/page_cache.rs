//! Page cache over the data file.
//!
//! A [`PageCache`] is a [`RefCache`] whose backing reads and writes
//! 16KB pages of a single file. Callers pin a page with
//! [`get_page`](PageCache::get_page), work on the shared [`Page`], and
//! unpin with [`release_page`](PageCache::release_page); the last unpin
//! flushes the page if it is dirty.
//!
//! Page numbers are 1-based: page N lives at file offset
//! `(N-1) × PAGE_SIZE`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::ref_cache::{Backing, RefCache};
use crate::common::config::{MIN_CACHE_PAGES, PAGE_SIZE};
use crate::common::{Error, Result};
use crate::storage::page::Page;

/// The data file plus the page counter, shared by cache and engine.
pub struct PageFile {
    file: Mutex<File>,
    page_count: AtomicU32,
}

impl PageFile {
    fn read_page(&self, page_no: u32) -> Result<Arc<Page>> {
        if page_no == 0 || page_no > self.page_count.load(Ordering::Acquire) {
            return Err(Error::PageNotFound(page_no));
        }

        let mut buf = vec![0u8; PAGE_SIZE];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_offset(page_no)))?;
        file.read_exact(&mut buf)?;
        Ok(Arc::new(Page::new(page_no, &buf)))
    }

    fn flush(&self, page: &Page) -> Result<()> {
        let data = page.read();
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_offset(page.page_no())))?;
        file.write_all(&data[..])?;
        file.sync_all()?;
        page.clear_dirty();
        Ok(())
    }
}

impl Backing for PageFile {
    type Value = Arc<Page>;

    fn fetch(&self, key: u64) -> Result<Arc<Page>> {
        self.read_page(key as u32)
    }

    fn evict(&self, page: &Arc<Page>) {
        if page.is_dirty() {
            if let Err(e) = self.flush(page) {
                tracing::error!(page_no = page.page_no(), error = %e, "page flush failed");
            }
        }
    }
}

#[inline]
fn page_offset(page_no: u32) -> u64 {
    (page_no as u64 - 1) * PAGE_SIZE as u64
}

/// Reference-counted cache of data file pages.
pub struct PageCache {
    inner: RefCache<PageFile>,
}

impl PageCache {
    /// Create a fresh data file. `memory_budget` is in bytes.
    pub fn create<P: AsRef<Path>>(path: P, memory_budget: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Self::with_file(file, 0, memory_budget)
    }

    /// Open an existing data file. Trailing partial pages (from a torn
    /// extension) are not counted and will be overwritten.
    pub fn open<P: AsRef<Path>>(path: P, memory_budget: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let page_count = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;
        Self::with_file(file, page_count, memory_budget)
    }

    fn with_file(file: File, page_count: u32, memory_budget: usize) -> Result<Self> {
        let capacity = memory_budget / PAGE_SIZE;
        if capacity < MIN_CACHE_PAGES {
            return Err(Error::MemTooSmall);
        }

        Ok(Self {
            inner: RefCache::new(
                PageFile {
                    file: Mutex::new(file),
                    page_count: AtomicU32::new(page_count),
                },
                capacity,
            ),
        })
    }

    /// Allocate a new page with the given initial image and flush it
    /// immediately. The page is not left pinned.
    pub fn new_page(&self, init: &[u8]) -> Result<u32> {
        let backing = self.inner.backing();
        let page_no = backing.page_count.fetch_add(1, Ordering::AcqRel) + 1;
        let page = Page::new(page_no, init);
        backing.flush(&page)?;
        Ok(page_no)
    }

    /// Pin a page. Must be paired with [`release_page`](Self::release_page).
    pub fn get_page(&self, page_no: u32) -> Result<Arc<Page>> {
        self.inner.get(page_no as u64)
    }

    /// Unpin a page; the last unpin writes it back if dirty.
    pub fn release_page(&self, page: &Page) {
        self.inner.release(page.page_no() as u64);
    }

    /// Write a page back immediately, without unpinning it.
    pub fn flush_page(&self, page: &Page) -> Result<()> {
        self.inner.backing().flush(page)
    }

    /// Shrink the file to `max_page_no` pages. Used by recovery to cut
    /// off pages allocated after the last logged write.
    pub fn truncate_to(&self, max_page_no: u32) -> Result<()> {
        let backing = self.inner.backing();
        let file = backing.file.lock();
        file.set_len(max_page_no as u64 * PAGE_SIZE as u64)?;
        file.sync_all()?;
        drop(file);
        backing.page_count.store(max_page_no, Ordering::Release);
        Ok(())
    }

    pub fn page_count(&self) -> u32 {
        self.inner.backing().page_count.load(Ordering::Acquire)
    }

    /// Flush every resident page and drop the cache contents.
    pub fn close(&self) {
        self.inner.close();
    }
}
