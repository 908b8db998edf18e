//! Page - the fundamental 16KB unit of storage.
//!
//! A [`Page`] is a raw 16KB byte array shared between the page cache
//! and its users as `Arc<Page>`. The byte array sits behind an RwLock
//! so record-level readers can overlap; the dirty flag tells the cache
//! whether eviction must write the page back.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::config::PAGE_SIZE;

/// A page of data (16KB).
///
/// # Identity
/// Page numbers are 1-based: page 1 is the metadata page, record pages
/// start at 2. Page N lives at file offset `(N-1) × PAGE_SIZE`.
///
/// # Dirty Tracking
/// Mutating layout helpers mark the page dirty; the cache clears the
/// flag after a successful flush.
pub struct Page {
    page_no: u32,
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
    dirty: AtomicBool,
}

impl Page {
    /// Create a page from an initial image. `init` may be shorter than
    /// a full page; the remainder is zeroed.
    pub fn new(page_no: u32, init: &[u8]) -> Self {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[..init.len()].copy_from_slice(init);
        Self {
            page_no,
            data: RwLock::new(data),
            dirty: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn page_no(&self) -> u32 {
        self.page_no
    }

    /// Lock the page contents for reading.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Lock the page contents for writing. Callers that change bytes
    /// must also call [`mark_dirty`](Page::mark_dirty).
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    #[inline]
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_zero_fills_tail() {
        let page = Page::new(2, &[0xAB, 0xCD]);
        let data = page.read();
        assert_eq!(data[0], 0xAB);
        assert_eq!(data[1], 0xCD);
        assert_eq!(data[2], 0);
        assert_eq!(data[PAGE_SIZE - 1], 0);
    }

    #[test]
    fn test_dirty_flag() {
        let page = Page::new(2, &[]);
        assert!(!page.is_dirty());
        page.mark_dirty();
        assert!(page.is_dirty());
        page.clear_dirty();
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_read_write() {
        let page = Page::new(3, &[]);
        {
            let mut data = page.write();
            data[100] = 0x42;
        }
        assert_eq!(page.read()[100], 0x42);
        assert_eq!(page.page_no(), 3);
    }
}
