//! Free-space index over record pages.
//!
//! Pages are bucketed by how much free space they have, in units of
//! `PAGE_SIZE / BUCKETS`. Inserting a record takes the first page from
//! the first bucket that guarantees a fit; the page is checked out of
//! the index while it is being written and re-registered afterward
//! with its new free space, so two inserts never race on one page.

use parking_lot::Mutex;

use crate::common::config::PAGE_SIZE;

/// Number of free-space buckets.
const BUCKETS: usize = 40;

/// Bucket granularity in bytes.
const THRESHOLD: usize = PAGE_SIZE / BUCKETS;

/// A page checked out of the index, with the free space it had when it
/// was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlot {
    pub page_no: u32,
    pub free: usize,
}

/// In-memory index from free-space bucket to candidate pages.
///
/// Rebuilt from the data file on every open; never persisted.
pub struct FreeSpaceIndex {
    buckets: Mutex<Vec<Vec<PageSlot>>>,
}

impl FreeSpaceIndex {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(vec![Vec::new(); BUCKETS + 1]),
        }
    }

    /// Register (or re-register) a page with `free` bytes available.
    pub fn add(&self, page_no: u32, free: usize) {
        let bucket = free / THRESHOLD;
        self.buckets.lock()[bucket].push(PageSlot { page_no, free });
    }

    /// Check out a page guaranteed to hold `need` bytes, if any.
    ///
    /// Rounds `need` up to a whole bucket, so the match is conservative:
    /// a returned page always fits, but a page with barely enough space
    /// in a lower bucket may be passed over. Requests past the last
    /// bucket boundary start in the top bucket, where the per-slot size
    /// check decides.
    pub fn select(&self, need: usize) -> Option<PageSlot> {
        let mut buckets = self.buckets.lock();
        let mut bucket = need / THRESHOLD;
        if need % THRESHOLD != 0 {
            bucket += 1;
        }
        bucket = bucket.min(BUCKETS);
        while bucket <= BUCKETS {
            if let Some(at) = buckets[bucket].iter().position(|s| s.free >= need) {
                return Some(buckets[bucket].remove(at));
            }
            bucket += 1;
        }
        None
    }
}

impl Default for FreeSpaceIndex {
    fn default() -> Self {
        Self::new()
    }
}
