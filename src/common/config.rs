//! Configuration constants for StrataDB.

/// Size of a page in bytes (16KB).
///
/// Larger than the 4KB OS page because records are slotted into pages
/// through a free-space index: bigger pages mean fewer allocations for
/// the same record volume, and 16-bit in-page offsets still have
/// headroom (2^16 = 65536 > 16384).
///
/// # Memory Layout
/// With 16KB pages and 32-bit page numbers:
/// - Max pages: 2^32 = 4,294,967,296 pages
/// - Max database size: 4,294,967,296 × 16KB = 64TB
pub const PAGE_SIZE: usize = 16384;

/// Minimum number of pages the page cache must be able to hold.
///
/// A memory budget below `MIN_CACHE_PAGES * PAGE_SIZE` is rejected at
/// engine construction.
pub const MIN_CACHE_PAGES: usize = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert_eq!(PAGE_SIZE, 16384);
    }

    #[test]
    fn test_in_page_offsets_fit_in_u16() {
        assert!(PAGE_SIZE <= u16::MAX as usize + 1);
    }
}
