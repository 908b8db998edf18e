//! Layout of page 1, the metadata page.
//!
//! Page 1 carries only a clean-shutdown check:
//!
//! ```text
//! Offset  Size  Field
//! 100     8     open marker    (random bytes, written at open)
//! 108     8     close marker   (copy of open marker, written at close)
//! ```
//!
//! Opening the engine writes fresh random bytes into the open marker;
//! a clean shutdown copies them into the close marker. On reopen, if
//! the two ranges differ the previous instance died without closing
//! and recovery must run.

use rand::RngCore;

use crate::storage::page::Page;

const OF_OPEN: usize = 100;
const OF_CLOSE: usize = 108;
const MARKER_LEN: usize = 8;

/// Build the initial image of page 1 for a fresh database. The open
/// marker is set; the close marker is left zeroed, so an open-without-
/// close is already distinguishable.
pub fn init_raw() -> Vec<u8> {
    let mut raw = vec![0u8; OF_CLOSE];
    rand::thread_rng().fill_bytes(&mut raw[OF_OPEN..OF_OPEN + MARKER_LEN]);
    raw
}

/// Stamp a fresh open marker. Called on every open.
pub fn set_open(page: &Page) {
    page.mark_dirty();
    let mut data = page.write();
    rand::thread_rng().fill_bytes(&mut data[OF_OPEN..OF_OPEN + MARKER_LEN]);
}

/// Copy the open marker into the close marker. Called on clean close.
pub fn set_close(page: &Page) {
    page.mark_dirty();
    let mut data = page.write();
    let (head, tail) = data.split_at_mut(OF_CLOSE);
    tail[..MARKER_LEN].copy_from_slice(&head[OF_OPEN..OF_OPEN + MARKER_LEN]);
}

/// True when the last shutdown was clean.
pub fn is_clean(page: &Page) -> bool {
    let data = page.read();
    data[OF_OPEN..OF_OPEN + MARKER_LEN] == data[OF_CLOSE..OF_CLOSE + MARKER_LEN]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_page_is_not_clean() {
        let page = Page::new(1, &init_raw());
        assert!(!is_clean(&page));
    }

    #[test]
    fn test_close_marks_clean() {
        let page = Page::new(1, &init_raw());
        set_close(&page);
        assert!(is_clean(&page));
    }

    #[test]
    fn test_reopen_invalidates_close_marker() {
        let page = Page::new(1, &init_raw());
        set_close(&page);
        set_open(&page);
        // 8 random bytes matching the old marker is a 2^-64 event.
        assert!(!is_clean(&page));
    }
}
