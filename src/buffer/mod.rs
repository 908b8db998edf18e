//! Reference-counted caching.

pub mod page_cache;
pub mod ref_cache;

pub use page_cache::PageCache;
pub use ref_cache::{Backing, RefCache};
