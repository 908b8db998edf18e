//! Common types and constants shared across the engine.

pub mod config;
pub mod error;
pub mod uid;

pub use config::{MIN_CACHE_PAGES, PAGE_SIZE};
pub use error::{Error, Result};
pub use uid::{Uid, Xid, SUPER_XID};
