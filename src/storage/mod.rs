//! On-disk layouts and the storage engine facade.

pub mod data_item;
pub mod engine;
pub mod free_space;
pub mod page;
pub mod page_one;
pub mod page_x;

pub use data_item::{DataItem, ItemUpdate};
pub use engine::StorageEngine;
pub use free_space::FreeSpaceIndex;
pub use page::Page;
