//! Versioned records.
//!
//! An [`Entry`] is the MVCC view of a stored record. Its payload (the
//! data item payload) is:
//!
//! ```text
//! Offset  Size  Field
//! 0       8     xmin — xid that created this version, big-endian
//! 8       8     xmax — xid that deleted it (0 = live), big-endian
//! 16      n     user data
//! ```
//!
//! `xmin` and the data are immutable once written. Only `xmax` ever
//! changes, and only through the logged before/after protocol, so
//! deletion is crash-safe like any other update.

use std::sync::Arc;

use crate::common::{Result, Uid, Xid};
use crate::storage::data_item::DataItem;
use crate::storage::engine::StorageEngine;

const OF_XMIN: usize = 0;
const OF_XMAX: usize = 8;
const OF_DATA: usize = 16;

/// A versioned record pinned in the storage engine.
pub struct Entry {
    uid: Uid,
    item: Arc<DataItem>,
}

impl Entry {
    pub fn new(uid: Uid, item: Arc<DataItem>) -> Entry {
        Entry { uid, item }
    }

    /// Build the payload image for a record created by `xid`.
    pub fn wrap_raw(xid: Xid, data: &[u8]) -> Vec<u8> {
        let mut raw = Vec::with_capacity(OF_DATA + data.len());
        raw.extend_from_slice(&xid.0.to_be_bytes());
        raw.extend_from_slice(&0u64.to_be_bytes());
        raw.extend_from_slice(data);
        raw
    }

    #[inline]
    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn xmin(&self) -> Xid {
        self.item.with_data(|d| read_xid(d, OF_XMIN))
    }

    pub fn xmax(&self) -> Xid {
        self.item.with_data(|d| read_xid(d, OF_XMAX))
    }

    /// Copy of the user data.
    pub fn data(&self) -> Vec<u8> {
        self.item.with_data(|d| d[OF_DATA..].to_vec())
    }

    /// Stamp this version as deleted by `xid`, through the logged
    /// before/after protocol.
    pub fn set_xmax(&self, engine: &StorageEngine, xid: Xid) -> Result<()> {
        let mut update = engine.open_update(&self.item);
        update.mutate(|payload| {
            payload[OF_XMAX..OF_XMAX + 8].copy_from_slice(&xid.0.to_be_bytes());
        });
        update.commit(xid)
    }
}

fn read_xid(payload: &[u8], offset: usize) -> Xid {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&payload[offset..offset + 8]);
    Xid(u64::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::Page;
    use crate::storage::page_x;

    #[test]
    fn test_wrap_raw_layout() {
        let raw = Entry::wrap_raw(Xid(7), b"abc");
        assert_eq!(raw.len(), 19);
        assert_eq!(raw[..8], 7u64.to_be_bytes());
        assert_eq!(raw[8..16], [0; 8]);
        assert_eq!(&raw[16..], b"abc");
    }

    #[test]
    fn test_field_access() {
        let page = Arc::new(Page::new(2, &page_x::init_raw()));
        let wrapped = DataItem::wrap_raw(&Entry::wrap_raw(Xid(7), b"abc"));
        let offset = page_x::insert(&page, &wrapped);

        let item = DataItem::parse(page, Uid::new(2, offset)).unwrap();
        let entry = Entry::new(item.uid(), Arc::new(item));

        assert_eq!(entry.xmin(), Xid(7));
        assert_eq!(entry.xmax(), Xid(0));
        assert_eq!(entry.data(), b"abc");
    }
}
