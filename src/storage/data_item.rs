//! Data items: the records stored inside record pages.
//!
//! # Record Layout
//! ```text
//! Offset  Size  Field
//! 0       1     valid flag (0 = valid, 1 = invalid)
//! 1       2     payload size, big-endian u16
//! 3       n     payload
//! ```
//!
//! A [`DataItem`] is a view of one record on a pinned page. Mutation
//! goes through [`ItemUpdate`], which snapshots the before-image when
//! opened and either logs the change on commit or restores the
//! before-image when dropped uncommitted — so page bytes never change
//! without a matching log record.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::common::{Error, Result, Uid, Xid};
use crate::storage::engine::StorageEngine;
use crate::storage::page::Page;

pub const OF_VALID: usize = 0;
pub const OF_SIZE: usize = 1;
pub const OF_DATA: usize = 3;

/// A record on a pinned page.
pub struct DataItem {
    uid: Uid,
    page: Arc<Page>,
    offset: usize,
    /// Total record length: header plus payload.
    len: usize,
    /// Record-level latch. Readers share it; an [`ItemUpdate`] holds it
    /// exclusively for the whole before/after protocol.
    latch: RwLock<()>,
}

impl DataItem {
    /// Interpret the record at `uid` on `page`.
    ///
    /// Fails with [`Error::RecordAbsent`] when the offset or the stored
    /// size runs off the page, which means `uid` never named a record.
    pub fn parse(page: Arc<Page>, uid: Uid) -> Result<DataItem> {
        let offset = uid.offset() as usize;
        let page_len = page.read().len();
        if offset + OF_DATA > page_len {
            return Err(Error::RecordAbsent(uid));
        }

        let size = {
            let data = page.read();
            u16::from_be_bytes([data[offset + OF_SIZE], data[offset + OF_SIZE + 1]]) as usize
        };
        let len = OF_DATA + size;
        if offset + len > page_len {
            return Err(Error::RecordAbsent(uid));
        }

        Ok(DataItem {
            uid,
            page,
            offset,
            len,
            latch: RwLock::new(()),
        })
    }

    /// Build the on-page image of a record holding `data`.
    pub fn wrap_raw(data: &[u8]) -> Vec<u8> {
        let mut raw = Vec::with_capacity(OF_DATA + data.len());
        raw.push(0);
        raw.extend_from_slice(&(data.len() as u16).to_be_bytes());
        raw.extend_from_slice(data);
        raw
    }

    #[inline]
    pub fn uid(&self) -> Uid {
        self.uid
    }

    #[inline]
    pub(crate) fn page(&self) -> &Arc<Page> {
        &self.page
    }

    pub fn is_valid(&self) -> bool {
        self.page.read()[self.offset + OF_VALID] == 0
    }

    /// Copy of the payload.
    pub fn data(&self) -> Vec<u8> {
        let _shared = self.latch.read();
        self.page.read()[self.offset + OF_DATA..self.offset + self.len].to_vec()
    }

    /// Copy of the whole record, header included.
    pub fn raw(&self) -> Vec<u8> {
        let _shared = self.latch.read();
        self.raw_unlatched()
    }

    /// Run `f` over the payload under the shared latch.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let _shared = self.latch.read();
        f(&self.page.read()[self.offset + OF_DATA..self.offset + self.len])
    }

    fn raw_unlatched(&self) -> Vec<u8> {
        self.page.read()[self.offset..self.offset + self.len].to_vec()
    }
}

/// An in-progress mutation of one [`DataItem`].
///
/// Created by [`StorageEngine::open_update`]. Holds the record latch
/// exclusively. [`commit`](ItemUpdate::commit) logs the old and new
/// images and keeps the change; dropping the guard without committing
/// rolls the record back to its before-image.
pub struct ItemUpdate<'a> {
    engine: &'a StorageEngine,
    item: &'a DataItem,
    before: Vec<u8>,
    committed: bool,
    _latch: RwLockWriteGuard<'a, ()>,
}

impl<'a> ItemUpdate<'a> {
    pub(crate) fn begin(engine: &'a StorageEngine, item: &'a DataItem) -> ItemUpdate<'a> {
        let latch = item.latch.write();
        item.page.mark_dirty();
        let before = item.raw_unlatched();
        ItemUpdate {
            engine,
            item,
            before,
            committed: false,
            _latch: latch,
        }
    }

    /// Mutate the record payload in place.
    pub fn mutate(&mut self, f: impl FnOnce(&mut [u8])) {
        let mut data = self.item.page.write();
        f(&mut data[self.item.offset + OF_DATA..self.item.offset + self.item.len]);
    }

    /// Log the change and keep it. The update record is durable before
    /// this returns.
    pub fn commit(mut self, xid: Xid) -> Result<()> {
        let after = self.item.raw_unlatched();
        self.engine
            .log_update(xid, self.item.uid, &self.before, &after)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for ItemUpdate<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let mut data = self.item.page.write();
            data[self.item.offset..self.item.offset + self.item.len]
                .copy_from_slice(&self.before);
        }
    }
}
