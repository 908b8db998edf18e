//! Crash recovery: redo resolved transactions, undo interrupted ones.
//!
//! Runs when an opening engine finds page 1's markers mismatched. The
//! log is scanned three times:
//!
//! 1. Find the highest page number any record touches and truncate the
//!    data file there, cutting off pages allocated after the last
//!    logged write.
//! 2. **Redo**: reapply the after-image of every record whose
//!    transaction is resolved (committed or aborted). Aborted work is
//!    physically present but never visible, since its xid never
//!    commits.
//! 3. **Undo**: for each transaction still marked active, walk its
//!    records newest-first restoring before-images (updates) and
//!    marking inserted records invalid (inserts), then mark it aborted.
//!
//! Every step is idempotent, so a crash during recovery just means
//! recovery runs again.

use std::collections::HashMap;

use crate::buffer::page_cache::PageCache;
use crate::common::{Result, Xid};
use crate::concurrency::txn_table::TxnTable;
use crate::recovery::log_record::LogRecord;
use crate::recovery::wal::Wal;
use crate::storage::data_item::OF_VALID;
use crate::storage::page_x;

pub fn recover(txns: &TxnTable, wal: &Wal, pages: &PageCache) -> Result<()> {
    tracing::info!("recovery started");

    let mut max_page = 1u32;
    wal.rewind();
    while let Some(payload) = wal.next()? {
        let Some(record) = LogRecord::decode(&payload) else {
            tracing::warn!("skipping undecodable log record");
            continue;
        };
        max_page = max_page.max(record.page_no());
    }
    pages.truncate_to(max_page)?;

    redo(txns, wal, pages)?;
    undo(txns, wal, pages)?;

    tracing::info!(pages = pages.page_count(), "recovery complete");
    Ok(())
}

fn redo(txns: &TxnTable, wal: &Wal, pages: &PageCache) -> Result<()> {
    wal.rewind();
    while let Some(payload) = wal.next()? {
        let Some(record) = LogRecord::decode(&payload) else {
            continue;
        };
        if txns.is_active(record.xid())? {
            continue;
        }
        match record {
            LogRecord::Insert {
                page_no,
                offset,
                raw,
                ..
            } => {
                let page = pages.get_page(page_no)?;
                page_x::recover_insert(&page, &raw, offset);
                pages.release_page(&page);
            }
            LogRecord::Update { uid, new, .. } => {
                let page = pages.get_page(uid.page_no())?;
                page_x::recover_update(&page, &new, uid.offset());
                pages.release_page(&page);
            }
        }
    }
    Ok(())
}

fn undo(txns: &TxnTable, wal: &Wal, pages: &PageCache) -> Result<()> {
    let mut interrupted: HashMap<Xid, Vec<LogRecord>> = HashMap::new();

    wal.rewind();
    while let Some(payload) = wal.next()? {
        let Some(record) = LogRecord::decode(&payload) else {
            continue;
        };
        if txns.is_active(record.xid())? {
            interrupted.entry(record.xid()).or_default().push(record);
        }
    }

    for (xid, records) in &interrupted {
        for record in records.iter().rev() {
            match record {
                LogRecord::Insert {
                    page_no,
                    offset,
                    raw,
                    ..
                } => {
                    // An insert is undone by rewriting the record with
                    // its valid flag cleared; the space is not reclaimed.
                    let mut raw = raw.clone();
                    raw[OF_VALID] = 1;
                    let page = pages.get_page(*page_no)?;
                    page_x::recover_insert(&page, &raw, *offset);
                    pages.release_page(&page);
                }
                LogRecord::Update { uid, old, .. } => {
                    let page = pages.get_page(uid.page_no())?;
                    page_x::recover_update(&page, old, uid.offset());
                    pages.release_page(&page);
                }
            }
        }
        txns.abort(*xid)?;
        tracing::debug!(xid = %xid, records = records.len(), "rolled back interrupted transaction");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    use crate::common::config::{MIN_CACHE_PAGES, PAGE_SIZE};
    use crate::common::Uid;
    use crate::storage::data_item::DataItem;
    use crate::storage::page_one;

    const TEST_BUDGET: usize = MIN_CACHE_PAGES * PAGE_SIZE;

    struct Fixture {
        txns: TxnTable,
        wal: Wal,
        pages: PageCache,
    }

    /// A database with page 1 and one empty record page, no records.
    fn create_fixture(dir: &Path) -> Fixture {
        let txns = TxnTable::create(dir.join("test.xid")).unwrap();
        let wal = Wal::create(dir.join("test.log")).unwrap();
        let pages = PageCache::create(dir.join("test.db"), TEST_BUDGET).unwrap();
        pages.new_page(&page_one::init_raw()).unwrap();
        pages.new_page(&page_x::init_raw()).unwrap();
        Fixture { txns, wal, pages }
    }

    fn log_insert(fx: &Fixture, xid: Xid, offset: u16, data: &[u8]) -> Vec<u8> {
        let raw = DataItem::wrap_raw(data);
        let record = LogRecord::Insert {
            xid,
            page_no: 2,
            offset,
            raw: raw.clone(),
        };
        fx.wal.log(&record.encode()).unwrap();
        raw
    }

    #[test]
    fn test_redo_reapplies_committed_insert() {
        let dir = tempdir().unwrap();
        let fx = create_fixture(dir.path());

        let xid = fx.txns.begin().unwrap();
        // Logged and committed, but never applied to the page.
        let raw = log_insert(&fx, xid, 2, b"hello");
        fx.txns.commit(xid).unwrap();

        recover(&fx.txns, &fx.wal, &fx.pages).unwrap();

        let page = fx.pages.get_page(2).unwrap();
        assert_eq!(page_x::fso(&page), 2 + raw.len() as u16);
        let item = DataItem::parse(page, Uid::new(2, 2)).unwrap();
        assert!(item.is_valid());
        assert_eq!(item.data(), b"hello");
    }

    #[test]
    fn test_undo_invalidates_active_insert() {
        let dir = tempdir().unwrap();
        let fx = create_fixture(dir.path());

        let xid = fx.txns.begin().unwrap();
        let raw = log_insert(&fx, xid, 2, b"doomed");
        // Applied to the page, transaction never resolved.
        let page = fx.pages.get_page(2).unwrap();
        page_x::insert(&page, &raw);
        fx.pages.release_page(&page);

        recover(&fx.txns, &fx.wal, &fx.pages).unwrap();

        assert!(fx.txns.is_aborted(xid).unwrap());
        let page = fx.pages.get_page(2).unwrap();
        let item = DataItem::parse(page, Uid::new(2, 2)).unwrap();
        assert!(!item.is_valid());
    }

    #[test]
    fn test_undo_restores_update_before_image() {
        let dir = tempdir().unwrap();
        let fx = create_fixture(dir.path());

        let committed = fx.txns.begin().unwrap();
        let old_raw = log_insert(&fx, committed, 2, b"vvvv");
        let page = fx.pages.get_page(2).unwrap();
        page_x::insert(&page, &old_raw);
        fx.pages.release_page(&page);
        fx.txns.commit(committed).unwrap();

        // An interrupted transaction overwrote the payload in place.
        let active = fx.txns.begin().unwrap();
        let new_raw = DataItem::wrap_raw(b"wwww");
        let record = LogRecord::Update {
            xid: active,
            uid: Uid::new(2, 2),
            old: old_raw.clone(),
            new: new_raw.clone(),
        };
        fx.wal.log(&record.encode()).unwrap();
        let page = fx.pages.get_page(2).unwrap();
        page_x::recover_update(&page, &new_raw, 2);
        fx.pages.release_page(&page);

        recover(&fx.txns, &fx.wal, &fx.pages).unwrap();

        let page = fx.pages.get_page(2).unwrap();
        let item = DataItem::parse(page, Uid::new(2, 2)).unwrap();
        assert_eq!(item.data(), b"vvvv");
        assert!(fx.txns.is_aborted(active).unwrap());
    }

    #[test]
    fn test_truncates_unlogged_pages() {
        let dir = tempdir().unwrap();
        let fx = create_fixture(dir.path());

        // Pages 3 and 4 were allocated but nothing logged touches them.
        fx.pages.new_page(&page_x::init_raw()).unwrap();
        fx.pages.new_page(&page_x::init_raw()).unwrap();

        let xid = fx.txns.begin().unwrap();
        log_insert(&fx, xid, 2, b"on page two");
        fx.txns.commit(xid).unwrap();

        recover(&fx.txns, &fx.wal, &fx.pages).unwrap();
        assert_eq!(fx.pages.page_count(), 2);
    }

    #[test]
    fn test_recovery_is_idempotent() {
        let dir = tempdir().unwrap();
        let fx = create_fixture(dir.path());

        let xid = fx.txns.begin().unwrap();
        log_insert(&fx, xid, 2, b"twice");
        fx.txns.commit(xid).unwrap();

        recover(&fx.txns, &fx.wal, &fx.pages).unwrap();
        recover(&fx.txns, &fx.wal, &fx.pages).unwrap();

        let page = fx.pages.get_page(2).unwrap();
        let item = DataItem::parse(page, Uid::new(2, 2)).unwrap();
        assert_eq!(item.data(), b"twice");
    }
}
