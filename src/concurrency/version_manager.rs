//! The version manager: MVCC over the storage engine.
//!
//! Hands out transactions, applies the visibility rules on read, and
//! serializes deletes of the same record through the lock table. When
//! the engine has to abort a transaction itself (deadlock victim or
//! version skip), the failing statement gets
//! [`ConcurrentUpdate`](crate::common::Error::ConcurrentUpdate); from
//! then on the xid no longer names an active transaction, so later
//! operations fail with
//! [`NoSuchTransaction`](crate::common::Error::NoSuchTransaction). The
//! caller is still expected to call [`VersionManager::abort`] to retire
//! its handle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::ref_cache::{Backing, RefCache};
use crate::common::{Error, Result, Uid, Xid, SUPER_XID};
use crate::concurrency::entry::Entry;
use crate::concurrency::lock_table::LockTable;
use crate::concurrency::transaction::{IsolationLevel, Transaction};
use crate::concurrency::txn_table::TxnTable;
use crate::concurrency::visibility;
use crate::storage::engine::StorageEngine;

/// Minimum item payload that can carry the xmin/xmax stamps.
const MIN_ENTRY_LEN: usize = 16;

/// Loads [`Entry`]s by uid through the storage engine. Each resident
/// entry pins its data item; eviction releases it.
struct EntryStore {
    engine: Arc<StorageEngine>,
}

impl Backing for EntryStore {
    type Value = Arc<Entry>;

    fn fetch(&self, key: u64) -> Result<Arc<Entry>> {
        let uid = Uid(key);
        let Some(item) = self.engine.read_item(uid)? else {
            return Err(Error::RecordAbsent(uid));
        };
        if item.with_data(|d| d.len()) < MIN_ENTRY_LEN {
            self.engine.release_item(uid);
            return Err(Error::RecordAbsent(uid));
        }
        Ok(Arc::new(Entry::new(uid, item)))
    }

    fn evict(&self, entry: &Arc<Entry>) {
        self.engine.release_item(entry.uid());
    }
}

/// MVCC transaction coordinator.
pub struct VersionManager {
    txns: Arc<TxnTable>,
    engine: Arc<StorageEngine>,
    entries: RefCache<EntryStore>,
    active: Mutex<HashMap<Xid, Arc<Transaction>>>,
    locks: LockTable,
}

impl VersionManager {
    pub fn new(txns: Arc<TxnTable>, engine: Arc<StorageEngine>) -> VersionManager {
        let mut active = HashMap::new();
        active.insert(SUPER_XID, Arc::new(Transaction::bootstrap()));

        VersionManager {
            txns,
            entries: RefCache::new(
                EntryStore {
                    engine: Arc::clone(&engine),
                },
                0,
            ),
            engine,
            active: Mutex::new(active),
            locks: LockTable::new(),
        }
    }

    /// Start a transaction at the given isolation level.
    ///
    /// The active map stays locked across xid assignment and snapshot
    /// capture, so no transaction can slip between a sibling's begin
    /// and its snapshot.
    pub fn begin(&self, level: IsolationLevel) -> Result<Xid> {
        let mut active = self.active.lock();
        let xid = self.txns.begin()?;
        let t = Arc::new(Transaction::new(xid, level, &active));
        active.insert(xid, t);
        tracing::debug!(xid = %xid, ?level, "transaction started");
        Ok(xid)
    }

    /// Read the record at `uid` as seen by `xid`. `Ok(None)` when the
    /// record does not exist or no version is visible.
    pub fn read(&self, xid: Xid, uid: Uid) -> Result<Option<Vec<u8>>> {
        let t = self.transaction(xid)?;

        let entry = match self.entries.get(uid.0) {
            Ok(entry) => entry,
            Err(Error::RecordAbsent(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let result = (|| {
            if visibility::is_visible(&self.txns, &t, entry.xmin(), entry.xmax())? {
                Ok(Some(entry.data()))
            } else {
                Ok(None)
            }
        })();
        self.entries.release(uid.0);
        result
    }

    /// Insert a record on behalf of `xid`, returning its uid.
    pub fn insert(&self, xid: Xid, data: &[u8]) -> Result<Uid> {
        let t = self.transaction(xid)?;
        let raw = Entry::wrap_raw(t.xid, data);
        self.engine.insert(xid, &raw)
    }

    /// Delete the record at `uid`.
    ///
    /// Returns `Ok(false)` when there is nothing for this transaction
    /// to delete: no visible version, or already deleted by `xid`.
    pub fn delete(&self, xid: Xid, uid: Uid) -> Result<bool> {
        let t = self.transaction(xid)?;

        let entry = match self.entries.get(uid.0) {
            Ok(entry) => entry,
            Err(Error::RecordAbsent(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let result = self.delete_entry(&t, &entry, uid);
        self.entries.release(uid.0);
        result
    }

    fn delete_entry(&self, t: &Transaction, entry: &Entry, uid: Uid) -> Result<bool> {
        if !visibility::is_visible(&self.txns, t, entry.xmin(), entry.xmax())? {
            return Ok(false);
        }

        match self.locks.acquire(t.xid, uid) {
            Ok(None) => {}
            Ok(Some(handle)) => handle.wait(),
            Err(_) => {
                tracing::debug!(xid = %t.xid, uid = %uid, "deadlock victim, aborting");
                self.auto_abort(t)?;
                return Err(Error::ConcurrentUpdate(t.xid));
            }
        }

        // The lock wait may have outlasted a competing delete.
        if entry.xmax() == t.xid {
            return Ok(false);
        }
        if visibility::is_version_skip(&self.txns, t, entry.xmax())? {
            tracing::debug!(xid = %t.xid, uid = %uid, "version skip, aborting");
            self.auto_abort(t)?;
            return Err(Error::ConcurrentUpdate(t.xid));
        }

        entry.set_xmax(&self.engine, t.xid)?;
        Ok(true)
    }

    /// Commit `xid`. Fails with `NoSuchTransaction` if the xid is
    /// unknown or was already aborted by the engine.
    pub fn commit(&self, xid: Xid) -> Result<()> {
        let t = self.transaction(xid)?;

        self.active.lock().remove(&xid);
        self.locks.release_all(xid);
        self.txns.commit(t.xid)?;
        tracing::debug!(xid = %xid, "transaction committed");
        Ok(())
    }

    /// Abort `xid`. Always succeeds for a known transaction, including
    /// one the engine already auto-aborted.
    pub fn abort(&self, xid: Xid) -> Result<()> {
        let Some(t) = self.active.lock().remove(&xid) else {
            return Err(Error::NoSuchTransaction(xid));
        };
        if t.auto_aborted() {
            // Locks and durable status were already handled when the
            // engine aborted it; this call just retires the handle.
            return Ok(());
        }
        self.locks.release_all(xid);
        self.txns.abort(xid)?;
        tracing::debug!(xid = %xid, "transaction aborted");
        Ok(())
    }

    /// Abort on the engine's initiative, keeping the transaction in
    /// the active map so the caller still holds a (poisoned) handle.
    fn auto_abort(&self, t: &Transaction) -> Result<()> {
        t.set_conflicted();
        self.locks.release_all(t.xid);
        self.txns.abort(t.xid)?;
        t.set_auto_aborted();
        Ok(())
    }

    fn transaction(&self, xid: Xid) -> Result<Arc<Transaction>> {
        let t = self
            .active
            .lock()
            .get(&xid)
            .cloned()
            .ok_or(Error::NoSuchTransaction(xid))?;
        if t.conflicted() {
            // Auto-aborted: the xid no longer names an active
            // transaction, even though the handle is still held.
            return Err(Error::NoSuchTransaction(xid));
        }
        Ok(t)
    }
}
