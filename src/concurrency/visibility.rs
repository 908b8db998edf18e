//! Visibility predicates.
//!
//! Pure functions over a version's stamps (`xmin`, `xmax`) and the
//! reading transaction. A version is a candidate when its creator is
//! resolved in the reader's favor and its deleter — if any — is not.
//!
//! `xmax == 0` means the version has not been deleted.

use crate::common::{Result, Xid, SUPER_XID};
use crate::concurrency::transaction::{IsolationLevel, Transaction};
use crate::concurrency::txn_table::TxnTable;

/// Is the version `(xmin, xmax)` visible to `t`?
pub fn is_visible(txns: &TxnTable, t: &Transaction, xmin: Xid, xmax: Xid) -> Result<bool> {
    match t.level {
        IsolationLevel::ReadCommitted => read_committed(txns, t, xmin, xmax),
        IsolationLevel::RepeatableRead => repeatable_read(txns, t, xmin, xmax),
    }
}

fn read_committed(txns: &TxnTable, t: &Transaction, xmin: Xid, xmax: Xid) -> Result<bool> {
    // Our own pending insert, not yet deleted by us.
    if xmin == t.xid && xmax == SUPER_XID {
        return Ok(true);
    }

    if txns.is_committed(xmin)? {
        // Created by a committed transaction, and either never deleted
        // or deleted by someone whose delete has not committed.
        if xmax == SUPER_XID {
            return Ok(true);
        }
        if xmax != t.xid && !txns.is_committed(xmax)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn repeatable_read(txns: &TxnTable, t: &Transaction, xmin: Xid, xmax: Xid) -> Result<bool> {
    if xmin == t.xid && xmax == SUPER_XID {
        return Ok(true);
    }

    // The creator must have committed before we began: committed now,
    // assigned an earlier xid, and not active in our snapshot.
    if txns.is_committed(xmin)? && xmin < t.xid && !t.in_snapshot(xmin) {
        if xmax == SUPER_XID {
            return Ok(true);
        }
        // A delete hides the version only if it also happened before
        // we began; later or in-snapshot deleters don't count.
        if xmax != t.xid
            && (!txns.is_committed(xmax)? || xmax > t.xid || t.in_snapshot(xmax))
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Would deleting a version with this `xmax` skip over a committed
/// newer version `t` cannot see?
///
/// Only repeatable read can skip: read committed always deletes the
/// latest committed version.
pub fn is_version_skip(txns: &TxnTable, t: &Transaction, xmax: Xid) -> Result<bool> {
    if t.level == IsolationLevel::ReadCommitted {
        return Ok(false);
    }
    Ok(txns.is_committed(xmax)? && (xmax > t.xid || t.in_snapshot(xmax)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn table() -> (tempfile::TempDir, TxnTable) {
        let dir = tempdir().unwrap();
        let table = TxnTable::create(dir.path().join("test.xid")).unwrap();
        (dir, table)
    }

    fn txn(xid: Xid, level: IsolationLevel) -> Transaction {
        Transaction::new(xid, level, &HashMap::new())
    }

    #[test]
    fn test_own_insert_is_visible() {
        let (_d, txns) = table();
        let me = txns.begin().unwrap();

        let t = txn(me, IsolationLevel::ReadCommitted);
        assert!(is_visible(&txns, &t, me, SUPER_XID).unwrap());

        let t = txn(me, IsolationLevel::RepeatableRead);
        assert!(is_visible(&txns, &t, me, SUPER_XID).unwrap());
    }

    #[test]
    fn test_read_committed_sees_committed_only() {
        let (_d, txns) = table();
        let writer = txns.begin().unwrap();
        let me = txns.begin().unwrap();
        let t = txn(me, IsolationLevel::ReadCommitted);

        assert!(!is_visible(&txns, &t, writer, SUPER_XID).unwrap());
        txns.commit(writer).unwrap();
        assert!(is_visible(&txns, &t, writer, SUPER_XID).unwrap());
    }

    #[test]
    fn test_uncommitted_delete_does_not_hide() {
        let (_d, txns) = table();
        let deleter = txns.begin().unwrap();
        let me = txns.begin().unwrap();
        let t = txn(me, IsolationLevel::ReadCommitted);

        // Version created by the bootstrap xid, delete still pending.
        assert!(is_visible(&txns, &t, SUPER_XID, deleter).unwrap());
        txns.commit(deleter).unwrap();
        assert!(!is_visible(&txns, &t, SUPER_XID, deleter).unwrap());
    }

    #[test]
    fn test_own_delete_hides_version() {
        let (_d, txns) = table();
        let me = txns.begin().unwrap();

        for level in [IsolationLevel::ReadCommitted, IsolationLevel::RepeatableRead] {
            let t = txn(me, level);
            assert!(!is_visible(&txns, &t, SUPER_XID, me).unwrap());
        }
    }

    #[test]
    fn test_repeatable_read_ignores_later_commits() {
        let (_d, txns) = table();
        let me = txns.begin().unwrap();
        let later = txns.begin().unwrap();
        txns.commit(later).unwrap();

        let t = txn(me, IsolationLevel::RepeatableRead);
        // Committed, but with a higher xid than ours.
        assert!(!is_visible(&txns, &t, later, SUPER_XID).unwrap());
        // Read committed would see it.
        let t = txn(me, IsolationLevel::ReadCommitted);
        assert!(is_visible(&txns, &t, later, SUPER_XID).unwrap());
    }

    #[test]
    fn test_repeatable_read_ignores_snapshot_members() {
        let (_d, txns) = table();
        let early = txns.begin().unwrap();

        let mut active = HashMap::new();
        active.insert(
            early,
            Arc::new(Transaction::new(
                early,
                IsolationLevel::ReadCommitted,
                &HashMap::new(),
            )),
        );
        let me = txns.begin().unwrap();
        let t = Transaction::new(me, IsolationLevel::RepeatableRead, &active);

        txns.commit(early).unwrap();
        // Lower xid and committed, but it was active when we began.
        assert!(!is_visible(&txns, &t, early, SUPER_XID).unwrap());
    }

    #[test]
    fn test_repeatable_read_delete_after_snapshot_is_ignored() {
        let (_d, txns) = table();
        let me = txns.begin().unwrap();
        let deleter = txns.begin().unwrap();
        txns.commit(deleter).unwrap();

        let t = txn(me, IsolationLevel::RepeatableRead);
        // Deleted by a later transaction: still visible to us.
        assert!(is_visible(&txns, &t, SUPER_XID, deleter).unwrap());
    }

    #[test]
    fn test_version_skip() {
        let (_d, txns) = table();
        let me = txns.begin().unwrap();
        let later = txns.begin().unwrap();
        txns.commit(later).unwrap();

        let t = txn(me, IsolationLevel::RepeatableRead);
        assert!(is_version_skip(&txns, &t, later).unwrap());
        // No delete at all: nothing to skip.
        assert!(!is_version_skip(&txns, &t, SUPER_XID).unwrap());

        // Read committed never reports a skip.
        let t = txn(me, IsolationLevel::ReadCommitted);
        assert!(!is_version_skip(&txns, &t, later).unwrap());
    }
}
