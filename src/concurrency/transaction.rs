//! In-memory transaction state.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::common::{Xid, SUPER_XID};

/// Isolation level of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Sees the latest committed version of every record.
    ReadCommitted,
    /// Sees the database as of its own start; transactions active at
    /// begin stay invisible even after they commit.
    RepeatableRead,
}

/// A live transaction known to the version manager.
pub struct Transaction {
    pub xid: Xid,
    pub level: IsolationLevel,
    /// Xids active when this transaction began. Only kept under
    /// repeatable read.
    snapshot: Option<HashSet<Xid>>,
    /// Set when the engine aborts the transaction (deadlock or version
    /// skip); every later operation fails until the caller aborts.
    conflicted: AtomicBool,
    /// Set once the engine-side abort bookkeeping has run, so the
    /// caller's own abort does not repeat it.
    auto_aborted: AtomicBool,
}

impl Transaction {
    pub(crate) fn new(
        xid: Xid,
        level: IsolationLevel,
        active: &HashMap<Xid, Arc<Transaction>>,
    ) -> Transaction {
        let snapshot = match level {
            IsolationLevel::ReadCommitted => None,
            IsolationLevel::RepeatableRead => Some(active.keys().copied().collect()),
        };
        Transaction {
            xid,
            level,
            snapshot,
            conflicted: AtomicBool::new(false),
            auto_aborted: AtomicBool::new(false),
        }
    }

    /// The implicit bootstrap transaction backing [`SUPER_XID`].
    pub(crate) fn bootstrap() -> Transaction {
        Transaction {
            xid: SUPER_XID,
            level: IsolationLevel::ReadCommitted,
            snapshot: None,
            conflicted: AtomicBool::new(false),
            auto_aborted: AtomicBool::new(false),
        }
    }

    /// Was `xid` active when this transaction began?
    ///
    /// [`SUPER_XID`] is never in a snapshot: its writes predate every
    /// transaction.
    pub fn in_snapshot(&self, xid: Xid) -> bool {
        if xid == SUPER_XID {
            return false;
        }
        self.snapshot.as_ref().is_some_and(|s| s.contains(&xid))
    }

    pub fn conflicted(&self) -> bool {
        self.conflicted.load(Ordering::Acquire)
    }

    pub(crate) fn set_conflicted(&self) {
        self.conflicted.store(true, Ordering::Release);
    }

    pub fn auto_aborted(&self) -> bool {
        self.auto_aborted.load(Ordering::Acquire)
    }

    pub(crate) fn set_auto_aborted(&self) {
        self.auto_aborted.store(true, Ordering::Release);
    }
}
