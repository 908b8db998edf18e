//! Record lock table with deadlock detection.
//!
//! Writers take an exclusive lock per uid before stamping a delete.
//! Conflicting requests queue FIFO per uid; the requester blocks on a
//! [`WaitHandle`] outside the table mutex. Before a request is allowed
//! to wait, the wait-for graph (transaction → awaited uid → owning
//! transaction) is checked for a cycle; if adding the edge would close
//! one, the request is refused with [`DeadlockError`] and the caller
//! aborts the requesting transaction.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::common::{Uid, Xid};

/// Granting a lock to this requester would deadlock.
#[derive(Debug, thiserror::Error)]
#[error("deadlock detected")]
pub struct DeadlockError;

/// What a blocked requester parks on until its lock is handed over.
pub struct WaitHandle {
    granted: Mutex<bool>,
    cond: Condvar,
}

impl WaitHandle {
    fn new() -> WaitHandle {
        WaitHandle {
            granted: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Block until the lock is granted.
    pub fn wait(&self) {
        let mut granted = self.granted.lock();
        while !*granted {
            self.cond.wait(&mut granted);
        }
    }

    fn grant(&self) {
        *self.granted.lock() = true;
        self.cond.notify_one();
    }
}

#[derive(Default)]
struct Graph {
    /// Uids each transaction holds.
    held: HashMap<Xid, Vec<Uid>>,
    /// Current owner of each locked uid.
    owner: HashMap<Uid, Xid>,
    /// FIFO queue of transactions waiting for each uid.
    waiters: HashMap<Uid, VecDeque<Xid>>,
    /// The single uid each blocked transaction is waiting for.
    waiting_on: HashMap<Xid, Uid>,
    /// Wait handles of blocked transactions.
    handles: HashMap<Xid, Arc<WaitHandle>>,
}

/// The lock table.
pub struct LockTable {
    graph: Mutex<Graph>,
}

impl LockTable {
    pub fn new() -> LockTable {
        LockTable {
            graph: Mutex::new(Graph::default()),
        }
    }

    /// Request the lock on `uid` for `xid`.
    ///
    /// - `Ok(None)`: granted immediately (or already held).
    /// - `Ok(Some(handle))`: queued; call [`WaitHandle::wait`].
    /// - `Err(DeadlockError)`: waiting would close a cycle; no state
    ///   was changed.
    pub fn acquire(
        &self,
        xid: Xid,
        uid: Uid,
    ) -> std::result::Result<Option<Arc<WaitHandle>>, DeadlockError> {
        let mut graph = self.graph.lock();

        match graph.owner.get(&uid) {
            None => {
                graph.owner.insert(uid, xid);
                graph.held.entry(xid).or_default().push(uid);
                Ok(None)
            }
            Some(&owner) if owner == xid => Ok(None),
            Some(_) => {
                // Tentatively add the wait edge and look for a cycle.
                graph.waiting_on.insert(xid, uid);
                if has_cycle(&graph) {
                    graph.waiting_on.remove(&xid);
                    return Err(DeadlockError);
                }
                graph.waiters.entry(uid).or_default().push_back(xid);

                let handle = Arc::new(WaitHandle::new());
                graph.handles.insert(xid, Arc::clone(&handle));
                Ok(Some(handle))
            }
        }
    }

    /// Release everything `xid` holds, handing each uid to the first
    /// still-live waiter in queue order.
    pub fn release_all(&self, xid: Xid) {
        let mut graph = self.graph.lock();

        // Drop any wait edge the transaction itself still has.
        if let Some(uid) = graph.waiting_on.remove(&xid) {
            if let Some(queue) = graph.waiters.get_mut(&uid) {
                queue.retain(|&w| w != xid);
            }
        }
        graph.handles.remove(&xid);

        let held = graph.held.remove(&xid).unwrap_or_default();
        for uid in held {
            graph.owner.remove(&uid);

            while let Some(next) = graph.waiters.get_mut(&uid).and_then(|q| q.pop_front()) {
                // A queued transaction may have been released already;
                // skip to the next live one.
                if let Some(handle) = graph.handles.remove(&next) {
                    graph.owner.insert(uid, next);
                    graph.held.entry(next).or_default().push(uid);
                    graph.waiting_on.remove(&next);
                    handle.grant();
                    break;
                }
            }
        }
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Stamped depth-first search over the wait-for graph.
///
/// Each root walk gets a fresh stamp; hitting a node with the current
/// stamp means the walk looped, while an older stamp means the node
/// was already cleared on a previous walk.
fn has_cycle(graph: &Graph) -> bool {
    let mut stamps: HashMap<Xid, u64> = HashMap::new();
    let mut stamp = 0u64;

    for &root in graph.held.keys() {
        if stamps.contains_key(&root) {
            continue;
        }
        stamp += 1;
        if walk(graph, root, stamp, &mut stamps) {
            return true;
        }
    }
    false
}

fn walk(graph: &Graph, xid: Xid, stamp: u64, stamps: &mut HashMap<Xid, u64>) -> bool {
    match stamps.get(&xid) {
        Some(&s) if s == stamp => return true,
        Some(_) => return false,
        None => {}
    }
    stamps.insert(xid, stamp);

    let Some(&uid) = graph.waiting_on.get(&xid) else {
        return false;
    };
    let Some(&owner) = graph.owner.get(&uid) else {
        return false;
    };
    walk(graph, owner, stamp, stamps)
}
