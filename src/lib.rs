//! StrataDB - A single-node storage engine with write-ahead logging and MVCC.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           StrataDB                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │         Transaction Layer (concurrency/)                 │   │
//! │  │  VersionManager + Visibility + LockTable + TxnTable      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Engine (storage/)                      │   │
//! │  │  StorageEngine + DataItem + page layouts + free space    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                ↓                           ↓                    │
//! │  ┌──────────────────────────┐  ┌──────────────────────────┐   │
//! │  │   Page Cache (buffer/)   │  │   WAL (recovery/)        │   │
//! │  │  RefCache + PageCache    │  │  Wal + LogRecord +       │   │
//! │  │  (refcounted residency)  │  │  redo/undo recovery      │   │
//! │  └──────────────────────────┘  └──────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (Uid, Xid, Error, config)
//! - [`buffer`] - Reference-counted caches (generic and page-level)
//! - [`storage`] - Page layouts, data items, and the engine facade
//! - [`recovery`] - Write-ahead logging and crash recovery
//! - [`concurrency`] - Transactions, visibility, and locking
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use stratadb::{IsolationLevel, StorageEngine, TxnTable, VersionManager};
//!
//! let txns = Arc::new(TxnTable::create("mydb/data.xid").unwrap());
//! let engine = Arc::new(
//!     StorageEngine::create("mydb", 1 << 24, Arc::clone(&txns)).unwrap(),
//! );
//! let vm = VersionManager::new(txns, Arc::clone(&engine));
//!
//! let xid = vm.begin(IsolationLevel::ReadCommitted).unwrap();
//! let uid = vm.insert(xid, b"hello").unwrap();
//! assert_eq!(vm.read(xid, uid).unwrap().unwrap(), b"hello");
//! vm.commit(xid).unwrap();
//! engine.close().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod concurrency;
pub mod recovery;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, Result, Uid, Xid, SUPER_XID};

pub use buffer::PageCache;
pub use concurrency::{IsolationLevel, TxnStatus, TxnTable, VersionManager};
pub use recovery::Wal;
pub use storage::{DataItem, StorageEngine};
