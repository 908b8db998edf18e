//! Transactions, visibility, and locking.

pub mod entry;
pub mod lock_table;
pub mod transaction;
pub mod txn_table;
pub mod version_manager;
pub mod visibility;

pub use entry::Entry;
pub use lock_table::LockTable;
pub use transaction::{IsolationLevel, Transaction};
pub use txn_table::{TxnStatus, TxnTable};
pub use version_manager::VersionManager;
