//! Error types for StrataDB.

use crate::common::uid::{Uid, Xid};

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in StrataDB.
///
/// By having a single error type, error handling stays consistent across
/// the storage and transaction layers. Variants fall into four groups:
///
/// - **Fatal**: [`Error::BadLogFile`], [`Error::BadXidFile`] — the
///   on-disk state is corrupt in a way that cannot be repaired; returned
///   from `create`/`open` only, never after a successful open.
/// - **Resource**: [`Error::MemTooSmall`], [`Error::CacheFull`],
///   [`Error::DataTooLarge`], [`Error::DatabaseBusy`].
/// - **Transactional**: [`Error::ConcurrentUpdate`] — the transaction
///   has been auto-aborted and must not issue further operations.
/// - **Not found**: [`Error::NoSuchTransaction`]. Reading a nonexistent
///   record is *not* an error; it surfaces as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The log file header checksum does not match its records and the
    /// mismatch cannot be explained by a torn append.
    #[error("log file is corrupt")]
    BadLogFile,

    /// The transaction table file length disagrees with its counter
    /// header.
    #[error("transaction table file is corrupt")]
    BadXidFile,

    /// The memory budget is below the minimum the page cache requires.
    #[error("memory budget too small for page cache")]
    MemTooSmall,

    /// A bounded cache is at capacity with every slot referenced.
    #[error("cache is full")]
    CacheFull,

    /// A single record is too large to ever fit in one page.
    #[error("data too large for a single page")]
    DataTooLarge,

    /// Repeated attempts to find page space failed under contention.
    #[error("database is busy")]
    DatabaseBusy,

    /// Requested page does not exist in the data file.
    #[error("page {0} not found")]
    PageNotFound(u32),

    /// The transaction was aborted by the engine (deadlock or version
    /// skip) and can no longer be used.
    #[error("transaction {0} aborted due to concurrent update")]
    ConcurrentUpdate(Xid),

    /// The transaction id is not active in this version manager.
    #[error("no such transaction: {0}")]
    NoSuchTransaction(Xid),

    /// The uid does not point at a live record. Internal signal: mapped
    /// to `Ok(None)` before reaching the public API.
    #[error("no record at {0}")]
    RecordAbsent(Uid),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PageNotFound(42);
        assert_eq!(format!("{}", err), "page 42 not found");

        let err = Error::NoSuchTransaction(Xid(7));
        assert_eq!(format!("{}", err), "no such transaction: 7");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {} // Success
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_result_type_alias() {
        fn might_fail() -> Result<u32> {
            Ok(42)
        }

        assert_eq!(might_fail().unwrap(), 42);
    }
}
